use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::models::{Issue, SearchPage};

pub const SEARCH_FIELDS: &str = "summary,description,status,resolutiondate,issuetype,created";

/// Failures of the fetch path. The display text is the message shown to the user.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("JQL query cannot be empty")]
    EmptyQuery,

    #[error("Invalid JQL query. Please check the syntax.")]
    InvalidQuery,

    #[error("Authentication error. Please check access settings.")]
    Auth,

    #[error("Error fetching data: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        match status {
            StatusCode::BAD_REQUEST => FetchError::InvalidQuery,
            StatusCode::UNAUTHORIZED => FetchError::Auth,
            _ => FetchError::Transport(message.into()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::from_status(status, err.to_string()),
            None => FetchError::Transport(err.to_string()),
        }
    }
}

#[async_trait]
pub trait IssueSource {
    async fn fetch_page(
        &self,
        jql: &str,
        start_at: u64,
        max_results: u64,
    ) -> Result<SearchPage, FetchError>;
}

pub struct JiraClient {
    base_url: String,
    client: Client,
}

impl JiraClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;
        info!("Jira client initialized (url={})", base_url);
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn fetch_page(
        &self,
        jql: &str,
        start_at: u64,
        max_results: u64,
    ) -> Result<SearchPage, FetchError> {
        let page = self
            .client
            .get(format!("{}/rest/api/3/search", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("jql", jql.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", max_results.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchPage>()
            .await?;

        Ok(page)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IssueDocument {
    Page(SearchPage),
    Issues(Vec<Issue>),
}

/// Reads issues saved from the search endpoint, either a whole response page or
/// a bare array of issues.
pub fn parse_issue_document(raw: &str) -> anyhow::Result<Vec<Issue>> {
    let document: IssueDocument =
        serde_json::from_str(raw).context("not a search response or issue array")?;
    Ok(match document {
        IssueDocument::Page(page) => page.issues,
        IssueDocument::Issues(issues) => issues,
    })
}

pub fn read_issue_file(path: &Path) -> anyhow::Result<Vec<Issue>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_issue_document(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Pulls every page of `jql` in order, pausing `page_delay` between requests.
pub async fn fetch_all_issues<S>(
    source: &S,
    jql: &str,
    page_size: u64,
    page_delay: Duration,
) -> Result<Vec<Issue>, FetchError>
where
    S: IssueSource + Sync + ?Sized,
{
    let jql = jql.trim();
    if jql.is_empty() {
        return Err(FetchError::EmptyQuery);
    }
    let page_size = page_size.max(1);

    let span = info_span!("fetch_issues", run_id = %Uuid::new_v4());
    async move {
        let mut issues = Vec::new();
        let mut start_at = 0u64;

        loop {
            let page = source.fetch_page(jql, start_at, page_size).await?;
            info!(
                start_at = page.start_at,
                max_results = page.max_results,
                received = page.issues.len(),
                total = page.total,
                "fetched issue page"
            );
            issues.extend(page.issues);

            start_at += page_size;
            if start_at >= page.total {
                break;
            }
            if !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }
        }

        info!(count = issues.len(), "issue fetch complete");
        Ok(issues)
    }
    .instrument(span)
    .await
}
