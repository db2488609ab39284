use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://jira-metrics.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jira_base_url: Option<String>,
    pub page_size: u64,
    pub page_delay: Duration,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            jira_base_url: None,
            page_size: 100,
            page_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        config.jira_base_url = lookup("JIRA_BASE_URL").filter(|url| !url.trim().is_empty());

        if let Some(size) = lookup("JIRA_PAGE_SIZE")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|size| *size > 0)
        {
            config.page_size = size;
        }
        if let Some(ms) = lookup("JIRA_PAGE_DELAY_MS").and_then(|v| v.parse().ok()) {
            config.page_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = lookup("JIRA_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.timeout = Duration::from_secs(secs);
        }

        config
    }

    pub fn require_jira_base_url(&self) -> anyhow::Result<&str> {
        self.jira_base_url
            .as_deref()
            .context("JIRA_BASE_URL must be set to fetch issues")
    }
}
