use std::time::Duration;

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::control;
use crate::jira::{self, IssueSource};
use crate::models::{ControlChartPoint, DateRange, Issue, MetricKind, WeeklyMetric};
use crate::store;

/// The inputs of the analysis. Weekly metrics and chart points are derived
/// from these on every call and never stored.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub jql: String,
    pub issues: Vec<Issue>,
    pub baseline: Option<DateRange>,
    pub metric: MetricKind,
}

impl AnalysisContext {
    pub async fn load(pool: &SqlitePool) -> anyhow::Result<Self> {
        let context = Self {
            jql: store::load_or_default(pool, store::JQL_KEY, String::new()).await?,
            issues: store::load_or_default(pool, store::ISSUES_KEY, Vec::new()).await?,
            baseline: store::load_or_default(pool, store::BASELINE_KEY, None).await?,
            metric: store::load_or_default(pool, store::METRIC_KEY, MetricKind::default()).await?,
        };
        debug!(
            issues = context.issues.len(),
            metric = %context.metric,
            has_baseline = context.baseline.is_some(),
            "analysis context restored"
        );
        Ok(context)
    }

    pub fn weekly_metrics(&self) -> Vec<WeeklyMetric> {
        let weekly = crate::weekly::aggregate_weekly(&self.issues);
        debug!(weeks = weekly.len(), "weekly metrics recomputed");
        weekly
    }

    pub fn control_chart(&self) -> Vec<ControlChartPoint> {
        control::control_chart(&self.weekly_metrics(), self.baseline.as_ref(), self.metric)
    }

    /// True when there is data to analyze but the chosen window covers none of it.
    pub fn baseline_is_empty(&self) -> bool {
        match &self.baseline {
            Some(window) if !self.issues.is_empty() => {
                !control::baseline_has_data(&self.weekly_metrics(), window)
            }
            _ => false,
        }
    }

    pub async fn set_query(&mut self, pool: &SqlitePool, jql: &str) -> anyhow::Result<()> {
        store::put(pool, store::JQL_KEY, &jql).await?;
        self.jql = jql.to_string();
        Ok(())
    }

    pub async fn set_metric(
        &mut self,
        pool: &SqlitePool,
        metric: MetricKind,
    ) -> anyhow::Result<()> {
        store::put(pool, store::METRIC_KEY, &metric).await?;
        self.metric = metric;
        Ok(())
    }

    pub async fn set_baseline(
        &mut self,
        pool: &SqlitePool,
        baseline: Option<DateRange>,
    ) -> anyhow::Result<()> {
        match &baseline {
            Some(window) => store::put(pool, store::BASELINE_KEY, window).await?,
            None => store::remove(pool, store::BASELINE_KEY).await?,
        }
        self.baseline = baseline;
        Ok(())
    }

    pub async fn replace_issues(
        &mut self,
        pool: &SqlitePool,
        issues: Vec<Issue>,
    ) -> anyhow::Result<()> {
        store::put(pool, store::ISSUES_KEY, &issues).await?;
        info!(count = issues.len(), "issue store replaced");
        self.issues = issues;
        Ok(())
    }

    /// Fetches every issue for the stored query and replaces the issue store.
    /// On failure the stored issues are left as they were.
    pub async fn refresh<S>(
        &mut self,
        pool: &SqlitePool,
        source: &S,
        page_size: u64,
        page_delay: Duration,
    ) -> anyhow::Result<usize>
    where
        S: IssueSource + Sync + ?Sized,
    {
        let issues = match jira::fetch_all_issues(source, &self.jql, page_size, page_delay).await
        {
            Ok(issues) => issues,
            Err(err) => {
                warn!(error = %err, "issue fetch failed; keeping stored issues");
                return Err(err.into());
            }
        };
        let count = issues.len();
        self.replace_issues(pool, issues).await?;
        Ok(count)
    }

    /// Stores the default window when data exists and no window was chosen yet.
    pub async fn ensure_baseline(
        &mut self,
        pool: &SqlitePool,
        today: NaiveDate,
    ) -> anyhow::Result<Option<DateRange>> {
        if self.baseline.is_none() {
            if let Some(window) = control::default_baseline(&self.weekly_metrics(), today) {
                info!(start = %window.start, end = %window.end, "applying default baseline");
                self.set_baseline(pool, Some(window)).await?;
            }
        }
        Ok(self.baseline)
    }
}
