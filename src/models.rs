use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default, with = "tracker_time")]
    pub created: Option<DateTime<FixedOffset>>,
    #[serde(default, with = "tracker_time")]
    pub resolutiondate: Option<DateTime<FixedOffset>>,
    pub issuetype: IssueType,
    pub status: IssueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    // Atlassian document format on the v3 API, plain text on older servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub name: String,
    #[serde(rename = "statusCategory")]
    pub status_category: StatusCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCategory {
    pub name: String,
}

impl Issue {
    pub fn is_resolved(&self) -> bool {
        self.fields.resolutiondate.is_some()
    }

    pub fn is_bug(&self) -> bool {
        self.fields.issuetype.name.to_lowercase().contains("bug")
    }
}

/// One page of the issue search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub max_results: u64,
    pub total: u64,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    #[default]
    BugDensity,
    Velocity,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::BugDensity => "bugDensity",
            MetricKind::Velocity => "velocity",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::BugDensity => "Bug Density (%)",
            MetricKind::Velocity => "Velocity (issues/week)",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMetric {
    pub week_start: NaiveDate,
    pub total_issues: usize,
    pub bugs: usize,
    pub bug_density: f64,
    pub velocity: usize,
}

impl WeeklyMetric {
    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::BugDensity => self.bug_density,
            MetricKind::Velocity => self.velocity as f64,
        }
    }
}

/// Inclusive window of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlChartPoint {
    pub week: WeeklyMetric,
    pub value: f64,
    pub ucl: f64,
    pub lcl: f64,
    pub center_line: f64,
    pub is_baseline: bool,
}

impl ControlChartPoint {
    pub fn is_out_of_limits(&self) -> bool {
        self.value > self.ucl || self.value < self.lcl
    }
}

/// Timestamps as the tracker writes them, e.g. `2024-01-15T10:30:00.000+0000`.
pub mod tracker_time {
    use chrono::{DateTime, Datelike, FixedOffset, ParseError};
    use serde::{Deserialize, Deserializer, Serializer};
    use thiserror::Error;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

    /// Calendar years an issue timestamp may carry.
    pub const YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

    #[derive(Error, Debug)]
    pub enum TimestampError {
        #[error("malformed timestamp: {0}")]
        Malformed(#[from] ParseError),

        #[error("timestamp year {0} is out of range")]
        OutOfRange(i32),
    }

    pub fn parse(raw: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
        let ts = DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))?;
        if !YEARS.contains(&ts.year()) {
            return Err(TimestampError::OutOfRange(ts.year()));
        }
        Ok(ts)
    }

    pub fn serialize<S>(
        value: &Option<DateTime<FixedOffset>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
