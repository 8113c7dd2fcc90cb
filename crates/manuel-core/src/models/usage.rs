use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub total_queries: u64,
    pub text_queries: u64,
    pub voice_queries: u64,
    pub manuals_uploaded: u64,
    pub total_cost: f64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub query_type: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub manual_id: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageHistory {
    #[serde(alias = "items")]
    pub entries: Vec<UsageRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostBreakdown {
    pub total: f64,
    pub currency: String,
    /// Cost per backing service (transcription, model inference, storage)
    pub by_service: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quotas {
    pub queries_used: u64,
    pub queries_limit: Option<u64>,
    pub storage_used_bytes: u64,
    pub storage_limit_bytes: Option<u64>,
    pub resets_at: Option<DateTime<Utc>>,
}

impl Quotas {
    /// Remaining queries, if the plan has a limit
    pub fn queries_remaining(&self) -> Option<u64> {
        self.queries_limit
            .map(|limit| limit.saturating_sub(self.queries_used))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::Validation(format!("unsupported export format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageExport {
    #[serde(default)]
    pub format: String,
    pub data: String,
}
