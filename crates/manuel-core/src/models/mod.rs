//! Data models for the Manuel backend API.
//!
//! Field names follow the backend's camelCase JSON. Optional and defaulted
//! fields keep parsing tolerant of older backend deployments.

pub mod manual;
pub mod query;
pub mod usage;

pub use manual::{DownloadLink, Manual, ManualList, UploadManualRequest};
pub use query::{QueryRequest, QueryResponse, Source, VoiceQueryRequest};
pub use usage::{CostBreakdown, ExportFormat, Quotas, UsageExport, UsageHistory, UsageRecord, UsageStats};
