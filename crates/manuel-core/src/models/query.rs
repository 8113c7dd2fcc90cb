use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceQueryRequest {
    /// Base64 encoded recording
    pub audio: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,
    /// Present for voice queries
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub processing_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub manual_id: Option<String>,
    #[serde(default)]
    pub manual_name: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl Source {
    pub fn citation(&self) -> String {
        let name = self
            .manual_name
            .as_deref()
            .or(self.manual_id.as_deref())
            .unwrap_or("unknown manual");
        match self.page {
            Some(page) => format!("{} (p. {})", name, page),
            None => name.to_string(),
        }
    }
}
