use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manual {
    #[serde(alias = "manualId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl Manual {
    /// Name to show, falling back to the file name and then the id
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if let Some(file_name) = self.file_name.as_deref().filter(|f| !f.is_empty()) {
            file_name
        } else {
            &self.id
        }
    }

    /// Human readable size, e.g. "2.4 MB"
    pub fn size_display(&self) -> String {
        match self.size_bytes {
            None => "-".to_string(),
            Some(bytes) if bytes < 1024 => format!("{} B", bytes),
            Some(bytes) if bytes < 1024 * 1024 => format!("{:.1} KB", bytes as f64 / 1024.0),
            Some(bytes) => format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManualList {
    #[serde(default)]
    pub manuals: Vec<Manual>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadManualRequest {
    pub file_name: String,
    pub content_type: String,
    /// Base64 encoded file content
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    #[serde(alias = "downloadUrl")]
    pub url: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manual_list() {
        let json = r#"{"manuals":[
            {"manualId":"m-1","name":"Dishwasher X200","fileName":"x200.pdf","sizeBytes":2516582,"pages":48,"status":"ready","uploadedAt":"2024-03-01T12:00:00Z"},
            {"id":"m-2","fileName":"oven.pdf"}
        ]}"#;
        let list: ManualList = serde_json::from_str(json).unwrap();
        assert_eq!(list.manuals.len(), 2);
        assert_eq!(list.manuals[0].id, "m-1");
        assert_eq!(list.manuals[0].pages, Some(48));
        assert_eq!(list.manuals[0].size_display(), "2.4 MB");
        assert_eq!(list.manuals[1].display_name(), "oven.pdf");
        assert_eq!(list.manuals[1].size_display(), "-");
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let manual: Manual = serde_json::from_str(r#"{"id":"m-9"}"#).unwrap();
        assert_eq!(manual.display_name(), "m-9");
    }
}
