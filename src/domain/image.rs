// Image references attached to readings
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static FILE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/file/d/([a-zA-Z0-9_-]+)",
        r"[?&]id=([a-zA-Z0-9_-]+)",
        r"/uc\?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Pull the drive file id out of the URL shapes the sheet stores.
/// Patterns are tried in order and the first match wins.
pub fn extract_file_id(url: &str) -> Option<&str> {
    FILE_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBlob {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub base64: String,
}

impl ImageBlob {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}
