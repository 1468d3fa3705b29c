//! HTTP response types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::request::HeaderList;

/// Response body: inline text, or a downloaded file for large content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResponseBody {
    Text { content: String },
    File { path: PathBuf, size: u64 },
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text {
            content: String::new(),
        }
    }
}

impl ResponseBody {
    /// Inline text, if the body was kept in memory
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text { content } => Some(content),
            ResponseBody::File { .. } => None,
        }
    }

    /// Path of the downloaded file, if the body was spilled to disk
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            ResponseBody::Text { .. } => None,
            ResponseBody::File { path, .. } => Some(path),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Text { content } => content.len() as u64,
            ResponseBody::File { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// HTTP response record. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Status text (e.g., "OK", "Not Found")
    pub status_text: String,

    /// Response headers, multi-valued
    pub headers: HeaderList,

    /// Response body
    pub body: ResponseBody,

    /// Response time in milliseconds
    pub duration_ms: u64,

    /// HTTP version
    pub http_version: String,

    /// File name suggested by Content-Disposition
    pub file_name: Option<String>,
}

impl HttpResponse {
    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response is redirect (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Get a specific header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// `Location` header value
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// Body text, empty when the body was downloaded to a file
    pub fn body_text(&self) -> &str {
        self.body.as_text().unwrap_or("")
    }

    /// Get content type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Parse body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.body_text())
    }

    /// Simplified response object handed to scripts
    pub fn to_script_value(&self) -> serde_json::Value {
        let mut headers = serde_json::Map::new();
        for (name, value) in self.headers.iter() {
            headers
                .entry(name.to_string())
                .or_insert_with(|| serde_json::Value::String(value.to_string()));
        }

        serde_json::json!({
            "status": self.status,
            "statusText": self.status_text,
            "headers": headers,
            "body": self.body_text(),
            "duration": self.duration_ms,
            "file": self.body.file_path().map(|p| p.display().to_string()),
        })
    }
}

/// Extract the file name from a Content-Disposition header value
pub fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        if key == "filename*" {
            // RFC 5987: charset'lang'percent-encoded
            let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if key == "filename" {
            plain = Some(raw.trim_matches('"').to_string());
        }
    }

    plain.filter(|name| !name.is_empty())
}
