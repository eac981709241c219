//! JSON output formatting

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wrapper for JSON output with metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize, Deserialize)]
pub struct Metadata {
    pub timestamp: String,
    pub version: String,

    /// The data was served from the local cache
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub from_cache: bool,
}

impl<T> JsonOutput<T> {
    pub fn new(data: T) -> Self {
        Self::with_source(data, false)
    }

    pub fn with_source(data: T, from_cache: bool) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                from_cache,
            },
        }
    }
}

/// Format data as pretty-printed JSON
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data))
}

/// Format data as pretty-printed JSON, noting whether it came from cache
pub fn format_json_from<T: Serialize + ?Sized>(
    data: &T,
    from_cache: bool,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::with_source(data, from_cache))
}
