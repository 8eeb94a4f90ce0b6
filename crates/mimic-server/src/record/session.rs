//! Recording session wire format.
//!
//! A session is one JSON document: target, creation time, and an
//! append-only list of request/response entries. Bodies are stored as UTF-8
//! text when they survive validation, base64 otherwise, and omitted when
//! empty.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedBody {
    pub encoding: BodyEncoding,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest {
    pub method: String,
    /// Original URL including the query string; replay keys on it verbatim.
    pub url: String,
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<RecordedBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<RecordedBody>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub version: u32,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<RecordingEntry>,
}

impl RecordingSession {
    pub fn new(target: &str) -> Self {
        Self {
            version: 1,
            target: target.to_string(),
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

/// Encode a body for storage. Empty bodies are absent.
pub fn encode_body(bytes: &[u8]) -> Option<RecordedBody> {
    if bytes.is_empty() {
        return None;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(RecordedBody {
            encoding: BodyEncoding::Utf8,
            data: text.to_string(),
        }),
        Err(_) => Some(RecordedBody {
            encoding: BodyEncoding::Base64,
            data: BASE64.encode(bytes),
        }),
    }
}

pub fn decode_body(body: Option<&RecordedBody>) -> Vec<u8> {
    match body {
        None => Vec::new(),
        Some(body) => match body.encoding {
            BodyEncoding::Utf8 => body.data.clone().into_bytes(),
            BodyEncoding::Base64 => BASE64.decode(&body.data).unwrap_or_default(),
        },
    }
}

/// Which request paths get recorded. A `/.../`-delimited pattern is a
/// regex; anything else is a substring match; absent matches everything.
pub enum IncludeFilter {
    All,
    Substring(String),
    Pattern(Regex),
}

impl IncludeFilter {
    pub fn parse(pattern: Option<&str>) -> Result<Self, anyhow::Error> {
        let Some(pattern) = pattern else {
            return Ok(IncludeFilter::All);
        };
        if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
            let inner = &pattern[1..pattern.len() - 1];
            let regex = Regex::new(inner)
                .map_err(|e| anyhow::anyhow!("invalid include pattern {pattern}: {e}"))?;
            return Ok(IncludeFilter::Pattern(regex));
        }
        Ok(IncludeFilter::Substring(pattern.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            IncludeFilter::All => true,
            IncludeFilter::Substring(needle) => path.contains(needle.as_str()),
            IncludeFilter::Pattern(regex) => regex.is_match(path),
        }
    }
}

/// Parse a comma-separated status filter; empty input means no filter.
pub fn parse_status_list(input: &str) -> Option<Vec<u16>> {
    let statuses: Vec<u16> = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    (!statuses.is_empty()).then_some(statuses)
}
