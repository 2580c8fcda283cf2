//! Payload wire model
//!
//! A payload is the declarative description of one scrape: where to start,
//! which fields to extract, how to paginate and how to render the output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::fetch::Request;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default)]
    pub name: String,
    pub request: Request,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// json, csv or xml
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginator: Option<PaginatorSpec>,
    /// Keep results grouped per page instead of one flat list
    #[serde(default)]
    pub paginate_results: bool,
    /// Delay between requests to the same host, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_delay: Option<u64>,
    #[serde(default = "default_true")]
    pub randomize_fetch_delay: bool,
    /// Retries for transient fetch failures
    #[serde(default)]
    pub retry_times: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub selector: String,
    #[serde(default)]
    pub extractor: ExtractorSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
}

/// Extractor types of a field and their settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorSpec {
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
}

/// Nested extraction for pages reached through a field's links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginator: Option<PaginatorSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatorSpec {
    #[serde(default)]
    pub selector: String,
    #[serde(default = "default_attr")]
    pub attr: String,
    /// Zero falls back to the configured default
    #[serde(default)]
    pub max_pages: usize,
    #[serde(default)]
    pub infinite_scroll: bool,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_attr() -> String {
    "href".to_string()
}

impl Payload {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Run identifier derived from the payload's canonical JSON.
    ///
    /// Equal payloads get equal ids, so a rerun overwrites the fragments of
    /// the previous one instead of piling up new keys.
    pub fn uid(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self).map_err(Error::from)?;
        Ok(short_hash(&canonical))
    }
}

/// First 16 hex digits of the SHA-256 of `data`.
pub(crate) fn short_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..8])
}
