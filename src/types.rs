//! Core data types for the icon server
//!
//! Search results and cached search records, plus the selection record that
//! tracks one pending human decision per search.

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Unique identifier minted once per search call
///
/// Format: `search_{unix_millis}_{8 lowercase alphanumerics}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchId(String);

impl SearchId {
    /// Mint a fresh search ID
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(|b| (b as char).to_ascii_lowercase())
            .collect();
        Self(format!("search_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SearchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single icon as returned by the upstream search API
///
/// Only the fields the server relies on are typed, and leniently: `null` or
/// an unexpected type never rejects the icon. Everything else is kept
/// verbatim in `extra` and passed through to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconData {
    /// Upstream ID as sent, number or string
    #[serde(default)]
    pub id: Value,

    #[serde(default, deserialize_with = "lenient_name")]
    pub name: String,

    /// Inline SVG markup
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub show_svg: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub unicode: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub font_class: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

/// Cached materialisation of one search, read by the web page's pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub query: String,
    pub page: u32,
    pub page_size: u32,
    pub icons: Vec<IconData>,
    pub total_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of the `search_icons` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub search_id: SearchId,
    pub query: String,
    pub items: Vec<IconData>,
    pub count: usize,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_message: Option<String>,
}

/// Status of a pending selection
///
/// `Timeout` is only ever reported by a waiting caller; it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    Waiting,
    Completed,
    Failed,
    Timeout,
}

impl SelectionStatus {
    /// Completed and failed records accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SelectionStatus::Completed | SelectionStatus::Failed)
    }
}

impl fmt::Display for SelectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionStatus::Waiting => "waiting",
            SelectionStatus::Completed => "completed",
            SelectionStatus::Failed => "failed",
            SelectionStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Live state of one human decision, keyed by search ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    pub search_id: String,
    pub status: SelectionStatus,
    /// Whether a browser connection is currently open
    pub connected: bool,
    pub updated_at: DateTime<Utc>,
    /// Items the human picked, in submission order
    #[serde(default)]
    pub selected_items: Vec<Value>,
    /// Bumped on every connection open; lets a disconnect recognise that a
    /// newer connection has taken over.
    #[serde(default)]
    pub session: u64,
}

impl SelectionRecord {
    pub fn waiting(search_id: impl Into<String>, session: u64) -> Self {
        Self {
            search_id: search_id.into(),
            status: SelectionStatus::Waiting,
            connected: true,
            updated_at: Utc::now(),
            selected_items: Vec::new(),
            session,
        }
    }

    pub fn completed(search_id: impl Into<String>, items: Vec<Value>, session: u64) -> Self {
        Self {
            search_id: search_id.into(),
            status: SelectionStatus::Completed,
            connected: true,
            updated_at: Utc::now(),
            selected_items: items,
            session,
        }
    }

    pub fn failed(search_id: impl Into<String>, session: u64) -> Self {
        Self {
            search_id: search_id.into(),
            status: SelectionStatus::Failed,
            connected: false,
            updated_at: Utc::now(),
            selected_items: Vec::new(),
            session,
        }
    }
}
