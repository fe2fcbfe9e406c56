//! WebSocket messages exchanged with the picking page

use crate::types::SelectionStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by the browser
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Liveness probe, answered with `pong`
    Ping,
    /// The human's final choice
    Select {
        #[serde(default)]
        items: Vec<Value>,
    },
}

/// Messages sent to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Welcome {
        #[serde(rename = "searchId")]
        search_id: String,
        message: String,
    },
    Pong,
    /// The selection record for this socket's search changed
    SelectionUpdate {
        #[serde(rename = "searchId")]
        search_id: String,
        status: SelectionStatus,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Plain enum of strings and values; serialisation cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}
