//! Command and response envelopes.
//!
//! Client → host: `{"command": <name>, ...fields}`.
//! Host → client: `{"status": "success" | "error", ...fields | "message"}`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{BrowserRecord, DailyStats, RecordKind, SettingsPatch};
use crate::error::{HostError, HostResult};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SaveBrowserData {
        #[serde(default)]
        data: Vec<Value>,
    },
    GetStats {
        /// Defaults to the host's local date.
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    UpdateSettings {
        #[serde(default)]
        settings: SettingsPatch,
    },
    StartAppTracking {},
    StopAppTracking {},
}

impl Command {
    const NAMES: [&'static str; 5] = [
        "save_browser_data",
        "get_stats",
        "update_settings",
        "start_app_tracking",
        "stop_app_tracking",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::SaveBrowserData { .. } => "save_browser_data",
            Command::GetStats { .. } => "get_stats",
            Command::UpdateSettings { .. } => "update_settings",
            Command::StartAppTracking {} => "start_app_tracking",
            Command::StopAppTracking {} => "stop_app_tracking",
        }
    }

    /// Decodes an envelope. Unknown names and malformed payloads come back as
    /// `Validation` errors whose text is sent to the client as-is.
    pub fn from_envelope(envelope: Value) -> HostResult<Self> {
        let name = match envelope.get("command") {
            Some(Value::String(name)) => name.clone(),
            other => {
                let shown = other.map_or_else(|| "null".to_owned(), Value::to_string);
                return Err(HostError::validation(format!("Unknown command: {shown}")));
            }
        };

        if !Self::NAMES.contains(&name.as_str()) {
            return Err(HostError::validation(format!("Unknown command: {name}")));
        }

        serde_json::from_value(envelope)
            .map_err(|err| HostError::validation(format!("Invalid {name} payload: {err}")))
    }
}

/// Decodes one `{type, data}` item of a `save_browser_data` batch.
pub fn decode_record(item: &Value) -> HostResult<BrowserRecord> {
    let type_name = item
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::validation("item is missing 'type'"))?;
    let kind = RecordKind::parse(type_name)
        .ok_or_else(|| HostError::validation(format!("unknown item type '{type_name}'")))?;
    let data = item
        .get("data")
        .ok_or_else(|| HostError::validation(format!("{type_name} item is missing 'data'")))?;

    let invalid =
        |err: serde_json::Error| HostError::validation(format!("invalid {type_name} item: {err}"));

    let record = match kind {
        RecordKind::BrowsingHistory => {
            BrowserRecord::PageVisit(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::SearchQuery => {
            BrowserRecord::SearchQuery(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::SearchClick => {
            BrowserRecord::SearchClick(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::NavigationEvent => {
            BrowserRecord::Navigation(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::Download => {
            BrowserRecord::Download(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::Bookmark => {
            BrowserRecord::Bookmark(Deserialize::deserialize(data).map_err(invalid)?)
        }
        RecordKind::UserInteraction => {
            BrowserRecord::Interaction(Deserialize::deserialize(data).map_err(invalid)?)
        }
    };
    Ok(record)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success(Payload),
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Saved(SaveSummary),
    Stats(DailyStats),
    Message { message: String },
    Empty {},
}

impl Response {
    pub fn ok() -> Self {
        Response::Success(Payload::Empty {})
    }

    pub fn message(message: impl Into<String>) -> Self {
        Response::Success(Payload::Message {
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

impl From<HostError> for Response {
    fn from(err: HostError) -> Self {
        Response::error(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaveSummary {
    pub saved: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
    /// Failures left out of `failures` to keep the response within one frame.
    #[serde(skip_serializing_if = "is_zero")]
    pub failures_omitted: usize,
}

fn is_zero(count: &usize) -> bool {
    *count == 0
}

/// One item of a batch that was not persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemFailure {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub saved: bool,
    pub message: String,
}
