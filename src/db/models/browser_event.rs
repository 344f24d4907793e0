//! Browser event records sent by the extension.
//!
//! Every record is an append-only row. Timestamps are whatever ISO-8601 text
//! the extension produced and are stored verbatim.

use serde::Deserialize;
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_search_engine() -> String {
    "google".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    BrowsingHistory,
    SearchQuery,
    SearchClick,
    NavigationEvent,
    Download,
    Bookmark,
    UserInteraction,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::BrowsingHistory => "browsing_history",
            RecordKind::SearchQuery => "search_query",
            RecordKind::SearchClick => "search_click",
            RecordKind::NavigationEvent => "navigation_event",
            RecordKind::Download => "download",
            RecordKind::Bookmark => "bookmark",
            RecordKind::UserInteraction => "user_interaction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "browsing_history" => Some(RecordKind::BrowsingHistory),
            "search_query" => Some(RecordKind::SearchQuery),
            "search_click" => Some(RecordKind::SearchClick),
            "navigation_event" => Some(RecordKind::NavigationEvent),
            "download" => Some(RecordKind::Download),
            "bookmark" => Some(RecordKind::Bookmark),
            "user_interaction" => Some(RecordKind::UserInteraction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PageVisit {
    pub url: String,
    pub title: Option<String>,
    pub visit_time: String,
    pub leave_time: Option<String>,
    pub duration_seconds: Option<i64>,
    pub tab_id: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub active_duration_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_search_engine")]
    pub search_engine: String,
    pub search_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchClick {
    /// Explicit link to a query row. Without it the click is attached to the
    /// newest query by `search_time`, which is only a best-effort guess when
    /// several searches are in flight.
    pub search_query_id: Option<i64>,
    pub result_url: String,
    pub result_title: Option<String>,
    pub result_position: Option<i64>,
    pub click_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NavigationEvent {
    pub url: String,
    pub tab_id: Option<i64>,
    pub opener_tab_id: Option<i64>,
    pub transition_type: Option<String>,
    pub transition_qualifiers: Option<Value>,
    #[serde(default)]
    pub is_spa_navigation: bool,
    pub event_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Download {
    pub filename: Option<String>,
    pub url: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub download_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Bookmark {
    pub url: String,
    pub title: Option<String>,
    pub bookmark_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UserInteraction {
    pub url: Option<String>,
    pub tab_id: Option<i64>,
    pub interaction_type: String,
    /// Shape depends on `interaction_type`; kept opaque.
    pub interaction_data: Option<Value>,
    pub event_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserRecord {
    PageVisit(PageVisit),
    SearchQuery(SearchQuery),
    SearchClick(SearchClick),
    Navigation(NavigationEvent),
    Download(Download),
    Bookmark(Bookmark),
    Interaction(UserInteraction),
}

impl BrowserRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            BrowserRecord::PageVisit(_) => RecordKind::BrowsingHistory,
            BrowserRecord::SearchQuery(_) => RecordKind::SearchQuery,
            BrowserRecord::SearchClick(_) => RecordKind::SearchClick,
            BrowserRecord::Navigation(_) => RecordKind::NavigationEvent,
            BrowserRecord::Download(_) => RecordKind::Download,
            BrowserRecord::Bookmark(_) => RecordKind::Bookmark,
            BrowserRecord::Interaction(_) => RecordKind::UserInteraction,
        }
    }
}

/// Flattens an opaque JSON payload into the TEXT column that stores it.
pub fn opaque_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Result of writing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(i64),
    /// The record was valid but had nothing to attach to.
    Dropped(String),
}
