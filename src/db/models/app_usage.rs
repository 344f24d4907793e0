//! Application focus sessions written by the usage tracker.

use serde::{Deserialize, Serialize};

/// One contiguous interval during which a single (app, window title) pair held
/// focus. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppUsageSession {
    pub app_name: String,
    pub app_bundle_id: String,
    pub window_title: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: i64,
    pub is_browser: bool,
}
