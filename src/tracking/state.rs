use chrono::NaiveDateTime;

use crate::db::{iso_timestamp, AppUsageSession};

use super::probe::WindowInfo;

/// Sessions shorter than this are discarded.
pub const MIN_SESSION_SECS: i64 = 1;

/// Bundle identifiers (and Linux process names) of known browsers. Only used to
/// label sessions; it never decides whether a session is kept.
pub const BROWSER_BUNDLE_IDS: &[&str] = &[
    "com.google.Chrome",
    "com.google.Chrome.canary",
    "org.mozilla.firefox",
    "com.apple.Safari",
    "com.microsoft.edgemac",
    "com.brave.Browser",
    "com.operasoftware.Opera",
    "firefox",
    "chrome",
    "chromium",
    "brave",
    "msedge",
];

pub fn is_browser(bundle_id: &str) -> bool {
    BROWSER_BUNDLE_IDS.contains(&bundle_id)
}

#[derive(Debug, Clone, PartialEq)]
struct OpenSession {
    app_name: String,
    window_title: String,
    bundle_id: String,
    started_at: NaiveDateTime,
}

impl OpenSession {
    fn begin(window: WindowInfo, now: NaiveDateTime) -> Self {
        Self {
            app_name: window.app_name,
            window_title: window.window_title,
            bundle_id: window.bundle_id,
            started_at: now,
        }
    }

    fn matches(&self, window: &WindowInfo) -> bool {
        self.app_name == window.app_name && self.window_title == window.window_title
    }

    fn finish(self, ended_at: NaiveDateTime) -> Option<AppUsageSession> {
        let duration_seconds = (ended_at - self.started_at).num_seconds();
        if duration_seconds < MIN_SESSION_SECS {
            return None;
        }

        Some(AppUsageSession {
            is_browser: is_browser(&self.bundle_id),
            app_name: self.app_name,
            app_bundle_id: self.bundle_id,
            window_title: self.window_title,
            start_time: iso_timestamp(self.started_at),
            end_time: iso_timestamp(ended_at),
            duration_seconds,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FocusChange {
    Unchanged,
    /// Focus moved to a new (app, title) pair. `finished` holds the previous
    /// session when it lasted long enough to keep.
    Switched { finished: Option<AppUsageSession> },
}

/// Idle until the first sample, then Tracking with exactly one open session.
#[derive(Debug, Default)]
pub struct FocusState {
    current: Option<OpenSession>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_tracking(&self) -> bool {
        self.current.is_some()
    }

    pub fn observe(&mut self, window: WindowInfo, now: NaiveDateTime) -> FocusChange {
        if self
            .current
            .as_ref()
            .is_some_and(|session| session.matches(&window))
        {
            return FocusChange::Unchanged;
        }

        let finished = self.current.take().and_then(|session| session.finish(now));
        self.current = Some(OpenSession::begin(window, now));
        FocusChange::Switched { finished }
    }

    /// Ends the open session, if any, and returns to Idle.
    pub fn close(&mut self, now: NaiveDateTime) -> Option<AppUsageSession> {
        self.current.take().and_then(|session| session.finish(now))
    }
}
