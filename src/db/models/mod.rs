pub mod app_usage;
pub mod browser_event;
pub mod settings;
pub mod stats;

pub use app_usage::AppUsageSession;
pub use browser_event::{
    opaque_text, Bookmark, BrowserRecord, Download, NavigationEvent, PageVisit, RecordKind,
    SaveOutcome, SearchClick, SearchQuery, UserInteraction,
};
pub use settings::{SettingsPatch, TrackingSettings};
pub use stats::{DailyStats, TopSite};
