pub mod app_usage;
pub mod browser_events;
pub mod settings;
pub mod stats;
