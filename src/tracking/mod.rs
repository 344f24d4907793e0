pub mod controller;
pub mod loop_worker;
pub mod probe;
pub mod state;

pub use controller::{StartOutcome, TrackerSupervisor};
pub use loop_worker::tracking_loop;
pub use probe::{ProbeError, SystemWindowProbe, WindowInfo, WindowProbe};
pub use state::{is_browser, FocusChange, FocusState, BROWSER_BUNDLE_IDS, MIN_SESSION_SECS};
