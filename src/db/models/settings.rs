use serde::{Deserialize, Serialize};

/// The singleton `tracking_settings` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingSettings {
    pub tracking_enabled: bool,
    pub data_retention_days: i64,
    pub updated_at: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsPatch {
    pub tracking_enabled: Option<bool>,
    pub data_retention_days: Option<i64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.tracking_enabled.is_none() && self.data_retention_days.is_none()
    }
}
