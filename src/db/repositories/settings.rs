use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    models::{SettingsPatch, TrackingSettings},
};

pub struct SettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self) -> Result<TrackingSettings> {
        self.conn
            .query_row(
                "SELECT tracking_enabled, data_retention_days, updated_at
                 FROM tracking_settings WHERE id = 1",
                [],
                |row| {
                    Ok(TrackingSettings {
                        tracking_enabled: row.get(0)?,
                        data_retention_days: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .context("failed to read tracking_settings")
    }

    /// Applies only the fields present in `patch`.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<()> {
        if let Some(enabled) = patch.tracking_enabled {
            self.conn
                .execute(
                    "UPDATE tracking_settings
                     SET tracking_enabled = ?1, updated_at = CURRENT_TIMESTAMP
                     WHERE id = 1",
                    params![enabled],
                )
                .context("failed to update tracking_enabled")?;
        }

        if let Some(days) = patch.data_retention_days {
            self.conn
                .execute(
                    "UPDATE tracking_settings
                     SET data_retention_days = ?1, updated_at = CURRENT_TIMESTAMP
                     WHERE id = 1",
                    params![days],
                )
                .context("failed to update data_retention_days")?;
        }

        Ok(())
    }
}

impl Database {
    pub async fn settings(&self) -> Result<TrackingSettings> {
        self.query(|conn| SettingsRepository::new(conn).get()).await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open settings transaction")?;
            SettingsRepository::new(&tx).apply(&patch)?;
            tx.commit().context("failed to commit settings")?;
            Ok(())
        })
        .await
    }
}
