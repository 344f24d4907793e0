use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::{connection::Database, models::AppUsageSession};

pub struct AppUsageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> AppUsageRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, session: &AppUsageSession) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO application_usage
                 (app_name, app_bundle_id, window_title, start_time, end_time, duration_seconds, is_browser)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.app_name,
                    session.app_bundle_id,
                    session.window_title,
                    session.start_time,
                    session.end_time,
                    session.duration_seconds,
                    session.is_browser,
                ],
            )
            .context("failed to insert application_usage row")?;
        Ok(self.conn.last_insert_rowid())
    }
}

impl Database {
    pub async fn insert_app_session(&self, session: AppUsageSession) -> Result<i64> {
        self.execute(move |conn| AppUsageRepository::new(conn).insert(&session))
            .await
    }
}
