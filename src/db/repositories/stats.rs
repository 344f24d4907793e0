use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::{
    connection::Database,
    helpers::date_key,
    models::{DailyStats, TopSite},
};

const TOP_SITES_LIMIT: i64 = 5;

pub struct StatsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> StatsRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn daily(&self, date: NaiveDate) -> Result<DailyStats> {
        let day = date_key(date);

        let (sites_visited, total_time_seconds): (i64, i64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(duration_seconds), 0)
                 FROM browsing_history
                 WHERE DATE(visit_time) = ?1",
                params![day],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("failed to aggregate browsing_history")?;

        let mut stmt = self.conn.prepare(
            "SELECT url, MAX(title), COALESCE(SUM(duration_seconds), 0) AS total_time
             FROM browsing_history
             WHERE DATE(visit_time) = ?1
             GROUP BY url
             ORDER BY total_time DESC, url ASC
             LIMIT ?2",
        )?;
        let top_sites = stmt
            .query_map(params![day, TOP_SITES_LIMIT], |row| {
                Ok(TopSite {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    time: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read top sites")?;

        let search_queries: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM search_queries WHERE DATE(search_time) = ?1",
                params![day],
                |row| row.get(0),
            )
            .context("failed to count search_queries")?;

        let applications_used: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(DISTINCT app_name) FROM application_usage WHERE DATE(start_time) = ?1",
                params![day],
                |row| row.get(0),
            )
            .context("failed to count application_usage")?;

        Ok(DailyStats {
            sites_visited,
            total_time_seconds,
            top_sites,
            search_queries,
            applications_used,
        })
    }
}

impl Database {
    pub async fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats> {
        self.query(move |conn| StatsRepository::new(conn).daily(date))
            .await
    }
}
