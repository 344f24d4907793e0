use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::db::{
    connection::Database,
    models::{
        opaque_text, Bookmark, BrowserRecord, Download, NavigationEvent, PageVisit, SaveOutcome,
        SearchClick, SearchQuery, UserInteraction,
    },
};

pub struct BrowserEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> BrowserEventRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(&self, record: &BrowserRecord) -> Result<SaveOutcome> {
        match record {
            BrowserRecord::PageVisit(visit) => self.insert_page_visit(visit),
            BrowserRecord::SearchQuery(query) => self.insert_search_query(query),
            BrowserRecord::SearchClick(click) => self.link_search_click(click),
            BrowserRecord::Navigation(event) => self.insert_navigation(event),
            BrowserRecord::Download(download) => self.insert_download(download),
            BrowserRecord::Bookmark(bookmark) => self.insert_bookmark(bookmark),
            BrowserRecord::Interaction(interaction) => self.insert_interaction(interaction),
        }
    }

    fn insert_page_visit(&self, visit: &PageVisit) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO browsing_history
                 (url, title, visit_time, leave_time, duration_seconds, tab_id, is_active, active_duration_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    visit.url,
                    visit.title,
                    visit.visit_time,
                    visit.leave_time,
                    visit.duration_seconds,
                    visit.tab_id,
                    visit.is_active,
                    visit.active_duration_seconds,
                ],
            )
            .context("failed to insert browsing_history row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    fn insert_search_query(&self, query: &SearchQuery) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO search_queries (query, search_engine, search_time)
                 VALUES (?1, ?2, ?3)",
                params![query.query, query.search_engine, query.search_time],
            )
            .context("failed to insert search_queries row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    /// Attaches a click to its query. Without an explicit id the newest query
    /// by `search_time` wins, which can mislink when searches overlap.
    fn link_search_click(&self, click: &SearchClick) -> Result<SaveOutcome> {
        let query_id = match click.search_query_id {
            Some(id) => {
                let found = self
                    .conn
                    .query_row(
                        "SELECT id FROM search_queries WHERE id = ?1",
                        params![id],
                        |row| row.get::<_, i64>(0),
                    )
                    .optional()?;
                match found {
                    Some(id) => id,
                    None => {
                        return Ok(SaveOutcome::Dropped(format!(
                            "search query {id} does not exist"
                        )))
                    }
                }
            }
            None => match self.most_recent_query_id()? {
                Some(id) => id,
                None => {
                    return Ok(SaveOutcome::Dropped(
                        "no search query to link click to".into(),
                    ))
                }
            },
        };

        self.conn
            .execute(
                "INSERT INTO search_result_clicks
                 (search_query_id, result_url, result_title, result_position, click_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    query_id,
                    click.result_url,
                    click.result_title,
                    click.result_position,
                    click.click_time,
                ],
            )
            .context("failed to insert search_result_clicks row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    fn most_recent_query_id(&self) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT id FROM search_queries
                 ORDER BY search_time DESC, id DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn insert_navigation(&self, event: &NavigationEvent) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO navigation_events
                 (url, tab_id, opener_tab_id, transition_type, transition_qualifiers, is_spa_navigation, event_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.url,
                    event.tab_id,
                    event.opener_tab_id,
                    event.transition_type,
                    opaque_text(event.transition_qualifiers.as_ref()),
                    event.is_spa_navigation,
                    event.event_time,
                ],
            )
            .context("failed to insert navigation_events row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    fn insert_download(&self, download: &Download) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO downloads (filename, url, mime_type, file_size, download_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    download.filename,
                    download.url,
                    download.mime_type,
                    download.file_size,
                    download.download_time,
                ],
            )
            .context("failed to insert downloads row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    fn insert_bookmark(&self, bookmark: &Bookmark) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO bookmarks (url, title, bookmark_time) VALUES (?1, ?2, ?3)",
                params![bookmark.url, bookmark.title, bookmark.bookmark_time],
            )
            .context("failed to insert bookmarks row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }

    fn insert_interaction(&self, interaction: &UserInteraction) -> Result<SaveOutcome> {
        self.conn
            .execute(
                "INSERT INTO user_interactions (url, tab_id, interaction_type, interaction_data, event_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    interaction.url,
                    interaction.tab_id,
                    interaction.interaction_type,
                    opaque_text(interaction.interaction_data.as_ref()),
                    interaction.event_time,
                ],
            )
            .context("failed to insert user_interactions row")?;
        Ok(SaveOutcome::Saved(self.conn.last_insert_rowid()))
    }
}

/// Each record gets its own savepoint so a failing row only rolls back itself.
fn save_in_savepoint(tx: &mut Transaction<'_>, record: &BrowserRecord) -> Result<SaveOutcome> {
    let savepoint = tx.savepoint().context("failed to open savepoint")?;
    let outcome = BrowserEventRepository::new(&savepoint).insert(record)?;
    savepoint.commit().context("failed to release savepoint")?;
    Ok(outcome)
}

impl Database {
    /// Writes a batch of records. The outer error means the batch as a whole
    /// could not be committed; inner errors belong to single records.
    pub async fn save_records(
        &self,
        records: Vec<BrowserRecord>,
    ) -> Result<Vec<Result<SaveOutcome>>> {
        self.execute(move |conn| {
            let mut tx = conn
                .transaction()
                .context("failed to open batch transaction")?;

            let outcomes = records
                .iter()
                .map(|record| save_in_savepoint(&mut tx, record))
                .collect::<Vec<_>>();

            tx.commit().context("failed to commit batch")?;
            Ok(outcomes)
        })
        .await
    }
}
