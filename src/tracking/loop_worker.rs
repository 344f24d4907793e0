use std::sync::Arc;

use chrono::Local;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::{AppUsageSession, Database};
use crate::error::HostError;

use super::probe::{ProbeError, WindowInfo, WindowProbe};
use super::state::{FocusChange, FocusState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub async fn tracking_loop(
    db: Database,
    probe: Arc<dyn WindowProbe>,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut focus = FocusState::new();
    let mut probe_failing = false;

    log_info!("app tracking started (interval {}ms)", poll_interval.as_millis());

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("app tracking loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let window = match sample(&probe).await {
                    Ok(window) => {
                        if probe_failing {
                            log_info!("window probe recovered");
                            probe_failing = false;
                        }
                        window
                    }
                    Err(err) => {
                        if !probe_failing {
                            log_warn!("{}", HostError::Capability(err));
                            probe_failing = true;
                        }
                        None
                    }
                };

                let Some(window) = window else { continue };
                let now = Local::now().naive_local();
                let title = window.window_title.clone();
                let app = window.app_name.clone();

                if let FocusChange::Switched { finished } = focus.observe(window, now) {
                    log_info!("Active app changed: {} - {}", app, title);
                    if let Some(session) = finished {
                        persist(&db, session).await;
                    }
                }
            }
        }
    }

    if let Some(session) = focus.close(Local::now().naive_local()) {
        persist(&db, session).await;
    }
}

async fn sample(probe: &Arc<dyn WindowProbe>) -> Result<Option<WindowInfo>, ProbeError> {
    let probe = Arc::clone(probe);
    tokio::task::spawn_blocking(move || probe.active_window())
        .await
        .map_err(|err| ProbeError::Aborted(err.to_string()))?
}

async fn persist(db: &Database, session: AppUsageSession) {
    let app_name = session.app_name.clone();
    let duration = session.duration_seconds;
    match db.insert_app_session(session).await {
        Ok(id) => log_info!("saved app session {} ({}, {}s)", id, app_name, duration),
        Err(err) => log_error!("{}", HostError::StorageWrite(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::db::{BrowserRecord, PageVisit, SchemaSource};

    struct ScriptedProbe {
        samples: Mutex<Vec<Result<Option<WindowInfo>, ProbeError>>>,
        fallback: WindowInfo,
    }

    impl ScriptedProbe {
        fn new(fallback: WindowInfo, mut samples: Vec<Result<Option<WindowInfo>, ProbeError>>) -> Self {
            samples.reverse();
            Self {
                samples: Mutex::new(samples),
                fallback,
            }
        }
    }

    impl WindowProbe for ScriptedProbe {
        fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError> {
            self.samples
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Some(self.fallback.clone())))
        }
    }

    fn window(app: &str, title: &str) -> WindowInfo {
        WindowInfo {
            app_name: app.into(),
            window_title: title.into(),
            bundle_id: format!("com.test.{}", app.to_lowercase()),
            pid: 7,
        }
    }

    async fn sessions(db: &Database) -> Vec<(i64, String, i64)> {
        db.query(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, app_name, duration_seconds FROM application_usage ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn cancellation_flushes_the_open_session() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("activity.db"), SchemaSource::Embedded).unwrap();
        let probe: Arc<dyn WindowProbe> = Arc::new(ScriptedProbe::new(
            window("Editor", "main.rs"),
            vec![
                Err(ProbeError::Aborted("boom".into())),
                Ok(None),
            ],
        ));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(tracking_loop(
            db.clone(),
            probe,
            Duration::from_millis(50),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1400)).await;
        cancel.cancel();
        task.await.unwrap();

        let rows = sessions(&db).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "Editor");
        assert!(rows[0].2 >= 1);
    }

    #[tokio::test]
    async fn short_sessions_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("activity.db"), SchemaSource::Embedded).unwrap();
        let probe: Arc<dyn WindowProbe> = Arc::new(ScriptedProbe::new(
            window("Terminal", "zsh"),
            vec![Ok(Some(window("Editor", "a"))), Ok(Some(window("Editor", "b")))],
        ));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(tracking_loop(
            db.clone(),
            probe,
            Duration::from_millis(20),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(sessions(&db).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writers_get_distinct_rows() {
        const M: usize = 40;

        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("activity.db"), SchemaSource::Embedded).unwrap();

        let mut tasks = Vec::new();
        for i in 0..M {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    db.insert_app_session(AppUsageSession {
                        app_name: format!("App {i}"),
                        app_bundle_id: String::new(),
                        window_title: String::new(),
                        start_time: "2025-01-01T10:00:00.000000".into(),
                        end_time: "2025-01-01T10:00:05.000000".into(),
                        duration_seconds: 5,
                        is_browser: false,
                    })
                    .await
                    .unwrap();
                } else {
                    let results = db
                        .save_records(vec![BrowserRecord::PageVisit(PageVisit {
                            url: format!("https://site-{i}.test"),
                            title: None,
                            visit_time: "2025-01-01T10:00:00".into(),
                            leave_time: None,
                            duration_seconds: Some(1),
                            tab_id: None,
                            is_active: true,
                            active_duration_seconds: 0,
                        })])
                        .await
                        .unwrap();
                    assert!(results[0].is_ok());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let app_rows = sessions(&db).await;
        assert_eq!(app_rows.len(), M / 2);
        let (visits, distinct): (i64, i64) = db
            .query(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COUNT(DISTINCT id) FROM browsing_history",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(visits as usize, M / 2);
        assert_eq!(distinct, visits);

        let mut ids: Vec<i64> = app_rows.iter().map(|row| row.0).collect();
        ids.dedup();
        assert_eq!(ids.len(), M / 2);
    }
}
