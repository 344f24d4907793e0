use std::sync::Arc;
use std::time::Duration;

use activity_host_lib::{
    config::HostConfig,
    db::{Database, SchemaSource},
    host::HostProcess,
    protocol::{read_message, write_message},
    tracking::{ProbeError, WindowInfo, WindowProbe},
};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

struct FixedWindow;

impl WindowProbe for FixedWindow {
    fn active_window(&self) -> Result<Option<WindowInfo>, ProbeError> {
        Ok(Some(WindowInfo {
            app_name: "Editor".into(),
            window_title: "notes.md".into(),
            bundle_id: "com.test.editor".into(),
            pid: 42,
        }))
    }
}

struct Client {
    tx: DuplexStream,
    rx: DuplexStream,
    host: JoinHandle<()>,
}

impl Client {
    async fn call(&mut self, message: Value) -> Value {
        write_message(&mut self.tx, &message).await.unwrap();
        self.recv().await
    }

    async fn recv(&mut self) -> Value {
        read_message(&mut self.rx)
            .await
            .unwrap()
            .expect("host closed the stream")
    }

    /// Closes the client side and waits for the host to shut down.
    async fn hang_up(self) {
        drop(self.tx);
        tokio::time::timeout(Duration::from_secs(5), self.host)
            .await
            .expect("host did not exit")
            .unwrap();
    }
}

fn config(dir: &tempfile::TempDir) -> HostConfig {
    HostConfig {
        database_path: dir.path().join("database").join("activity.db"),
        schema_path: dir.path().join("database").join("schema.sql"),
        log_file: None,
        poll_interval_ms: 100,
        shutdown_grace_ms: 2000,
    }
}

fn spawn_host(config: &HostConfig) -> Client {
    let db = Database::open(config.database_path.clone(), config.schema_source()).unwrap();
    let (tx, host_rx) = tokio::io::duplex(64 * 1024);
    let (host_tx, rx) = tokio::io::duplex(64 * 1024);

    let process = HostProcess::new(db, Arc::new(FixedWindow), config);
    let host = tokio::spawn(async move {
        process.run(host_rx, host_tx).await.unwrap();
    });

    Client { tx, rx, host }
}

#[tokio::test]
async fn saved_visit_is_reported_by_stats() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = spawn_host(&config(&dir));

    let saved = client
        .call(json!({
            "command": "save_browser_data",
            "data": [{
                "type": "browsing_history",
                "data": {"url": "https://a.com", "title": "A", "visit_time": "2025-01-01T10:00:00", "duration_seconds": 30}
            }]
        }))
        .await;
    assert_eq!(saved, json!({"status": "success", "saved": 1}));

    let stats = client
        .call(json!({"command": "get_stats", "date": "2025-01-01"}))
        .await;
    assert_eq!(stats["status"], "success");
    assert_eq!(stats["sites_visited"], 1);
    assert_eq!(stats["total_time_seconds"], 30);
    assert_eq!(
        stats["top_sites"],
        json!([{"url": "https://a.com", "title": "A", "time": 30}])
    );

    client.hang_up().await;
}

#[tokio::test]
async fn second_start_reports_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = spawn_host(&config(&dir));

    let first = client.call(json!({"command": "start_app_tracking"})).await;
    let second = client.call(json!({"command": "start_app_tracking"})).await;
    assert_eq!(first, json!({"status": "success", "message": "Started"}));
    assert_eq!(second, json!({"status": "success", "message": "Already running"}));

    client.hang_up().await;
}

#[tokio::test]
async fn errors_leave_the_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = spawn_host(&config(&dir));

    let unknown = client.call(json!({"command": "teleport"})).await;
    assert_eq!(
        unknown,
        json!({"status": "error", "message": "Unknown command: teleport"})
    );

    let missing = client.call(json!({"data": []})).await;
    assert_eq!(
        missing,
        json!({"status": "error", "message": "Unknown command: null"})
    );

    let stopped = client.call(json!({"command": "stop_app_tracking"})).await;
    assert_eq!(stopped, json!({"status": "success"}));

    client.hang_up().await;
}

#[tokio::test]
async fn hang_up_flushes_the_open_app_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut client = spawn_host(&config);

    client.call(json!({"command": "start_app_tracking"})).await;
    tokio::time::sleep(Duration::from_millis(1300)).await;
    client.hang_up().await;

    let db = Database::open(config.database_path.clone(), SchemaSource::Embedded).unwrap();
    let rows: Vec<(String, String, i64)> = db
        .query(|conn| {
            let mut stmt = conn.prepare(
                "SELECT app_name, window_title, duration_seconds FROM application_usage",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "Editor");
    assert_eq!(rows[0].1, "notes.md");
    assert!(rows[0].2 >= 1);
}

#[tokio::test]
async fn truncated_frame_ends_the_session_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = spawn_host(&config(&dir));

    client.tx.write_all(&100u32.to_le_bytes()).await.unwrap();
    client.tx.write_all(b"{\"command\"").await.unwrap();
    client.hang_up().await;
}

#[tokio::test]
async fn invalid_json_closes_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let mut client = spawn_host(&config);

    let saved = client
        .call(json!({
            "command": "save_browser_data",
            "data": [{
                "type": "bookmark",
                "data": {"url": "https://a.com", "bookmark_time": "2025-01-01T10:00:00"}
            }]
        }))
        .await;
    assert_eq!(saved["saved"], 1);

    let garbage = b"{bad";
    client
        .tx
        .write_all(&(garbage.len() as u32).to_le_bytes())
        .await
        .unwrap();
    client.tx.write_all(garbage).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), &mut client.host)
        .await
        .expect("host kept serving after invalid JSON")
        .unwrap();
    assert!(read_message(&mut client.rx).await.unwrap().is_none());

    // Storage was closed cleanly and the earlier write is durable.
    let db = Database::open(config.database_path.clone(), SchemaSource::Embedded).unwrap();
    let bookmarks: i64 = db
        .query(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))?))
        .await
        .unwrap();
    assert_eq!(bookmarks, 1);
}
