use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::Database;

use super::loop_worker::tracking_loop;
use super::probe::WindowProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StartOutcome::Started => "Started",
            StartOutcome::AlreadyRunning => "Already running",
        }
    }
}

/// Owns the lifecycle of the app tracking task.
///
/// Stopped tasks keep running until they have flushed their last session;
/// they are kept in `draining` so shutdown can still wait for them.
pub struct TrackerSupervisor {
    db: Database,
    probe: Arc<dyn WindowProbe>,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    draining: Vec<JoinHandle<()>>,
}

impl TrackerSupervisor {
    pub fn new(db: Database, probe: Arc<dyn WindowProbe>, poll_interval: Duration) -> Self {
        Self {
            db,
            probe,
            poll_interval,
            handle: None,
            cancel_token: None,
            draining: Vec::new(),
        }
    }

    pub fn start(&mut self) -> StartOutcome {
        self.reap();
        if self.is_running() {
            return StartOutcome::AlreadyRunning;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            self.db.clone(),
            Arc::clone(&self.probe),
            self.poll_interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        StartOutcome::Started
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the task to stop without waiting for it. Returns whether a
    /// task was running.
    pub fn stop(&mut self) -> bool {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                self.draining.push(handle);
                self.reap();
                if was_running {
                    info!("App tracking stop requested");
                }
                was_running
            }
            None => false,
        }
    }

    /// Tasks that have not finished yet, including ones still draining.
    #[cfg(test)]
    fn live_tasks(&self) -> usize {
        let active = usize::from(self.is_running());
        active
            + self
                .draining
                .iter()
                .filter(|handle| !handle.is_finished())
                .count()
    }

    /// Stops tracking and waits for every task to flush, giving up after
    /// `grace`.
    pub async fn shutdown(&mut self, grace: Duration) {
        self.stop();
        let handles: Vec<_> = self.draining.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        let joined = tokio::time::timeout(grace, async {
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!("app tracking task failed to join: {err}");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => info!("App tracking stopped"),
            Err(_) => warn!(
                "app tracking did not stop within {}ms",
                grace.as_millis()
            ),
        }
    }

    fn reap(&mut self) {
        self.draining.retain(|handle| !handle.is_finished());
    }
}
