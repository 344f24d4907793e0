//! Executes decoded commands against storage and the tracker.

use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde_json::Value;

use crate::{
    db::{BrowserRecord, Database, SaveOutcome, SettingsPatch},
    error::{HostError, HostResult},
    protocol::{decode_record, Command, ItemFailure, Payload, Response, SaveSummary},
    tracking::TrackerSupervisor,
};

/// Failures listed individually in a `save_browser_data` reply.
const MAX_REPORTED_FAILURES: usize = 100;

pub struct CommandDispatcher {
    db: Database,
}

impl CommandDispatcher {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every failure is turned into an error response; this never fails.
    pub async fn dispatch(&self, envelope: Value, tracker: &mut TrackerSupervisor) -> Response {
        let command = match Command::from_envelope(envelope) {
            Ok(command) => command,
            Err(err) => {
                warn!("rejected message: {err}");
                return err.into();
            }
        };

        let name = command.name();
        let result = match command {
            Command::SaveBrowserData { data } => self.save_browser_data(data).await,
            Command::GetStats { date } => self.get_stats(date).await,
            Command::UpdateSettings { settings } => self.update_settings(settings).await,
            Command::StartAppTracking {} => Ok(Response::message(tracker.start().message())),
            Command::StopAppTracking {} => {
                tracker.stop();
                Ok(Response::ok())
            }
        };

        result.unwrap_or_else(|err| {
            warn!("{name} failed: {err}");
            err.into()
        })
    }

    async fn save_browser_data(&self, items: Vec<Value>) -> HostResult<Response> {
        let mut failures = Vec::new();
        let mut indices = Vec::with_capacity(items.len());
        let mut records: Vec<BrowserRecord> = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            match decode_record(item) {
                Ok(record) => {
                    indices.push(index);
                    records.push(record);
                }
                Err(err) => failures.push(ItemFailure {
                    index,
                    kind: item.get("type").and_then(Value::as_str).map(str::to_owned),
                    saved: false,
                    message: err.to_string(),
                }),
            }
        }

        let kinds: Vec<&'static str> = records.iter().map(|r| r.kind().as_str()).collect();
        let outcomes = if records.is_empty() {
            Vec::new()
        } else {
            self.db
                .save_records(records)
                .await
                .map_err(HostError::StorageWrite)?
        };

        let mut saved = 0;
        for ((index, kind), outcome) in indices.into_iter().zip(kinds).zip(outcomes) {
            let message = match outcome {
                Ok(SaveOutcome::Saved(_)) => {
                    saved += 1;
                    continue;
                }
                Ok(SaveOutcome::Dropped(reason)) => reason,
                Err(err) => format!("{err:#}"),
            };
            failures.push(ItemFailure {
                index,
                kind: Some(kind.to_owned()),
                saved: false,
                message,
            });
        }
        failures.sort_by_key(|failure| failure.index);

        info!(
            "save_browser_data: {} saved, {} failed",
            saved,
            failures.len()
        );
        let failures_omitted = failures.len().saturating_sub(MAX_REPORTED_FAILURES);
        failures.truncate(MAX_REPORTED_FAILURES);
        Ok(Response::Success(Payload::Saved(SaveSummary {
            saved,
            failures,
            failures_omitted,
        })))
    }

    async fn get_stats(&self, date: Option<NaiveDate>) -> HostResult<Response> {
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let stats = self
            .db
            .daily_stats(date)
            .await
            .map_err(HostError::StorageWrite)?;
        Ok(Response::Success(Payload::Stats(stats)))
    }

    async fn update_settings(&self, patch: SettingsPatch) -> HostResult<Response> {
        if patch.data_retention_days.is_some_and(|days| days < 0) {
            return Err(HostError::validation(
                "data_retention_days must not be negative",
            ));
        }

        self.db
            .update_settings(patch)
            .await
            .map_err(HostError::StorageWrite)?;
        Ok(Response::ok())
    }
}
