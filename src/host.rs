//! Receive → dispatch → send loop over one pipe pair.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Duration;

use crate::{
    config::HostConfig,
    db::Database,
    dispatch::CommandDispatcher,
    error::HostResult,
    protocol::{read_message, write_message, FramingError, Response},
    tracking::{TrackerSupervisor, WindowProbe},
};

pub struct HostProcess {
    db: Database,
    dispatcher: CommandDispatcher,
    tracker: TrackerSupervisor,
    shutdown_grace: Duration,
}

impl HostProcess {
    pub fn new(db: Database, probe: Arc<dyn WindowProbe>, config: &HostConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(db.clone()),
            tracker: TrackerSupervisor::new(db.clone(), probe, config.poll_interval()),
            shutdown_grace: config.shutdown_grace(),
            db,
        }
    }

    /// Serves until the peer closes the stream or the connection breaks,
    /// then stops the tracker and closes storage.
    pub async fn run<R, W>(mut self, mut reader: R, mut writer: W) -> HostResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let served = self.serve(&mut reader, &mut writer).await;
        self.shutdown().await;
        served
    }

    async fn serve<R, W>(&mut self, reader: &mut R, writer: &mut W) -> HostResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let response = match read_message(reader).await {
                Ok(Some(envelope)) => self.dispatcher.dispatch(envelope, &mut self.tracker).await,
                Ok(None) => {
                    info!("Client closed the stream");
                    return Ok(());
                }
                Err(err) => {
                    error!("Connection lost: {err}");
                    return Ok(());
                }
            };

            if let Err(err) = send(writer, &response).await {
                error!("Failed to write response: {err}");
                return Ok(());
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        self.tracker.shutdown(self.shutdown_grace).await;
        self.db.close();
    }
}

/// Writes `response`, replacing it with an error when it cannot be framed.
/// Only I/O failures are returned.
async fn send<W>(writer: &mut W, response: &Response) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    match write_message(writer, response).await {
        Err(err @ (FramingError::Oversized { .. } | FramingError::Encode(_))) => {
            warn!("Response could not be sent as-is: {err}");
            write_message(writer, &Response::error(format!("Failed to send response: {err}"))).await
        }
        other => other,
    }
}
