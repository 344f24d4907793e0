pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod protocol;
pub mod tracking;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};

use config::HostConfig;
use db::Database;
use error::HostResult;
use host::HostProcess;
use tracking::SystemWindowProbe;

pub use utils::logging::init_logging;

/// Entry point for the native messaging host binary.
pub fn run() -> ExitCode {
    let (config, config_error) = HostConfig::load();

    if let Some(err) = init_logging(config.log_file.as_deref()) {
        warn!("Logging to stderr: {err:#}");
    }
    if let Some(err) = config_error {
        warn!("Using default configuration: {err:#}");
    }

    info!("Activity host starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve_stdio(config)) {
        Ok(()) => {
            info!("Activity host exited");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn serve_stdio(config: HostConfig) -> HostResult<()> {
    let db = Database::open(config.database_path.clone(), config.schema_source())?;

    match db.settings().await {
        Ok(settings) => info!(
            "Tracking settings: enabled={}, retention={}d",
            settings.tracking_enabled, settings.data_retention_days
        ),
        Err(err) => warn!("Failed to read tracking settings: {err:#}"),
    }

    HostProcess::new(db, Arc::new(SystemWindowProbe::new()), &config)
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
}
