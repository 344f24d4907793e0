//! Log setup plus conditional logging macros gated by a module-level
//! `ENABLE_LOGS` flag.
//!
//! stdout carries protocol frames, so records go to a file or stderr only.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("only logged when ENABLE_LOGS is true");
//! ```

use std::{
    fs::{self, OpenOptions},
    path::Path,
};

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

/// Installs the global logger. Level comes from `RUST_LOG`, defaulting to
/// `info`. Falls back to stderr when `log_file` cannot be opened; the returned
/// error says why.
pub fn init_logging(log_file: Option<&Path>) -> Option<anyhow::Error> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();

    let file_error = match log_file.map(open_log_file) {
        Some(Ok(file)) => {
            builder.target(Target::Pipe(Box::new(file)));
            None
        }
        Some(Err(err)) => {
            builder.target(Target::Stderr);
            Some(err)
        }
        None => {
            builder.target(Target::Stderr);
            None
        }
    };

    // A logger may already be installed (tests, embedding); keep it.
    let _ = builder.try_init();
    file_error
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_and_parent_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("native-host.log");

        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        assert!(open_log_file(dir.path()).is_err());
    }
}
