//! Debug log written with `--debug`.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV: &str = "PROCPROG_LOG";
const DEFAULT_DIRECTIVES: &str = "procprog=trace";

#[derive(Debug)]
pub enum LogInitError {
    Create {
        path: PathBuf,
        error: std::io::Error,
    },
    Filter(ParseError),
    Install(TryInitError),
}

impl std::fmt::Display for LogInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogInitError::Create { path, error } => {
                write!(f, "failed to create debug log {}: {error}", path.display())
            }
            LogInitError::Filter(error) => write!(f, "invalid {LOG_ENV} directives: {error}"),
            LogInitError::Install(error) => write!(f, "failed to install debug logger: {error}"),
        }
    }
}

impl std::error::Error for LogInitError {}

impl From<ParseError> for LogInitError {
    fn from(value: ParseError) -> Self {
        Self::Filter(value)
    }
}

impl From<TryInitError> for LogInitError {
    fn from(value: TryInitError) -> Self {
        Self::Install(value)
    }
}

pub fn log_file_name(command_name: &str, started: SystemTime) -> String {
    let seconds = started
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("{command_name}_{seconds}.log")
}

fn build_filter(directives: Option<&str>) -> Result<EnvFilter, ParseError> {
    match directives.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(DEFAULT_DIRECTIVES),
    }
}

/// Installs a file subscriber writing to `<command>_<unix-seconds>.log` in the
/// working directory and returns the log path.
pub fn init_debug_log(command_name: &str) -> Result<PathBuf, LogInitError> {
    let path = PathBuf::from(log_file_name(command_name, SystemTime::now()));
    let file = File::create(&path).map_err(|error| LogInitError::Create {
        path: path.clone(),
        error,
    })?;
    let directives = std::env::var(LOG_ENV).ok();
    let filter = build_filter(directives.as_deref())?;

    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_thread_names(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()?;
    tracing::info!(path = %path.display(), "debug log started");
    Ok(path)
}

/// Traces every byte with the run time it was seen at.
pub fn trace_bytes(source: &'static str, elapsed: Duration, bytes: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let seconds = elapsed.as_secs_f64();
    for &byte in bytes {
        tracing::trace!(
            seconds = format_args!("{seconds:.6}"),
            source,
            byte = format_args!("{byte:#04x}"),
            glyph = %char::from(byte).escape_default(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_named_after_command_and_start_time() {
        let started = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(log_file_name("make", started), "make_1700000000.log");
    }

    #[test]
    fn filter_defaults_to_tracing_this_crate() {
        let filter = build_filter(None).expect("default filter");
        assert!(filter.to_string().contains(DEFAULT_DIRECTIVES));
        let filter = build_filter(Some("  ")).expect("blank filter");
        assert!(filter.to_string().contains(DEFAULT_DIRECTIVES));
    }

    #[test]
    fn custom_directives_are_validated() {
        assert!(build_filter(Some("procprog=debug")).is_ok());
        assert!(build_filter(Some("procprog=notalevel")).is_err());
    }
}
