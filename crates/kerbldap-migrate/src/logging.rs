//! Tracing subscriber setup for the command line tool.

use kerbldap_core::{Error, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// Console output honours `RUST_LOG` and defaults to `info`; `debug` forces debug level for
/// every target. When `log_file` is given, the same events are appended to it without ANSI
/// colouring.
///
/// # Errors
///
/// Returns [`Error::Io`] when the log file cannot be opened and [`Error::Internal`] when a
/// global subscriber is already installed.
pub fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = build_env_filter(debug);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|err| Error::Internal(format!("failed to initialise logging: {err}")))
}

fn build_env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
