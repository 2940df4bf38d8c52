//! Process-wide logging setup shared by the server and the importer.
//!
//! The filter sits behind a reload layer so the level from the config file
//! can replace the bootstrap level once configuration is loaded. An explicit
//! `RUST_LOG` always wins over both.

use std::io::ErrorKind;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn rust_log_is_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

fn filter_for(level: &str) -> EnvFilter {
    if rust_log_is_set() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::new(level)
}

/// Reads `.env` from the working directory. A missing file is normal.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(e)) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => eprintln!("ignoring unreadable .env file: {e}"),
    }
}

/// Installs the global subscriber at `level`. Later calls are ignored.
pub fn init_tracing(level: &str) {
    let (filter, handle) = reload::Layer::new(filter_for(level));
    if FILTER.set(handle).is_err() {
        return;
    }
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Swaps in the configured level.
pub fn set_level(level: &str) {
    if rust_log_is_set() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.reload(EnvFilter::new(level)) {
        tracing::warn!(error = %e, level, "could not change log level");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_level_before_init_is_harmless() {
        set_level("debug");
    }
}
