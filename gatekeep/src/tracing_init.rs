//! Logging setup for the CLI.
//!
//! Debug output from both gatekeep crates goes to a log file; stderr only
//! carries warnings unless `--verbose` is given or the file is unavailable.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use crate::settings::GatekeepSettings;

/// Directives for everything gatekeep itself logs at debug.
const DEBUG_DIRECTIVES: &str = "gatekeep=debug,gatekeep_policy=debug";

/// Where the log file lives: `GATEKEEP_LOG` if set (`off` or empty disables
/// the file), otherwise `gatekeep.log` in the settings directory.
fn resolve_log_path(env: Option<String>, settings_dir: Option<PathBuf>) -> Option<PathBuf> {
    match env {
        Some(value) if value.is_empty() || value.eq_ignore_ascii_case("off") => None,
        Some(value) => Some(PathBuf::from(value)),
        None => Some(settings_dir.unwrap_or_default().join("gatekeep.log")),
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Default stderr directives when `GATEKEEP_LOG_LEVEL` is not set.
fn stderr_directives(verbose: bool, has_log_file: bool) -> &'static str {
    match (verbose, has_log_file) {
        (true, _) => DEBUG_DIRECTIVES,
        (false, false) => "gatekeep=info,gatekeep_policy=info",
        (false, true) => "warn",
    }
}

pub fn init_tracing(verbose: bool) {
    let log_path = resolve_log_path(
        std::env::var("GATEKEEP_LOG").ok(),
        GatekeepSettings::settings_dir().ok(),
    );
    let log_file = log_path.as_deref().and_then(open_log_file);

    let stderr_filter = if verbose {
        EnvFilter::new(stderr_directives(true, log_file.is_some()))
    } else {
        EnvFilter::try_from_env("GATEKEEP_LOG_LEVEL")
            .unwrap_or_else(|_| EnvFilter::new(stderr_directives(false, log_file.is_some())))
    };

    let file_layer = log_file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_writer(file)
            .pretty()
            .with_ansi(false)
            .with_filter(EnvFilter::new(DEBUG_DIRECTIVES))
    });
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_from_env() {
        assert_eq!(
            resolve_log_path(Some("/tmp/g.log".into()), None),
            Some(PathBuf::from("/tmp/g.log"))
        );
        assert_eq!(resolve_log_path(Some("off".into()), None), None);
        assert_eq!(resolve_log_path(Some(String::new()), None), None);
    }

    #[test]
    fn log_path_defaults_to_settings_dir() {
        assert_eq!(
            resolve_log_path(None, Some(PathBuf::from("/home/u/.gatekeep"))),
            Some(PathBuf::from("/home/u/.gatekeep/gatekeep.log"))
        );
        assert_eq!(
            resolve_log_path(None, None),
            Some(PathBuf::from("gatekeep.log"))
        );
    }

    #[test]
    fn stderr_is_quiet_when_logging_to_file() {
        assert_eq!(stderr_directives(false, true), "warn");
        assert_eq!(stderr_directives(true, true), DEBUG_DIRECTIVES);
        assert!(stderr_directives(false, false).contains("=info"));
    }

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gatekeep.log");
        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
    }
}
