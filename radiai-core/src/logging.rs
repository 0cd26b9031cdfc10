//! Tracing setup shared by the radiai binaries.

use crate::paths::log_file_path;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with console output and, when enabled, a log file at
/// `~/.config/radiai/<binary>.log`.
pub fn init_tracing(binary: &str, file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = log_file_path(binary);

        match create_log_file(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Truncate or create the log file, creating its directory first.
fn create_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_create_log_file_makes_directory_and_truncates() {
        let dir = std::env::temp_dir().join(format!("radiai-logs-{}", std::process::id()));
        let path = dir.join("nested").join("radiai-test.log");
        let _ = fs::remove_dir_all(&dir);

        let mut file = create_log_file(&path).unwrap();
        file.write_all(b"first run").unwrap();
        drop(file);

        create_log_file(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }
}
