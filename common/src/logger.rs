use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";

/// Splits `log_file` into the directory the daily appender rolls into and the
/// file name prefix. A bare file name lands in `logs/`.
fn split_log_path(log_file: &str) -> (PathBuf, String) {
    let path = Path::new(log_file);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from(DEFAULT_LOG_DIR),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attendance.log".into());
    (dir, name)
}

/// Installs the global tracing subscriber.
///
/// Events always go to a daily rolling file; `log_to_stdout` adds an ANSI
/// stdout layer. `log_level` is an `EnvFilter` directive such as
/// `services=debug,db=info`. Keep the returned guard alive for the lifetime of
/// the process or buffered file output is lost.
pub fn init_logging(log_file: &str, log_level: &str, log_to_stdout: bool) -> WorkerGuard {
    let (dir, name) = split_log_path(log_file);
    fs::create_dir_all(&dir).ok();

    let file_appender = rolling::daily(&dir, name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if log_to_stdout {
        let stdout_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(true);
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
