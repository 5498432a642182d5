//! Tracing initialization — the daemon appends structured logs to
//! `{state_path}/cortexd.log`.
//!
//! Append mode matters: inspection commands run against a live daemon and
//! must not truncate its log. Short writes (< PIPE_BUF = 4096) are atomic
//! on Linux/macOS.

use std::path::Path;
use std::sync::Mutex;

/// Initialize tracing to `{state_path}/cortexd.log` (append mode).
pub fn init_file_tracing(state_path: &Path) {
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(state_path).ok();
    let log_path = state_path.join("cortexd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|_| {
            let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
            std::fs::File::create(null).expect("Cannot create log fallback")
        });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .init();
}

/// Initialize tracing to stderr. Used by one-shot inspection commands.
pub fn init_stderr_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
