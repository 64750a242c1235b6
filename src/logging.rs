use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "2fas-tray.log";

/// Where the tray logs, `~/2fas-tray.log`.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Logs to a fresh log file each run. The tray has no terminal to print to,
/// so stderr is only used if the file cannot be created.
pub fn init_file_logging() {
    let env_filter = filter("info");

    let file = match log_path().map(File::create) {
        Some(Ok(file)) => file,
        Some(Err(err)) => {
            eprintln!("failed to open log file: {err}");
            init_stderr_logging_with(env_filter);
            return;
        }
        None => {
            init_stderr_logging_with(env_filter);
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

/// Command line subcommands keep stderr quiet unless something is wrong.
pub fn init_stderr_logging() {
    init_stderr_logging_with(filter("warn"));
}

fn init_stderr_logging_with(env_filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
