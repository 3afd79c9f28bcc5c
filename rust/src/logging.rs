/// Logging initialization.
///
/// - stderr via `tracing-subscriber::fmt`, filtered by `RUST_LOG` when set
/// - a plain-text copy in `<data_dir>/chat.log` so host apps without a console
///   (mobile simulators, GUI shells) still have retrievable logs
///
/// Called once at the start of `FfiApp::new()`, before anything else. Later
/// calls are no-ops.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let log_path = std::path::Path::new(data_dir).join(LOG_FILE_NAME);
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

const DEFAULT_FILTER: &str = "chat_core=debug,info";
const LOG_FILE_NAME: &str = "chat.log";
