use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};

use crate::{Error, Result};

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "logfile";
/// Daily files kept before the oldest is deleted.
const MAX_LOG_FILES: usize = 30;

/// Initialize tracing for the bot.
///
/// Default filter: info for our crates, warn for the HTTP/Telegram stack.
/// Can be overridden with `RUST_LOG`. `LOG_FORMAT=json` switches the console to
/// JSON lines.
///
/// Besides the console, events go to a daily rotated file under `LOG_DIR`
/// (default `logs/`, set it empty to disable). The returned guard flushes the
/// file writer on drop and must live as long as the process.
pub fn init(service_name: &str) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,wallcast=info,wallcast_core=info,wallcast_vk=info,wallcast_telegram=info,\
             {service_name}=info,teloxide=warn,reqwest=warn,hyper=warn"
        ))
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let console = if json {
        fmt::layer().with_target(true).json().boxed()
    } else {
        fmt::layer().with_target(false).with_ansi(true).boxed()
    };

    let (file, guard) = match log_dir(std::env::var("LOG_DIR").ok()) {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(&dir)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))?;

    Ok(guard)
}

/// `None` (unset) means the default directory; an empty value disables the file log.
fn log_dir(value: Option<String>) -> Option<PathBuf> {
    match value {
        None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(PathBuf::from(v.trim())),
    }
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| Error::Config(format!("log file in {}: {e}", dir.display())))
}
