use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the background log writer alive; drop it last.
#[allow(dead_code)]
pub struct LoggerGuard(Option<WorkerGuard>);

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Console logging, plus daily-rotated files when `log_dir` is set.
/// `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<LoggerGuard> {
    let (level, invalid) = if LEVELS.contains(&level) {
        (level, false)
    } else {
        ("info", true)
    };

    let builder = EnvFilter::builder().with_default_directive(level.parse()?);
    let rust_log = std::env::var("RUST_LOG").unwrap_or_default();
    let console_filter = builder.clone().parse_lossy(&rust_log);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, guard) = match log_dir {
        Some(log_dir) => {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("pass-catalog")
                .filename_suffix("log")
                .build(log_dir)?;
            let (non_blocking, guard) = NonBlocking::new(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(builder.parse_lossy(&rust_log));
            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    if invalid {
        tracing::warn!("Invalid log level, defaulting to 'info'");
    }

    Ok(LoggerGuard(guard))
}
