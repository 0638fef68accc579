use crate::domain::settings::{LogFile, LogSettings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the file writer alive. Dropping it flushes pending lines.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// File rotation named in the settings. Unknown names fall back to daily.
pub fn rotation(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Fails instead of panicking when the host application already installed
/// one.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let console = settings.console.then(|| fmt::layer().with_target(true));

    let (file, guard) = match &settings.file {
        Some(LogFile {
            dir,
            prefix,
            rotation: name,
        }) => {
            let appender = RollingFileAppender::new(rotation(name), dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter(&settings.level))
        .with(console)
        .with(file)
        .try_init()?;

    tracing::info!("Logging initialized (level: {})", settings.level);
    Ok(LoggingGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("Hourly"), Rotation::HOURLY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("weekly"), Rotation::DAILY);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let settings = LogSettings {
            console: false,
            ..Default::default()
        };
        let first = init_logger(&settings);
        // Another test may have installed a subscriber first; either way the
        // second call must not panic.
        let second = init_logger(&settings);
        assert!(first.is_err() || second.is_err());
    }
}
