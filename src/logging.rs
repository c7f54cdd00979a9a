use crate::error::ConfigError;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Process logging setup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error` or `off`
    pub level: String,
    /// Colour whole terminal lines by level
    pub colored: bool,
    /// Also append plain lines to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colored: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::Logging(format!("unknown log level {:?}", self.level)))
    }
}

fn line(
    out: fern::FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
    colors: Option<&ColoredLevelConfig>,
) {
    let text = format!(
        "{} - {} - {} - {} ({}:{})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        record.target(),
        record.level(),
        message,
        record.file().unwrap_or("?"),
        record.line().unwrap_or(0),
    );
    match colors {
        Some(colors) => out.finish(format_args!(
            "\x1B[{}m{}\x1B[0m",
            colors.get_color(&record.level()).to_fg_str(),
            text
        )),
        None => out.finish(format_args!("{}", text)),
    }
}

/// Install the global logger.
///
/// Lines look like `<ts> - <target> - <LEVEL> - <message> (<file>:<line>)`.
/// Fails with `ConfigError::Logging` if a logger is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let level = config.level_filter()?;
    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::White)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);
    let colored = config.colored;

    let terminal = fern::Dispatch::new()
        .format(move |out, message, record| {
            line(out, message, record, colored.then_some(&colors))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().level(level).chain(terminal);

    if let Some(path) = &config.file {
        let file = fern::log_file(path)?;
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| line(out, message, record, None))
                .chain(file),
        );
    }

    dispatch
        .apply()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        let mut config = LoggingConfig::default();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Info);

        config.level = "DEBUG".to_string();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);

        config.level = "loud".to_string();
        assert!(matches!(config.level_filter(), Err(ConfigError::Logging(_))));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            colored: false,
            file: None,
        };
        // the first call may lose to another test's logger; the second never succeeds
        let _ = init(&config);
        assert!(matches!(init(&config), Err(ConfigError::Logging(_))));
    }
}
