//! Tracing subscriber setup.
//!
//! Engines open a `dispatch` span per event and a `handler` span per spawned
//! handler. [`SpanMode::Lifecycle`] logs when each one closes along with how
//! long it was busy, which is usually enough to find a slow rule.
//!
//! ```rust,ignore
//! use xbot_runtime::config::{LogRotation, SpanMode};
//! use xbot_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::new()
//!     .directive("xbot_framework=debug")
//!     .spans(SpanMode::Lifecycle)
//!     .to_file("logs/xbot.log", LogRotation::Daily)
//!     .try_init()?;
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanMode};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open log file: {0}")]
    File(#[from] InitError),

    #[error("a global subscriber is already installed")]
    AlreadyInstalled(#[from] TryInitError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sink {
    Stdout,
    Stderr,
    File { path: PathBuf, rotation: LogRotation },
}

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: LogLevel,
    directives: Vec<String>,
    format: LogFormat,
    sink: Sink,
    spans: SpanMode,
    thread_ids: bool,
    location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact lines on stdout at `info`.
    pub fn new() -> Self {
        Self {
            level: LogLevel::Info,
            directives: Vec::new(),
            format: LogFormat::Compact,
            sink: Sink::Stdout,
            spans: SpanMode::Off,
            thread_ids: false,
            location: false,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let builder = Self::new()
            .level(config.level)
            .format(config.format)
            .spans(config.spans)
            .thread_ids(config.thread_ids)
            .location(config.file_location);

        let builder = match (config.output, &config.file_path) {
            (LogOutput::Stdout, _) => builder.to_stdout(),
            (LogOutput::Stderr, _) => builder.to_stderr(),
            (LogOutput::File, Some(path)) => builder.to_file(path, config.rotation),
            // rejected by validate_config
            (LogOutput::File, None) => builder.to_stderr(),
        };

        config
            .filters
            .iter()
            .fold(builder, |builder, (module, level)| {
                builder.directive(format!("{module}={level}"))
            })
    }

    /// Level used when `RUST_LOG` is unset.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Adds an `EnvFilter` directive such as `xbot_framework=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn spans(mut self, spans: SpanMode) -> Self {
        self.spans = spans;
        self
    }

    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    /// Adds source file and line to every record.
    pub fn location(mut self, enabled: bool) -> Self {
        self.location = enabled;
        self
    }

    pub fn to_stdout(mut self) -> Self {
        self.sink = Sink::Stdout;
        self
    }

    pub fn to_stderr(mut self) -> Self {
        self.sink = Sink::Stderr;
        self
    }

    /// Writes to `path`, creating its directory if needed.
    pub fn to_file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.sink = Sink::File {
            path: path.into(),
            rotation,
        };
        self
    }

    /// Installs the subscriber. Fails if the log file cannot be opened or
    /// another subscriber got there first.
    pub fn try_init(self) -> Result<(), LoggingError> {
        let layer = self.fmt_layer(self.writer()?);
        tracing_subscriber::registry()
            .with(layer)
            .with(self.env_filter())
            .try_init()?;
        Ok(())
    }

    /// Like [`try_init`](Self::try_init), but a log file that cannot be
    /// opened is reported on stderr instead of returned.
    pub fn init(self) {
        if let Err(err) = self.try_init() {
            if !matches!(err, LoggingError::AlreadyInstalled(_)) {
                eprintln!("logging disabled: {err}");
            }
        }
    }

    /// `RUST_LOG` replaces the configured level; directives apply on top of
    /// either.
    fn env_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()));

        self.directives
            .iter()
            .fold(base, |filter, directive| match directive.parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(err) => {
                    eprintln!("ignoring log directive {directive:?}: {err}");
                    filter
                }
            })
    }

    fn writer(&self) -> Result<BoxMakeWriter, LoggingError> {
        Ok(match &self.sink {
            Sink::Stdout => BoxMakeWriter::new(std::io::stdout),
            Sink::Stderr => BoxMakeWriter::new(std::io::stderr),
            Sink::File { path, rotation } => {
                BoxMakeWriter::new(rolling_appender(path, *rotation)?)
            }
        })
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer::<Registry>()
            .with_writer(writer)
            .with_ansi(!matches!(self.sink, Sink::File { .. }))
            .with_span_events(fmt_span(self.spans))
            .with_thread_ids(self.thread_ids)
            .with_file(self.location)
            .with_line_number(self.location);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

/// `logs/xbot.log` rotated daily becomes `logs/xbot.2026-01-31.log`.
fn rolling_appender(path: &Path, rotation: LogRotation) -> Result<RollingFileAppender, InitError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("xbot");

    let mut builder = RollingFileAppender::builder()
        .rotation(match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        })
        .filename_prefix(stem);
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        builder = builder.filename_suffix(ext);
    }
    builder.build(dir)
}

fn fmt_span(mode: SpanMode) -> FmtSpan {
    match mode {
        SpanMode::Off => FmtSpan::NONE,
        SpanMode::Lifecycle => FmtSpan::NEW | FmtSpan::CLOSE,
        SpanMode::Full => FmtSpan::FULL,
    }
}

/// Installs the global subscriber described by `config`.
pub fn init_from_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    LoggingBuilder::from_config(config).try_init()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xbot-logging-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            output: LogOutput::File,
            file_path: Some(PathBuf::from("logs/bot.log")),
            rotation: LogRotation::Hourly,
            spans: SpanMode::Lifecycle,
            filters: BTreeMap::from([
                ("xbot_runtime".to_string(), LogLevel::Info),
                ("xbot_framework".to_string(), LogLevel::Trace),
            ]),
            ..Default::default()
        };
        let builder = LoggingBuilder::from_config(&config);

        assert_eq!(builder.level, LogLevel::Warn);
        assert_eq!(builder.spans, SpanMode::Lifecycle);
        assert_eq!(
            builder.sink,
            Sink::File {
                path: PathBuf::from("logs/bot.log"),
                rotation: LogRotation::Hourly,
            }
        );
        assert_eq!(
            builder.directives,
            ["xbot_framework=trace", "xbot_runtime=info"]
        );
    }

    #[test]
    fn test_file_output_without_path_uses_stderr() {
        let config = LoggingConfig {
            output: LogOutput::File,
            ..Default::default()
        };
        assert_eq!(LoggingBuilder::from_config(&config).sink, Sink::Stderr);
    }

    #[test]
    fn test_span_modes() {
        assert_eq!(fmt_span(SpanMode::Off), FmtSpan::NONE);
        assert_eq!(fmt_span(SpanMode::Lifecycle), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(fmt_span(SpanMode::Full), FmtSpan::FULL);
    }

    #[test]
    fn test_unrotated_file_keeps_its_name() {
        let dir = scratch_dir("never");
        rolling_appender(&dir.join("bot.log"), LogRotation::Never).unwrap();

        assert!(dir.join("bot.log").is_file());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_daily_file_gets_date_suffix() {
        let dir = scratch_dir("daily");
        rolling_appender(&dir.join("bot.log"), LogRotation::Daily).unwrap();

        let names: Vec<String> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("bot.") && names[0].ends_with(".log"));
        assert_ne!(names[0], "bot.log");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unwritable_log_dir_is_an_error() {
        let dir = scratch_dir("blocked");
        fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let builder = LoggingBuilder::new().to_file(blocker.join("bot.log"), LogRotation::Never);
        assert!(matches!(builder.writer(), Err(LoggingError::File(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
