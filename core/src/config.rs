//! Configuration for failure log watchers.

use crate::sink::{FileSink, FileSinks, LogSink, SinkError, SinkFactory, TracingSink, TracingSinks};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;

/// Configuration options for a [`LogOnFailure`](crate::watcher::LogOnFailure) watcher.
///
/// # Examples
///
/// ```
/// use logwatch_core::config::WatcherConfig;
///
/// let yaml_config = r#"
/// ---
/// max_log_lines: 200
/// log_directory: /tmp/container-logs
/// "#;
///
/// let _decoded: WatcherConfig = serde_yaml::from_str(yaml_config).unwrap();
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// If set, only this many of the most recent lines of output are logged when a test fails.
    /// Must be greater than zero.
    #[serde(default)]
    pub max_log_lines: Option<usize>,
    /// If set, failure logs are appended to `<log_directory>/<container name>.log` instead of
    /// being emitted as tracing events.
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
}

impl WatcherConfig {
    /// Parse a configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Returns the sinks selected by this configuration.
    pub fn sinks(&self) -> ConfiguredSinks {
        match &self.log_directory {
            Some(directory) => ConfiguredSinks::File(FileSinks::new(directory.clone())),
            None => ConfiguredSinks::Tracing(TracingSinks::default()),
        }
    }
}

/// The [`SinkFactory`] chosen by a [`WatcherConfig`].
#[derive(Clone, Debug)]
pub enum ConfiguredSinks {
    Tracing(TracingSinks),
    File(FileSinks),
}

impl SinkFactory for ConfiguredSinks {
    type Sink = ConfiguredSink;

    fn sink(&self, name: &str) -> ConfiguredSink {
        match self {
            Self::Tracing(sinks) => ConfiguredSink::Tracing(sinks.sink(name)),
            Self::File(sinks) => ConfiguredSink::File(sinks.sink(name)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ConfiguredSink {
    Tracing(TracingSink),
    File(FileSink),
}

impl LogSink for ConfiguredSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        match self {
            Self::Tracing(sink) => sink.emit(level, message),
            Self::File(sink) => sink.emit(level, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfiguredSinks, WatcherConfig};
    use assert_matches::assert_matches;
    use std::path::Path;

    #[test]
    fn empty_document_uses_defaults() {
        let config = WatcherConfig::from_yaml("---\n{}\n").unwrap();
        assert_eq!(config, WatcherConfig::default());
        assert_matches!(config.sinks(), ConfiguredSinks::Tracing(_));
    }

    #[test]
    fn log_directory_selects_file_sinks() {
        let config = WatcherConfig::from_yaml(
            r#"
---
max_log_lines: 2
log_directory: /var/log/containers
"#,
        )
        .unwrap();
        assert_eq!(config.max_log_lines, Some(2));
        assert_matches!(config.sinks(), ConfiguredSinks::File(sinks) => {
            assert_eq!(sinks.directory(), Path::new("/var/log/containers"));
        });
    }

    #[test]
    fn roundtrip_encoding() {
        let config = WatcherConfig {
            max_log_lines: Some(50),
            log_directory: Some("/tmp/container-logs".into()),
        };
        let encoded = serde_yaml::to_string(&config).unwrap();
        assert_eq!(WatcherConfig::from_yaml(&encoded).unwrap(), config);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(WatcherConfig::from_yaml("max_lines: 2\n").is_err());
    }

    #[test]
    fn rejects_negative_line_limit() {
        assert!(WatcherConfig::from_yaml("max_log_lines: -1\n").is_err());
    }
}
