//! Named destinations for log records emitted when a test fails.
//!
//! A [`SinkFactory`] is handed to the watcher explicitly; there is no global registry of sinks.

use anyhow::Context;
use std::{
    fs::{create_dir_all, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, trace, warn, Level};

/// Errors from emitting a record through a [`LogSink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log sink is closed")]
    Closed,
    #[error("log sink name is empty")]
    EmptyName,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A destination for log records.
pub trait LogSink {
    /// Emit a single record. `message` may span multiple lines.
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError>;
}

/// Resolves a [`LogSink`] by name, creating it if necessary.
pub trait SinkFactory: Send + Sync {
    type Sink: LogSink;

    fn sink(&self, name: &str) -> Self::Sink;
}

/// Emits records as [`tracing`] events. The sink name is recorded in the `container` field.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct TracingSinks {}

impl SinkFactory for TracingSinks {
    type Sink = TracingSink;

    fn sink(&self, name: &str) -> TracingSink {
        TracingSink {
            name: name.to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl LogSink for TracingSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        let container = self.name.as_str();
        match level {
            Level::ERROR => error!(container, "{message}"),
            Level::WARN => warn!(container, "{message}"),
            Level::INFO => info!(container, "{message}"),
            Level::DEBUG => debug!(container, "{message}"),
            Level::TRACE => trace!(container, "{message}"),
        }
        Ok(())
    }
}

/// Appends records to one file per sink name, `<directory>/<name>.log`.
#[derive(Clone, Debug)]
pub struct FileSinks {
    directory: PathBuf,
}

impl FileSinks {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl SinkFactory for FileSinks {
    type Sink = FileSink;

    fn sink(&self, name: &str) -> FileSink {
        // Container names may contain path separators, e.g. when they are derived from a URL.
        let file_stem = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        FileSink {
            directory: self.directory.clone(),
            file_stem,
        }
    }
}

/// Appends records to `<directory>/<name>.log`. An empty name is rejected when emitting, since it
/// would produce a hidden `.log` file.
#[derive(Clone, Debug)]
pub struct FileSink {
    directory: PathBuf,
    file_stem: String,
}

impl FileSink {
    /// The file records are appended to.
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.log", self.file_stem))
    }
}

impl LogSink for FileSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        if self.file_stem.is_empty() {
            return Err(SinkError::EmptyName);
        }
        create_dir_all(&self.directory).with_context(|| {
            format!("couldn't create log directory {}", self.directory.display())
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())?;
        writeln!(file, "{level} {message}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileSinks, LogSink, SinkError, SinkFactory, TracingSinks};
    use assert_matches::assert_matches;
    use std::{
        fs,
        io::{self, Write},
        sync::{Arc, Mutex},
    };
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuffer {
        type Writer = SharedBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn tracing_sink_emits_event() {
        let buffer = SharedBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .finish();

        let sink = TracingSinks::default().sink("MockContainer");
        assert_eq!(sink.name(), "MockContainer");
        tracing::subscriber::with_default(subscriber, || {
            sink.emit(Level::ERROR, "Test log line").unwrap();
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("container=\"MockContainer\""), "{output}");
        assert!(output.contains("Test log line"), "{output}");
    }

    #[test]
    fn file_sinks_append_per_name() {
        let directory = tempfile::tempdir().unwrap();
        let sinks = FileSinks::new(directory.path().join("logs"));

        let db = sinks.sink("db");
        assert_eq!(db.path(), directory.path().join("logs/db.log"));
        db.emit(Level::ERROR, "one\ntwo").unwrap();
        sinks.sink("db").emit(Level::WARN, "three").unwrap();
        sinks.sink("http://web/").emit(Level::ERROR, "other").unwrap();

        assert_eq!(
            fs::read_to_string(directory.path().join("logs/db.log")).unwrap(),
            "ERROR one\ntwo\nWARN three\n"
        );
        assert_eq!(
            fs::read_to_string(directory.path().join("logs/http:__web_.log")).unwrap(),
            "ERROR other\n"
        );
    }

    #[test]
    fn file_sink_rejects_empty_name() {
        let directory = tempfile::tempdir().unwrap();
        let sinks = FileSinks::new(directory.path());

        assert_matches!(
            sinks.sink("").emit(Level::ERROR, "lost"),
            Err(SinkError::EmptyName)
        );
        assert!(!directory.path().join(".log").exists());
    }

    #[test]
    fn file_sink_reports_unusable_directory() {
        let directory = tempfile::tempdir().unwrap();
        let blocker = directory.path().join("logs");
        fs::write(&blocker, "not a directory").unwrap();

        assert_matches!(
            FileSinks::new(&blocker).sink("db").emit(Level::ERROR, "lost"),
            Err(SinkError::Other(error)) => {
                assert!(error.to_string().contains("couldn't create log directory"), "{error}");
            }
        );
    }
}
