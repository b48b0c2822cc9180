//! Logs a container's output when the test using it fails.

use crate::{
    config::{ConfiguredSinks, WatcherConfig},
    output::{OutputFeed, ToStringConsumer},
    sink::{LogSink, SinkError, SinkFactory, TracingSinks},
};
use regex::Regex;
use std::{
    num::NonZeroUsize,
    sync::{Arc, LazyLock},
    thread::panicking,
};
use tracing::{error, Level};

/// Errors from configuring a watcher or reporting a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("maximum number of log lines must be greater than zero, got {0}")]
    InvalidMaxLogLines(usize),
    #[error("couldn't emit log for {name}: {source}")]
    Sink {
        name: String,
        #[source]
        source: SinkError,
    },
    #[error("no async runtime available")]
    Runtime,
}

/// Receives the outcome of a test.
pub trait TestWatcher {
    /// Called when the test succeeds.
    fn succeeded(&self) {}

    /// Called when the test fails.
    fn failed(&self) -> Result<(), Error>;
}

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").unwrap());

/// Keeps only the last `max_log_lines` lines of `log`, joined with `\n`.
///
/// Both `\n` and `\r\n` separate lines. Empty lines at the end of `log` are not counted, so
/// `"a\nb\nc\n"` holds three lines; empty lines elsewhere are kept.
pub fn cut_log_lines(log: &str, max_log_lines: NonZeroUsize) -> String {
    let mut lines: Vec<&str> = LINE_BREAK.split(log).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    let start = lines.len().saturating_sub(max_log_lines.get());
    lines[start..].join("\n")
}

/// Collects everything an [`OutputFeed`] produces and, if the test fails, emits it as a single
/// error-level record through the sink named after the feed.
#[derive(Debug)]
pub struct LogOnFailure<F, S = TracingSinks> {
    feed: F,
    sinks: S,
    consumer: ToStringConsumer,
    max_log_lines: Option<NonZeroUsize>,
}

impl<F: OutputFeed, S: SinkFactory> LogOnFailure<F, S> {
    /// Starts following `feed`. All of its output is logged on failure.
    pub fn new(feed: F, sinks: S) -> Self {
        Self::follow(feed, sinks, None)
    }

    /// Starts following `feed`. Only the last `max_log_lines` lines of its output are logged on
    /// failure. A limit of zero is rejected before `feed` is followed.
    pub fn with_max_log_lines(feed: F, sinks: S, max_log_lines: usize) -> Result<Self, Error> {
        let max_log_lines =
            NonZeroUsize::new(max_log_lines).ok_or(Error::InvalidMaxLogLines(max_log_lines))?;
        Ok(Self::follow(feed, sinks, Some(max_log_lines)))
    }

    fn follow(feed: F, sinks: S, max_log_lines: Option<NonZeroUsize>) -> Self {
        let consumer = ToStringConsumer::new();
        feed.follow_output(Arc::new(consumer.clone()));
        Self {
            feed,
            sinks,
            consumer,
            max_log_lines,
        }
    }

    /// The name of the followed feed, which is also the name of the sink failures are logged to.
    pub fn name(&self) -> &str {
        self.feed.name()
    }

    pub fn max_log_lines(&self) -> Option<NonZeroUsize> {
        self.max_log_lines
    }

    /// The message that would be logged if the test failed now.
    pub fn log_text(&self) -> String {
        let log = self.consumer.to_utf8_string();
        match self.max_log_lines {
            Some(max_log_lines) => cut_log_lines(&log, max_log_lines),
            None => log,
        }
    }
}

impl<F: OutputFeed> LogOnFailure<F, ConfiguredSinks> {
    /// Starts following `feed`, with the line limit and sinks given by `config`.
    pub fn from_config(feed: F, config: &WatcherConfig) -> Result<Self, Error> {
        let sinks = config.sinks();
        match config.max_log_lines {
            Some(max_log_lines) => Self::with_max_log_lines(feed, sinks, max_log_lines),
            None => Ok(Self::new(feed, sinks)),
        }
    }
}

impl<F: OutputFeed, S: SinkFactory> TestWatcher for LogOnFailure<F, S> {
    fn failed(&self) -> Result<(), Error> {
        let message = self.log_text();
        let name = self.feed.name();
        self.sinks
            .sink(name)
            .emit(Level::ERROR, &message)
            .map_err(|source| Error::Sink {
                name: name.to_owned(),
                source,
            })
    }
}

/// Reports the outcome of the enclosing test to a [`TestWatcher`] when dropped. The test is
/// considered failed if the guard is dropped while the thread is panicking.
///
/// ```
/// use logwatch_core::{
///     output::{FrameConsumer, OutputFeed},
///     sink::TracingSinks,
///     watcher::{watch, LogOnFailure},
/// };
/// use std::sync::Arc;
///
/// struct Quiet;
///
/// impl OutputFeed for Quiet {
///     fn name(&self) -> &str {
///         "quiet"
///     }
///
///     fn follow_output(&self, _: Arc<dyn FrameConsumer>) {}
/// }
///
/// let watcher = LogOnFailure::new(Quiet, TracingSinks::default());
/// let _guard = watch(&watcher);
/// ```
#[must_use = "the outcome is reported when the guard is dropped"]
pub struct WatchGuard<'a, W: TestWatcher + ?Sized> {
    watcher: &'a W,
}

impl<W: TestWatcher + ?Sized> Drop for WatchGuard<'_, W> {
    fn drop(&mut self) {
        if panicking() {
            // A panic is already unwinding, so there is nowhere to propagate this to.
            if let Err(error) = self.watcher.failed() {
                error!(%error, "Couldn't report test failure");
            }
        } else {
            self.watcher.succeeded();
        }
    }
}

/// Returns a guard reporting to `watcher` when the current scope ends.
pub fn watch<W: TestWatcher + ?Sized>(watcher: &W) -> WatchGuard<'_, W> {
    WatchGuard { watcher }
}

/// Reports the outcome of a test that returns a `Result`, then passes the outcome through. If
/// reporting a failure fails, that error is returned instead of the test's error.
pub fn observe<W, T, E>(watcher: &W, outcome: Result<T, E>) -> Result<T, E>
where
    W: TestWatcher + ?Sized,
    E: From<Error>,
{
    match outcome {
        Ok(value) => {
            watcher.succeeded();
            Ok(value)
        }
        Err(error) => {
            watcher.failed()?;
            Err(error)
        }
    }
}
