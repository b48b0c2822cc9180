//! Test doubles for output feeds and log sinks, and tracing setup for tests.

use crate::{
    output::{FrameConsumer, OutputFeed, OutputFrame, OutputType},
    sink::{LogSink, SinkError, SinkFactory},
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex, Once},
};
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// An [`OutputFeed`] whose output is scripted by the test. Frames are delivered synchronously to
/// every consumer following it.
pub struct MockContainer {
    name: String,
    consumers: Mutex<Vec<Arc<dyn FrameConsumer>>>,
}

impl MockContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Delivers `frame` to every consumer.
    pub fn emit(&self, frame: OutputFrame) {
        let consumers = self.consumers.lock().unwrap().clone();
        for consumer in consumers {
            consumer.accept(frame.clone());
        }
    }

    /// Delivers `text` as a standard output frame.
    pub fn emit_stdout(&self, text: &str) {
        self.emit(OutputFrame::new(
            OutputType::Stdout,
            text.as_bytes().to_vec(),
        ))
    }

    /// The number of consumers following this container.
    pub fn subscriber_count(&self) -> usize {
        self.consumers.lock().unwrap().len()
    }
}

impl OutputFeed for MockContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn follow_output(&self, consumer: Arc<dyn FrameConsumer>) {
        self.consumers.lock().unwrap().push(consumer);
    }
}

impl Debug for MockContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockContainer")
            .field("name", &self.name)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A record captured by [`CapturingSinks`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedRecord {
    pub name: String,
    pub level: Level,
    pub message: String,
}

/// A [`SinkFactory`] that records everything emitted through its sinks. Clones share the same
/// records.
#[derive(Clone, Debug, Default)]
pub struct CapturingSinks {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
    failing: bool,
}

impl CapturingSinks {
    /// Returns sinks that reject every record with [`SinkError::Closed`].
    pub fn failing() -> Self {
        Self {
            records: Arc::default(),
            failing: true,
        }
    }

    /// All records emitted so far, in order.
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl SinkFactory for CapturingSinks {
    type Sink = CapturingSink;

    fn sink(&self, name: &str) -> CapturingSink {
        CapturingSink {
            name: name.to_owned(),
            records: Arc::clone(&self.records),
            failing: self.failing,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturingSink {
    name: String,
    records: Arc<Mutex<Vec<CapturedRecord>>>,
    failing: bool,
}

impl LogSink for CapturingSink {
    fn emit(&self, level: Level, message: &str) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Closed);
        }
        self.records.lock().unwrap().push(CapturedRecord {
            name: self.name.clone(),
            level,
            message: message.to_owned(),
        });
        Ok(())
    }
}

/// Install a tracing subscriber for use in tests. This should be called at the beginning of any
/// test that requires a tracing subscriber.
pub fn install_test_trace_subscriber() {
    static INSTALL_TRACE_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACE_SUBSCRIBER.call_once(|| {
        let stdout_filter = EnvFilter::builder().from_env().unwrap();
        let layer = tracing_subscriber::fmt::layer()
            .with_thread_ids(true)
            .with_level(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .with_test_writer()
            .with_filter(stdout_filter);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber).unwrap();

        LogTracer::init().unwrap();
    })
}
