//! Output frames produced by a container, and consumers that collect them.

use bytes::Bytes;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex},
};

/// The stream an [`OutputFrame`] originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputType {
    Stdout,
    Stderr,
    /// Marks the end of a stream. Frames of this type carry no payload.
    End,
}

/// A discrete chunk of output delivered by an [`OutputFeed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFrame {
    output_type: OutputType,
    bytes: Option<Bytes>,
}

impl OutputFrame {
    /// Construct a frame carrying `bytes` from the given stream. An [`OutputType::End`] frame
    /// discards the payload.
    pub fn new(output_type: OutputType, bytes: impl Into<Bytes>) -> Self {
        let bytes = match output_type {
            OutputType::End => None,
            OutputType::Stdout | OutputType::Stderr => Some(bytes.into()),
        };
        Self { output_type, bytes }
    }

    /// Construct a frame marking the end of output.
    pub fn end() -> Self {
        Self {
            output_type: OutputType::End,
            bytes: None,
        }
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// The raw payload, or `None` for an end-of-stream frame.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.bytes.as_ref()
    }

    /// Decodes the payload as UTF-8. Invalid sequences are replaced with U+FFFD rather than
    /// rejected.
    pub fn utf8_string(&self) -> String {
        self.bytes
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Something that receives frames from an [`OutputFeed`]. Feeds may deliver frames from any
/// thread or task.
pub trait FrameConsumer: Send + Sync {
    fn accept(&self, frame: OutputFrame);
}

/// A source of output, such as a running container.
pub trait OutputFeed {
    /// The display name of the entity producing output.
    fn name(&self) -> &str;

    /// Registers `consumer` to receive every frame produced from now on. Registration must be
    /// complete by the time this method returns.
    fn follow_output(&self, consumer: Arc<dyn FrameConsumer>);
}

impl<T: OutputFeed + ?Sized> OutputFeed for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn follow_output(&self, consumer: Arc<dyn FrameConsumer>) {
        (**self).follow_output(consumer)
    }
}

impl<T: OutputFeed + ?Sized> OutputFeed for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn follow_output(&self, consumer: Arc<dyn FrameConsumer>) {
        (**self).follow_output(consumer)
    }
}

/// Accumulates the text of every frame it receives. Clones share the same buffer, so one clone
/// can be handed to a feed while another is used to read the text back.
#[derive(Clone, Default)]
pub struct ToStringConsumer {
    buffer: Arc<Mutex<String>>,
}

impl ToStringConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all text received so far, in arrival order. The buffer is left untouched.
    pub fn to_utf8_string(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }
}

impl FrameConsumer for ToStringConsumer {
    fn accept(&self, frame: OutputFrame) {
        // Decode outside the lock; each chunk is decoded on its own so earlier renderings remain
        // a prefix of later ones.
        let text = frame.utf8_string();
        if !text.is_empty() {
            self.buffer.lock().unwrap().push_str(&text);
        }
    }
}

impl Debug for ToStringConsumer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToStringConsumer")
            .field("len", &self.buffer.lock().unwrap().len())
            .finish()
    }
}
