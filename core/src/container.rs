//! Follows the output of containers started with [`testcontainers`].

use crate::{
    output::{FrameConsumer, OutputFeed, OutputFrame, OutputType},
    watcher::Error,
};
use std::{mem, pin::Pin, sync::Arc};
use testcontainers::{ContainerAsync, Image};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    runtime::Handle,
};
use tracing::{debug, warn};

/// An [`OutputFeed`] backed by a running container. Each follower gets its own pair of log
/// streams, read on the runtime that was current when the feed was created.
pub struct ContainerFeed<I: Image> {
    container: ContainerAsync<I>,
    name: String,
    runtime: Handle,
}

impl<I: Image> ContainerFeed<I> {
    /// Wraps `container`, naming the feed after the container's ID. Must be called from within a
    /// tokio runtime.
    pub fn new(container: ContainerAsync<I>) -> Result<Self, Error> {
        let runtime = Handle::try_current().map_err(|_| Error::Runtime)?;
        let name = container.id().to_owned();
        Ok(Self {
            container,
            name,
            runtime,
        })
    }

    /// Overrides the name used for the feed, and so for the sink failures are logged to.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<I: Image> OutputFeed for ContainerFeed<I> {
    fn name(&self) -> &str {
        &self.name
    }

    fn follow_output(&self, consumer: Arc<dyn FrameConsumer>) {
        // Both streams start from the beginning of the container's output, so nothing written
        // before this call is missed.
        let streams = [
            (OutputType::Stdout, self.container.stdout(true)),
            (OutputType::Stderr, self.container.stderr(true)),
        ];
        for (output_type, stream) in streams {
            self.runtime.spawn(forward_output(
                stream,
                output_type,
                Arc::clone(&consumer),
                self.name.clone(),
            ));
        }
    }
}

/// Forwards `stream` to `consumer` one line at a time, so no frame ends partway through a UTF-8
/// sequence.
async fn forward_output(
    mut stream: Pin<Box<dyn AsyncBufRead + Send>>,
    output_type: OutputType,
    consumer: Arc<dyn FrameConsumer>,
    name: String,
) {
    let mut line = Vec::new();
    loop {
        match stream.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => consumer.accept(OutputFrame::new(output_type, mem::take(&mut line))),
            Err(error) => {
                warn!(%error, container = %name, ?output_type, "Couldn't read container output");
                break;
            }
        }
    }
    debug!(container = %name, ?output_type, "Container output ended");
    consumer.accept(OutputFrame::end());
}

#[cfg(test)]
mod tests {
    use super::{forward_output, ContainerFeed};
    use crate::{
        output::{OutputType, ToStringConsumer},
        test_util::{install_test_trace_subscriber, CapturingSinks},
        watcher::{LogOnFailure, TestWatcher},
    };
    use std::{sync::Arc, time::Duration};
    use testcontainers::{core::WaitFor, runners::AsyncRunner, GenericImage, ImageExt};
    use tokio::{
        io::{AsyncReadExt, BufReader},
        time::{sleep, Instant},
    };

    #[tokio::test]
    async fn character_split_across_reads_is_kept_whole() {
        let accumulator = ToStringConsumer::new();
        // The chain yields the two bytes of "é" from separate reads.
        let stream = BufReader::new((&b"caf\xc3"[..]).chain(&b"\xa9\nlast line"[..]));

        forward_output(
            Box::pin(stream),
            OutputType::Stdout,
            Arc::new(accumulator.clone()),
            "web".to_owned(),
        )
        .await;

        assert_eq!(accumulator.to_utf8_string(), "caf\u{e9}\nlast line");
    }

    #[tokio::test]
    #[ignore = "requires a Docker daemon"]
    async fn logs_container_output_on_failure() {
        install_test_trace_subscriber();

        let container = GenericImage::new("alpine", "3.20")
            .with_wait_for(WaitFor::message_on_stdout("three"))
            .with_cmd(["sh", "-c", "echo one; echo two >&2; echo three; sleep 60"])
            .start()
            .await
            .unwrap();
        let feed = ContainerFeed::new(container).unwrap().with_name("alpine");
        let sinks = CapturingSinks::default();
        let watcher = LogOnFailure::new(feed, sinks.clone());

        let deadline = Instant::now() + Duration::from_secs(30);
        while watcher.log_text().lines().count() < 3 && Instant::now() < deadline {
            sleep(Duration::from_millis(100)).await;
        }
        watcher.failed().unwrap();

        let records = sinks.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "alpine");
        let mut lines: Vec<&str> = records[0].message.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, ["one", "three", "two"]);
    }
}
