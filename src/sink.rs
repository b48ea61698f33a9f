//! Callback sinks for session events
//!
//! The transport's event-loop task calls a [`MessageSink`] whenever a message
//! arrives, an outgoing QoS 1/2 publish completes, or the connection drops.
//! Sinks are shared with that task, so implementations must be `Send + Sync`
//! and must not interleave partial lines.

use bytes::Bytes;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiver of asynchronous session events
pub trait MessageSink: Send + Sync {
    /// A message arrived on the subscribed topic
    fn message_arrived(&self, message_id: u16, topic: &str, payload: &[u8]);

    /// An outgoing QoS 1 or 2 publish was acknowledged by the broker
    fn delivery_complete(&self, message_id: u16);

    /// The connection dropped; no further events follow
    fn connection_lost(&self, cause: &str);
}

/// Render an incoming message as a single output line
pub fn format_incoming(message_id: u16, topic: &str, payload: &[u8]) -> String {
    format!(
        "--- Incoming message [{message_id}] for topic [{topic}] : [{}]",
        String::from_utf8_lossy(payload)
    )
}

/// Where a [`PrintSink`] writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Console,
    File(PathBuf),
}

impl Output {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(Output::Console, Output::File)
    }

    /// Open the destination; files are opened in append mode and created if missing
    pub fn open_sink(&self) -> io::Result<PrintSink> {
        match self {
            Output::Console => Ok(PrintSink::console()),
            Output::File(path) => PrintSink::append_to(path),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Console => f.write_str("console"),
            Output::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Writes one flushed line per event to stdout, a file, or any writer
pub struct PrintSink {
    out: Mutex<Option<Box<dyn Write + Send>>>,
}

impl PrintSink {
    pub fn console() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// Whether a connection loss has already closed this sink
    pub fn is_closed(&self) -> bool {
        self.out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    fn emit(&self, line: &str, close: bool) {
        let mut guard = self
            .out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(out) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("Failed to write to message sink: {}", e);
        }
        if close {
            *guard = None;
        }
    }
}

impl MessageSink for PrintSink {
    fn message_arrived(&self, message_id: u16, topic: &str, payload: &[u8]) {
        self.emit(&format_incoming(message_id, topic, payload), false);
    }

    fn delivery_complete(&self, _message_id: u16) {
        self.emit("Delivery complete", false);
    }

    fn connection_lost(&self, cause: &str) {
        self.emit(&format!("Connection Lost: {cause}"), true);
    }
}

/// Event forwarded by a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    MessageArrived {
        message_id: u16,
        topic: String,
        payload: Bytes,
    },
    DeliveryComplete(u16),
    ConnectionLost(String),
}

/// Forwards events into a channel instead of writing them
///
/// The sender is dropped after `connection_lost`, so the receiving side sees
/// the channel close once the last event is drained.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<SinkEvent>>>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn forward(&self, event: SinkEvent, close: bool) {
        let mut guard = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = guard.as_ref() {
            // A dropped receiver just means nobody is listening any more
            let _ = tx.send(event);
        }
        if close {
            *guard = None;
        }
    }
}

impl MessageSink for ChannelSink {
    fn message_arrived(&self, message_id: u16, topic: &str, payload: &[u8]) {
        self.forward(
            SinkEvent::MessageArrived {
                message_id,
                topic: topic.to_string(),
                payload: Bytes::copy_from_slice(payload),
            },
            false,
        );
    }

    fn delivery_complete(&self, message_id: u16) {
        self.forward(SinkEvent::DeliveryComplete(message_id), false);
    }

    fn connection_lost(&self, cause: &str) {
        self.forward(SinkEvent::ConnectionLost(cause.to_string()), true);
    }
}
