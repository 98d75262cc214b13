//! Newline-delimited JSON transport.
//!
//! The sidecar reads [`Command`] lines from one byte stream and writes
//! [`Event`] lines to another. Nothing here knows what the envelopes mean;
//! a bad line becomes a [`ProtocolError`] for the caller to report, and the
//! reader keeps going.

use crate::error::ProtocolError;
use crate::protocol::{decode_command, encode_event, Command, Event};
use crate::textutil::log_preview;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One inbound line after decoding.
pub type Inbound = Result<Command, ProtocolError>;

/// Event stream receiver drained by the writer task.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

/// Lazily decodes command lines from an async reader.
pub struct CommandReader<R> {
    reader: R,
    buf: Vec<u8>,
    lines_read: u64,
}

impl<R: AsyncBufRead + Unpin> CommandReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            lines_read: 0,
        }
    }

    /// Next non-blank line, decoded. `Ok(None)` means the input closed.
    ///
    /// Invalid UTF-8 is decoded lossily so it surfaces as malformed JSON
    /// rather than as an I/O failure that would end the stream.
    pub async fn next(&mut self) -> io::Result<Option<Inbound>> {
        loop {
            self.buf.clear();
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 {
                return Ok(None);
            }
            self.lines_read += 1;
            let line = String::from_utf8_lossy(&self.buf);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let inbound = decode_command(trimmed);
            if let Err(err) = &inbound {
                tracing::debug!(
                    line = self.lines_read,
                    raw = %log_preview(trimmed, 120),
                    error = %err,
                    "rejected command line"
                );
            }
            return Ok(Some(inbound));
        }
    }

    /// Count of raw lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

/// Writes one event per line and flushes after each record.
pub struct EventWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> EventWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn emit(&mut self, event: &Event) -> io::Result<()> {
        let mut line = encode_event(event).map_err(io::Error::other)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Drain `events` into `writer` on a background task until every sender is
/// dropped. Order on the wire is the order events were sent.
pub fn spawn_event_writer<W>(writer: W, mut events: EventStream) -> JoinHandle<io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = EventWriter::new(writer);
        while let Some(event) = events.recv().await {
            tracing::trace!(kind = event.kind(), "emit");
            writer.emit(&event).await?;
        }
        Ok(())
    })
}

/// Cloneable emitter shared by the orchestrator, turn tasks and the broker.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one event. Returns false once the stream consumer is gone.
    pub fn emit(&self, event: Event) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(kind = err.0.kind(), "event stream closed; dropping event");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
