//! Line-buffered framing and the blocking send-and-await protocol.

use super::{Channel, DynChannel};
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, trace, Span};

/// Upper bound on a single physical read.
pub const MAX_READ_CHUNK: usize = 2048;

/// Sleep between polls while waiting for a reply.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// How long [`LineTransport::send`] waits for a reply.
///
/// Has no `Default`; every connection states its own wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyWait {
    /// Block until a reply arrives, however long that takes.
    Forever,
    /// Give up with [`DaqError::ReplyTimeout`] after this many milliseconds.
    BoundedMs(u64),
}

impl ReplyWait {
    /// The wait limit, or `None` for [`ReplyWait::Forever`].
    pub fn limit(self) -> Option<Duration> {
        match self {
            ReplyWait::Forever => None,
            ReplyWait::BoundedMs(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

/// Bytes received but not yet resolved into a complete frame.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    bytes: Vec<u8>,
    delimiter: u8,
}

impl LineBuffer {
    /// Empty buffer splitting frames on `delimiter`.
    pub fn new(delimiter: u8) -> Self {
        Self {
            bytes: Vec::new(),
            delimiter,
        }
    }

    /// Frame delimiter byte.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Append a received chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Whether a complete frame is waiting.
    pub fn has_frame(&self) -> bool {
        self.bytes.contains(&self.delimiter)
    }

    /// Take the prefix up to and including the first delimiter, keeping the remainder.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.bytes.iter().position(|&b| b == self.delimiter)?;
        let rest = self.bytes.split_off(end + 1);
        Some(std::mem::replace(&mut self.bytes, rest))
    }

    /// Retained bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of retained bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Frame-oriented transport over a [`Channel`].
///
/// Owns its channel exclusively. The channel is closed by [`LineTransport::close`] or, if
/// that was never called, when the transport is dropped.
///
/// # Example
///
/// ```
/// use tweezers_daq::transport::{LineTransport, MockChannel, ReplyWait};
///
/// let channel = MockChannel::new();
/// channel.push_chunk(b"A001 1 2\n");
///
/// let mut transport = LineTransport::new(channel.clone(), ReplyWait::BoundedMs(100));
/// let reply = transport.send("C001", true)?;
/// assert_eq!(reply.as_deref(), Some("A001 1 2"));
/// assert_eq!(channel.written_text(), vec!["C001\n"]);
/// # Ok::<(), tweezers_daq::DaqError>(())
/// ```
pub struct LineTransport<C: Channel = DynChannel> {
    channel: C,
    buffer: LineBuffer,
    command_terminator: u8,
    reply_wait: ReplyWait,
    poll_interval: Duration,
    span: Span,
    closed: bool,
}

impl<C: Channel> LineTransport<C> {
    /// Create a transport with `\n` as both command terminator and reply delimiter.
    pub fn new(channel: C, reply_wait: ReplyWait) -> Self {
        let span = debug_span!("line_transport", port = %channel.describe());
        Self {
            channel,
            buffer: LineBuffer::new(b'\n'),
            command_terminator: b'\n',
            reply_wait,
            poll_interval: DEFAULT_POLL_INTERVAL,
            span,
            closed: false,
        }
    }

    /// Set the byte appended to every outgoing command.
    pub fn with_command_terminator(mut self, terminator: u8) -> Self {
        self.command_terminator = terminator;
        self
    }

    /// Set the byte that ends every incoming frame.
    pub fn with_reply_delimiter(mut self, delimiter: u8) -> Self {
        self.buffer = LineBuffer::new(delimiter);
        self
    }

    /// Set the sleep between polls while awaiting a reply.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Record all transport events under `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Configured reply wait.
    pub fn reply_wait(&self) -> ReplyWait {
        self.reply_wait
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Whether the underlying channel is open.
    pub fn is_open(&self) -> bool {
        !self.closed && self.channel.is_open()
    }

    /// Read one complete frame, including its delimiter.
    ///
    /// Returns `Ok(None)` when the channel delivers nothing before its read timeout and no
    /// complete frame has been assembled yet. Partial data stays buffered for the next call.
    pub fn read_line(&mut self) -> AppResult<Option<Vec<u8>>> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.read_frame()
    }

    fn read_frame(&mut self) -> AppResult<Option<Vec<u8>>> {
        if let Some(frame) = self.buffer.take_frame() {
            return Ok(Some(frame));
        }
        loop {
            let hint = self.channel.bytes_available()?;
            let chunk = self.channel.read(hint.clamp(1, MAX_READ_CHUNK))?;
            if chunk.is_empty() {
                trace!(retained = self.buffer.len(), "no complete line available");
                return Ok(None);
            }
            self.buffer.extend(&chunk);
            if let Some(frame) = self.buffer.take_frame() {
                return Ok(Some(frame));
            }
        }
    }

    /// Send `text` followed by the command terminator.
    ///
    /// With `wait_for_reply`, blocks until a complete reply frame arrives (or the bounded
    /// wait expires) and returns it decoded and trimmed.
    ///
    /// # Errors
    ///
    /// - [`DaqError::Io`] if the channel fails.
    /// - [`DaqError::Decode`] if the reply is not UTF-8.
    /// - [`DaqError::ReplyTimeout`] if a bounded wait expires.
    pub fn send(&mut self, text: &str, wait_for_reply: bool) -> AppResult<Option<String>> {
        let span = self.span.clone();
        let _enter = span.enter();

        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(self.command_terminator);

        debug!(command = text, "sending frame");
        self.channel.write_all(&frame)?;

        if !wait_for_reply {
            return Ok(None);
        }

        let raw = self.await_frame(text)?;
        let reply = match std::str::from_utf8(&raw) {
            Ok(s) => s.trim().to_string(),
            Err(_) => return Err(DaqError::Decode { raw }),
        };
        debug!(reply = %reply, "received frame");
        Ok(Some(reply))
    }

    fn await_frame(&mut self, command: &str) -> AppResult<Vec<u8>> {
        let started = Instant::now();
        loop {
            if self.buffer.has_frame() || self.channel.bytes_available()? > 0 {
                if let Some(frame) = self.read_frame()? {
                    return Ok(frame);
                }
            }
            if let Some(limit) = self.reply_wait.limit() {
                if started.elapsed() >= limit {
                    return Err(DaqError::ReplyTimeout {
                        command: command.to_string(),
                        waited: limit,
                    });
                }
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Read and discard up to `max_lines` stale frames, returning how many were dropped.
    pub fn drain(&mut self, max_lines: usize) -> AppResult<usize> {
        let span = self.span.clone();
        let _enter = span.enter();

        let mut discarded = 0;
        while discarded < max_lines {
            match self.read_frame()? {
                Some(frame) => {
                    debug!(frame = %String::from_utf8_lossy(&frame).trim_end(), "discarded stale frame");
                    discarded += 1;
                }
                None => break,
            }
        }
        if discarded == max_lines {
            tracing::warn!(max_lines, "drain limit reached; more data may be buffered");
        }
        Ok(discarded)
    }

    /// Close the channel. Consumes the transport, so it can only happen once.
    pub fn close(mut self) -> AppResult<()> {
        self.closed = true;
        let _enter = self.span.enter();
        self.channel.close()?;
        info!("channel closed");
        Ok(())
    }
}

impl<C: Channel> Drop for LineTransport<C> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.channel.close() {
            debug!(error = %e, "closing channel on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::transport::MockChannel;
    use tracing_test::traced_test;

    fn transport(channel: &MockChannel) -> LineTransport<MockChannel> {
        LineTransport::new(channel.clone(), ReplyWait::BoundedMs(50))
            .with_poll_interval(Duration::from_micros(50))
    }

    #[test]
    fn buffer_splits_at_first_delimiter() {
        let mut buf = LineBuffer::new(b'\n');
        buf.extend(b"one\ntwo\nthr");
        assert_eq!(buf.take_frame().as_deref(), Some(&b"one\n"[..]));
        assert_eq!(buf.take_frame().as_deref(), Some(&b"two\n"[..]));
        assert_eq!(buf.take_frame(), None);
        assert_eq!(buf.as_bytes(), b"thr");
    }

    #[test]
    fn reassembles_frame_across_reads() {
        let channel = MockChannel::new();
        channel.push_chunk(b"AB");
        channel.push_chunk(b"CD\n");
        channel.push_chunk(b"EF");
        let mut t = transport(&channel);

        assert_eq!(t.read_line().unwrap().as_deref(), Some(&b"ABCD\n"[..]));
        assert_eq!(t.read_line().unwrap(), None);
        assert_eq!(t.buffered(), b"EF");

        channel.push_chunk(b"G\n");
        assert_eq!(t.read_line().unwrap().as_deref(), Some(&b"EFG\n"[..]));
        assert!(t.buffered().is_empty());
    }

    #[test]
    fn merged_frames_are_returned_one_at_a_time() {
        let channel = MockChannel::new();
        channel.push_chunk(b"A001\nA003\nA0");
        let mut t = transport(&channel);

        assert_eq!(t.read_line().unwrap().as_deref(), Some(&b"A001\n"[..]));
        assert_eq!(t.read_line().unwrap().as_deref(), Some(&b"A003\n"[..]));
        assert_eq!(t.read_line().unwrap(), None);
        assert_eq!(t.buffered(), b"A0");
    }

    #[test]
    fn reads_never_exceed_chunk_limit() {
        let channel = MockChannel::new();
        let big = vec![b'x'; MAX_READ_CHUNK + 10];
        channel.push_chunk(&big);
        channel.push_chunk(b"\n");
        let mut t = transport(&channel);

        let frame = t.read_line().unwrap().unwrap();
        assert_eq!(frame.len(), MAX_READ_CHUNK + 11);
        assert!(channel.read_sizes().iter().all(|&n| n <= MAX_READ_CHUNK));
    }

    #[test]
    fn send_appends_terminator_and_trims_reply() {
        let channel = MockChannel::new();
        channel.push_chunk(b"A010 595 0 778 0\r\n");
        let mut t = transport(&channel);

        let reply = t.send("C010", true).unwrap();
        assert_eq!(reply.as_deref(), Some("A010 595 0 778 0"));
        assert_eq!(channel.written(), vec![b"C010\n".to_vec()]);
    }

    #[test]
    fn send_without_reply_returns_immediately() {
        let channel = MockChannel::new();
        let mut t = transport(&channel).with_command_terminator(b'\r');

        assert_eq!(t.send("!VO 1 2", false).unwrap(), None);
        assert_eq!(channel.written_text(), vec!["!VO 1 2\r"]);
    }

    #[test]
    fn bounded_wait_times_out() {
        let channel = MockChannel::new();
        let mut t = transport(&channel);

        let err = t.send("C001", true).unwrap_err();
        assert!(matches!(err, DaqError::ReplyTimeout { .. }));
        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[test]
    fn non_utf8_reply_is_a_protocol_error() {
        let channel = MockChannel::new();
        channel.push_chunk(&[0xff, 0xfe, b'\n']);
        let mut t = transport(&channel);

        let err = t.send("C001", true).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn write_failure_propagates() {
        let channel = MockChannel::new();
        channel.trigger_write_failure();
        let mut t = transport(&channel);

        let err = t.send("C001", true).unwrap_err();
        assert!(matches!(err, DaqError::Io(_)));
    }

    #[test]
    fn custom_reply_delimiter() {
        let channel = MockChannel::new();
        channel.push_chunk(b"?SS 12\r?SS");
        let mut t = transport(&channel).with_reply_delimiter(b'\r');

        assert_eq!(t.send("?SS 1", true).unwrap().as_deref(), Some("?SS 12"));
        assert_eq!(t.buffered(), b"?SS");
    }

    #[test]
    fn drain_discards_stale_frames() {
        let channel = MockChannel::new();
        channel.push_chunk(b"old 1\nold 2\npartial");
        let mut t = transport(&channel);

        assert_eq!(t.drain(100).unwrap(), 2);
        assert_eq!(t.buffered(), b"partial");
    }

    #[test]
    fn close_releases_channel_once() {
        let channel = MockChannel::new();
        let t = transport(&channel);
        assert!(t.is_open());

        t.close().unwrap();
        assert!(channel.is_closed());
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn drop_closes_channel() {
        let channel = MockChannel::new();
        {
            let _t = transport(&channel);
        }
        assert!(channel.is_closed());
        assert_eq!(channel.close_calls(), 1);
    }

    #[test]
    fn io_after_out_of_band_close_fails() {
        let channel = MockChannel::new();
        let mut t = transport(&channel);
        channel.close_out_of_band();

        assert!(matches!(t.send("C008", true), Err(DaqError::Io(_))));
    }

    #[test]
    #[traced_test]
    fn frames_are_logged() {
        let channel = MockChannel::new();
        channel.push_chunk(b"A001 3\n");
        let mut t = transport(&channel);
        t.send("C001", true).unwrap();

        assert!(logs_contain("sending frame"));
        assert!(logs_contain("received frame"));
    }
}
