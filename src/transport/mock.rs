//! Scripted channel for testing the transport and device layers without hardware.
//!
//! Clones share state, so a test keeps one handle to script reads and inspect writes while
//! the transport owns the other.

use super::{not_connected, Channel};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    chunks: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    read_sizes: Vec<usize>,
    fail_next_write: bool,
    closed: bool,
    close_calls: usize,
}

/// In-memory channel that replays queued chunks and records every write.
///
/// Each queued chunk is delivered by exactly one read (split if the read asks for fewer
/// bytes), so tests control how replies are fragmented on the wire.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    /// Empty, open channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be returned by a future read.
    pub fn push_chunk(&self, chunk: &[u8]) {
        self.state.lock().chunks.push_back(chunk.to_vec());
    }

    /// Every write so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Every write so far, decoded lossily.
    pub fn written_text(&self) -> Vec<String> {
        self.state
            .lock()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// The `max` argument of every non-empty read.
    pub fn read_sizes(&self) -> Vec<usize> {
        self.state.lock().read_sizes.clone()
    }

    /// Make the next write fail with `BrokenPipe`.
    pub fn trigger_write_failure(&self) {
        self.state.lock().fail_next_write = true;
    }

    /// Mark the channel closed without going through [`Channel::close`].
    pub fn close_out_of_band(&self) {
        self.state.lock().closed = true;
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of [`Channel::close`] calls.
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

impl Channel for MockChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(not_connected("mock channel"));
        }
        if std::mem::take(&mut state.fail_next_write) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }
        state.written.push(data.to_vec());
        Ok(())
    }

    fn read(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(not_connected("mock channel"));
        }
        let Some(mut chunk) = state.chunks.pop_front() else {
            return Ok(Vec::new());
        };
        if chunk.len() > max {
            let rest = chunk.split_off(max);
            state.chunks.push_front(rest);
        }
        state.read_sizes.push(max);
        Ok(chunk)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.state.lock();
        if state.closed {
            return Err(not_connected("mock channel"));
        }
        Ok(state.chunks.front().map_or(0, Vec::len))
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().closed
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
