//! Transport abstraction — any byte-oriented duplex line to a modem.
//!
//! Concrete implementations:
//! - serial TTY (115200 8N1, RTS/CTS) in `adapters::serial`
//! - in-memory loopback ([`MemoryTransport`]) for tests and replay
//!
//! The command channel never owns a transport: callers hand one in when the
//! channel needs to write, so adding a new transport requires zero changes
//! to the protocol logic.

use std::collections::VecDeque;
use std::convert::Infallible;

/// Single byte that aborts a pending command or terminates a PDU body.
pub const CANCEL_BYTE: u8 = 0x1A;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;

    /// Write all of `data`, retrying short writes.
    fn write_all(&mut self, mut data: &[u8]) -> Result<(), Self::Error> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                break;
            }
            data = &data[n..];
        }
        self.flush()
    }

    /// Out-of-band cancel: a lone `0x1A`.
    fn write_cancel(&mut self) -> Result<(), Self::Error> {
        self.write_all(&[CANCEL_BYTE])
    }
}

/// In-memory transport: records every write, serves queued inbound bytes.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    written: Vec<u8>,
    inbound: VecDeque<u8>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the next `read`.
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.extend(data);
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Drain the write log as (lossy) text.
    pub fn take_written(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.written).into_owned();
        self.written.clear();
        out
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Infallible> {
        self.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.inbound.is_empty()
    }
}
