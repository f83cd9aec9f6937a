//! Serial TTY transport (115200 8N1, RTS/CTS by default).

use std::io::{Read, Write};
use std::time::Duration;

use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::at::transport::Transport;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` with 8N1 framing.
    pub fn open(path: &str, baud_rate: u32, rts_cts: bool) -> Result<Self, serialport::Error> {
        let flow = if rts_cts { FlowControl::Hardware } else { FlowControl::None };
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(flow)
            .timeout(Duration::from_millis(10))
            .open()?;
        info!("serial: opened {} at {} baud (rts/cts {})", path, baud_rate, rts_cts);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    type Error = std::io::Error;

    /// Never blocks: reads only what is already buffered.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let ready = self.port.bytes_to_read()? as usize;
        if ready == 0 {
            return Ok(0);
        }
        let n = ready.min(buf.len());
        match self.port.read(&mut buf[..n]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.port.write(data)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.port.flush()
    }

    fn available(&self) -> bool {
        self.port.bytes_to_read().is_ok_and(|n| n > 0)
    }
}
