//! Byte transport to the RP6502 console
//!
//! The monitor protocol only needs a writable byte stream, a read that gives
//! up after a timeout, and a way to signal break. `SerialTransport` provides
//! these over a USB CDC serial port.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{info, warn};

use super::error::Result;

/// Console baud rate of the RP6502 RIA
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rate used to fake a break on ports that can't send one
const SLOW_BAUD_RATE: u32 = 1_200;

pub trait Transport: Write {
    /// Read whatever arrives within `timeout`. `Ok(0)` means nothing did.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Bytes that can be read without waiting
    fn bytes_available(&mut self) -> Result<usize>;

    /// Drop any buffered input
    fn clear_input(&mut self) -> Result<()>;

    /// Hold the line in break for `duration`
    fn send_break(&mut self, duration: Duration) -> Result<()>;
}

/// A serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let timeout = Duration::from_millis(500);
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened {} at {} baud", path, baud_rate);
        Ok(Self { port, timeout })
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }

    /// Break via a NUL byte sent slowly enough to look like one
    fn slow_null_break(&mut self, duration: Duration) -> Result<()> {
        let baud_rate = self.port.baud_rate()?;
        self.port.set_baud_rate(SLOW_BAUD_RATE)?;
        let sent = self
            .port
            .write_all(&[0])
            .and_then(|_| self.port.flush());
        thread::sleep(duration);
        self.port.set_baud_rate(baud_rate)?;
        sent?;
        Ok(())
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn send_break(&mut self, duration: Duration) -> Result<()> {
        if let Err(e) = self.port.set_break() {
            warn!("Break not supported ({}), sending slow NUL", e);
            return self.slow_null_break(duration);
        }
        thread::sleep(duration);
        self.port.clear_break()?;
        Ok(())
    }
}
