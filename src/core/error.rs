//! Error taxonomy shared by the image, transport and monitor layers.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Address or length outside the 128K space, or crossing the bank boundary.
    #[error("Invalid address ${addr:04X} or length ${len:03X}")]
    Range { addr: usize, len: usize },

    #[error("ROM data already exists at ${addr:04X}")]
    Overlap { addr: usize },

    #[error("{0}")]
    Format(String),

    #[error("Invalid CRC in block address ${addr:04X}")]
    Checksum { addr: usize },

    #[error("Timed out waiting for device")]
    Timeout,

    /// The device reported its own error. `line` is set for BASIC uploads.
    #[error("{}", device_message(.message, .line))]
    Device { message: String, line: Option<usize> },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn device_message(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("line {}: {}", line, message),
        None => message.to_string(),
    }
}

impl Error {
    pub fn device(message: impl Into<String>) -> Self {
        Error::Device {
            message: message.into(),
            line: None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
