//! Keyboard input for the terminal bridge
//!
//! Two ways to get keystrokes as bytes for the device:
//!
//! - **RawInput**: stdin in raw mode already is the byte stream, read on a
//!   background thread and handed over through a channel
//! - **KeyEventInput**: crossterm key events translated by `KeyMapper`,
//!   for consoles that only deliver events
//!
//! The bridge picks one at startup with [`open`].

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};

use crate::core::codepage::CodePage;
use crate::ui::keymapper::KeyMapper;

pub trait InputSource {
    /// Wait up to `timeout` for the next input. `Ok(None)` if nothing came.
    fn next_input(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// Pick the input source for this platform
pub fn open(key_events: bool, code_page: &CodePage) -> io::Result<Box<dyn InputSource>> {
    #[cfg(unix)]
    if !key_events {
        return Ok(Box::new(raw::RawInput::spawn()?));
    }
    #[cfg(not(unix))]
    let _ = key_events;
    Ok(Box::new(KeyEventInput::new(code_page.clone())))
}

/// Key events decoded to VT sequences
pub struct KeyEventInput {
    code_page: CodePage,
}

impl KeyEventInput {
    pub fn new(code_page: CodePage) -> Self {
        Self { code_page }
    }
}

impl InputSource for KeyEventInput {
    fn next_input(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key_event) if key_event.kind != KeyEventKind::Release => {
                Ok(KeyMapper::map(&key_event, &self.code_page))
            }
            Event::Paste(text) => Ok(self.code_page.encode(&text)),
            _ => Ok(None),
        }
    }
}

#[cfg(unix)]
mod raw {
    use std::io::{self, Read};
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    use tracing::debug;

    use super::InputSource;

    /// Raw stdin bytes from a reader thread
    pub struct RawInput {
        rx: Receiver<io::Result<Vec<u8>>>,
    }

    impl RawInput {
        pub fn spawn() -> io::Result<Self> {
            let (tx, rx) = mpsc::channel();
            thread::Builder::new()
                .name("stdin".to_string())
                .spawn(move || {
                    let mut stdin = io::stdin();
                    let mut buffer = [0u8; 256];
                    loop {
                        let result = match stdin.read(&mut buffer) {
                            Ok(0) => break,
                            Ok(n) => Ok(buffer[..n].to_vec()),
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => Err(e),
                        };
                        let failed = result.is_err();
                        // Receiver gone means the session ended
                        if tx.send(result).is_err() || failed {
                            break;
                        }
                    }
                    debug!("stdin reader finished");
                })?;
            Ok(Self { rx })
        }
    }

    impl InputSource for RawInput {
        fn next_input(&mut self, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
            match self.rx.recv_timeout(timeout) {
                Ok(Ok(bytes)) => Ok(Some(bytes)),
                Ok(Err(e)) => Err(e),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stdin closed",
                )),
            }
        }
    }
}
