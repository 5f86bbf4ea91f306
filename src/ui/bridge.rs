//! Interactive terminal bridge
//!
//! Passes keystrokes to the device and device output to the screen. Ctrl+A
//! starts a local command:
//!
//! | Key | Action |
//! |-----|--------|
//! | b / f | Send break, back to the monitor |
//! | x / q | Leave the terminal |
//! | Ctrl+A | Send a literal Ctrl+A |

use std::io::{self, Write};
use std::time::Duration;

use crossterm::terminal;
use tracing::{error, info};

use crate::core::codepage::CodePage;
use crate::core::error::Result;
use crate::core::monitor::Monitor;
use crate::core::transport::Transport;
use crate::ui::input::InputSource;

/// Escape prefix (Ctrl+A)
pub const ESCAPE_PREFIX: u8 = 0x01;

/// How long to wait for a key when the device is quiet
const IDLE_POLL: Duration = Duration::from_millis(2);

/// Result of feeding one key byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Bytes for the device
    Send(Vec<u8>),
    /// Break to the monitor
    Break,
    /// End the session
    Exit,
    /// Swallowed (prefix held)
    None,
}

/// Escape-prefix state machine
#[derive(Debug, Default)]
pub struct EscapeState {
    armed: bool,
}

impl EscapeState {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn feed(&mut self, byte: u8) -> Action {
        if !self.armed {
            if byte == ESCAPE_PREFIX {
                self.armed = true;
                return Action::None;
            }
            return Action::Send(vec![byte]);
        }

        match byte {
            // Resolves the held prefix as literal, and arms again
            ESCAPE_PREFIX => Action::Send(vec![ESCAPE_PREFIX]),
            b'b' | b'B' | b'f' | b'F' => {
                self.armed = false;
                Action::Break
            }
            b'x' | b'X' | b'q' | b'Q' => {
                self.armed = false;
                Action::Exit
            }
            other => {
                self.armed = false;
                Action::Send(vec![ESCAPE_PREFIX, other])
            }
        }
    }
}

/// Puts the local terminal in raw mode until dropped
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            error!("Failed to restore terminal: {}", e);
        }
    }
}

/// Full-duplex bridge between the local terminal and a monitor session
pub struct TerminalBridge<'a, T: Transport> {
    monitor: &'a mut Monitor<T>,
    code_page: CodePage,
    escape: EscapeState,
    break_retries: u32,
}

impl<'a, T: Transport> TerminalBridge<'a, T> {
    pub fn new(monitor: &'a mut Monitor<T>, code_page: CodePage, break_retries: u32) -> Self {
        Self {
            monitor,
            code_page,
            escape: EscapeState::new(),
            break_retries,
        }
    }

    /// Run until the user exits. The caller owns raw mode.
    pub fn run<W: Write>(&mut self, input: &mut dyn InputSource, out: &mut W) -> Result<()> {
        info!("Terminal session started ({})", self.code_page.name());
        let mut buffer = [0u8; 1024];

        loop {
            // Device output first so a chatty device never waits on the keyboard
            let available = self.monitor.transport_mut().bytes_available()?;
            if available > 0 {
                let want = available.min(buffer.len());
                let n = self
                    .monitor
                    .transport_mut()
                    .read_timeout(&mut buffer[..want], Duration::ZERO)?;
                self.write_output(out, &buffer[..n])?;
            }

            let wait = if available > 0 { Duration::ZERO } else { IDLE_POLL };
            let keys = match input.next_input(wait) {
                Ok(Some(keys)) => keys,
                Ok(None) => continue,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            if !self.handle_keys(&keys, out)? {
                break;
            }
        }

        info!("Terminal session ended");
        Ok(())
    }

    /// Feed keystrokes through the escape machine. False when the user exits.
    fn handle_keys<W: Write>(&mut self, keys: &[u8], out: &mut W) -> Result<bool> {
        let mut pending = Vec::new();
        for &byte in keys {
            match self.escape.feed(byte) {
                Action::Send(bytes) => pending.extend(bytes),
                Action::None => {}
                Action::Exit => {
                    self.send(&pending)?;
                    return Ok(false);
                }
                Action::Break => {
                    self.send(&pending)?;
                    pending.clear();
                    info!("Break requested");
                    self.monitor.send_break(self.break_retries)?;
                    out.write_all(b"\r\n]")?;
                    out.flush()?;
                }
            }
        }
        self.send(&pending)?;
        Ok(true)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let transport = self.monitor.transport_mut();
        transport.write_all(bytes)?;
        transport.flush()?;
        Ok(())
    }

    fn write_output<W: Write>(&self, out: &mut W, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        out.write_all(self.code_page.decode(bytes).as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::scripted::ScriptedTransport;
    use std::collections::VecDeque;

    /// Replays canned keystrokes, then reports end of input
    struct ScriptedInput {
        keys: VecDeque<Vec<u8>>,
    }

    impl ScriptedInput {
        fn new(keys: &[&[u8]]) -> Self {
            Self {
                keys: keys.iter().map(|k| k.to_vec()).collect(),
            }
        }
    }

    impl InputSource for ScriptedInput {
        fn next_input(&mut self, _timeout: Duration) -> io::Result<Option<Vec<u8>>> {
            match self.keys.pop_front() {
                Some(keys) => Ok(Some(keys)),
                None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "done")),
            }
        }
    }

    fn monitor(input: &[u8]) -> Monitor<ScriptedTransport> {
        Monitor::new(ScriptedTransport::new(input)).with_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_escape_normal_keys() {
        let mut esc = EscapeState::new();
        assert_eq!(esc.feed(b'a'), Action::Send(vec![b'a']));
        assert_eq!(esc.feed(b'x'), Action::Send(vec![b'x']));
        assert!(!esc.is_armed());
    }

    #[test]
    fn test_escape_commands() {
        let mut esc = EscapeState::new();
        assert_eq!(esc.feed(ESCAPE_PREFIX), Action::None);
        assert!(esc.is_armed());
        assert_eq!(esc.feed(b'B'), Action::Break);
        assert!(!esc.is_armed());

        esc.feed(ESCAPE_PREFIX);
        assert_eq!(esc.feed(b'f'), Action::Break);
        esc.feed(ESCAPE_PREFIX);
        assert_eq!(esc.feed(b'q'), Action::Exit);
        esc.feed(ESCAPE_PREFIX);
        assert_eq!(esc.feed(b'X'), Action::Exit);
    }

    #[test]
    fn test_escape_other_key_forwards_prefix() {
        let mut esc = EscapeState::new();
        esc.feed(ESCAPE_PREFIX);
        assert_eq!(esc.feed(b'z'), Action::Send(vec![ESCAPE_PREFIX, b'z']));
        assert!(!esc.is_armed());
    }

    #[test]
    fn test_escape_double_prefix() {
        let mut esc = EscapeState::new();
        esc.feed(ESCAPE_PREFIX);
        assert_eq!(esc.feed(ESCAPE_PREFIX), Action::Send(vec![ESCAPE_PREFIX]));
        assert!(esc.is_armed());
        assert_eq!(esc.feed(b'x'), Action::Exit);
    }

    #[test]
    fn test_bridge_forwards_keys_and_output() {
        let mut mon = monitor(b"HELLO \x80\r\n");
        let mut input = ScriptedInput::new(&[b"10 PRINT\r", b"\x01z"]);
        let mut screen = Vec::new();

        TerminalBridge::new(&mut mon, CodePage::default(), 0)
            .run(&mut input, &mut screen)
            .unwrap();

        assert_eq!(String::from_utf8(screen).unwrap(), "HELLO Ç\r\n");
        assert_eq!(mon.into_transport().written, b"10 PRINT\r\x01z".to_vec());
    }

    #[test]
    fn test_bridge_exit_sends_nothing_more() {
        let mut mon = monitor(b"");
        let mut input = ScriptedInput::new(&[b"ab\x01xcd", b"never sent"]);
        let mut screen = Vec::new();

        TerminalBridge::new(&mut mon, CodePage::default(), 0)
            .run(&mut input, &mut screen)
            .unwrap();

        assert_eq!(mon.into_transport().written, b"ab".to_vec());
    }

    #[test]
    fn test_bridge_break() {
        let mut transport = ScriptedTransport::default();
        transport.break_replies.push_back(b"\r\n]".to_vec());
        let mut mon = Monitor::new(transport).with_timeout(Duration::from_millis(20));
        let mut input = ScriptedInput::new(&[b"\x01b"]);
        let mut screen = Vec::new();

        TerminalBridge::new(&mut mon, CodePage::default(), 0)
            .run(&mut input, &mut screen)
            .unwrap();

        assert_eq!(screen, b"\r\n]".to_vec());
        let transport = mon.into_transport();
        assert_eq!(transport.breaks, 1);
        assert!(transport.written.is_empty());
    }

    #[test]
    fn test_bridge_break_timeout_propagates() {
        let mut mon = monitor(b"");
        let mut input = ScriptedInput::new(&[b"\x01F"]);
        let mut screen = Vec::new();

        let err = TerminalBridge::new(&mut mon, CodePage::default(), 1)
            .run(&mut input, &mut screen)
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(mon.into_transport().breaks, 2);
    }
}
