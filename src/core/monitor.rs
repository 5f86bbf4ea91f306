//! RP6502 monitor protocol
//!
//! The RIA console is a line-oriented monitor. Every command ends with a
//! carriage return and the monitor answers with a `]` prompt when it is done.
//! File uploads use a `}` prompt between chunks and BASIC uses `READY`.
//! A response that starts with `?` is an error message from the device.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::codepage::CodePage;
use super::error::{Error, Result};
use super::image::{MemoryImage, MAX_CHUNK};
use super::transport::Transport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_millis(10);

/// Monitor prompt
pub const PROMPT: &str = "]";
/// Prompt between upload chunks
pub const UPLOAD_PROMPT: &str = "}";
/// BASIC interpreter prompt
pub const BASIC_PROMPT: &str = "READY";

/// Sent ahead of each BASIC line; the interpreter echoes it back when idle
const PROBE: u8 = b' ';
const BACKSPACE: u8 = 0x08;

/// A monitor session on one transport
pub struct Monitor<T: Transport> {
    transport: T,
    timeout: Duration,
    break_duration: Duration,
}

impl<T: Transport> Monitor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            break_duration: DEFAULT_BREAK_DURATION,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    #[cfg(test)]
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Stop the 6502 and return to the monitor prompt
    pub fn send_break(&mut self, max_retries: u32) -> Result<()> {
        let mut attempt = 0;
        loop {
            self.transport.clear_input()?;
            self.transport.send_break(self.break_duration)?;
            match self.await_prompt(PROMPT, self.timeout) {
                Err(e) if e.is_timeout() && attempt < max_retries => {
                    attempt += 1;
                    warn!("No prompt after break, retry {} of {}", attempt, max_retries);
                }
                result => return result,
            }
        }
    }

    /// Send one command and wait for the next monitor prompt
    pub fn run_command(&mut self, text: &str, timeout: Duration) -> Result<()> {
        debug!("Command: {}", text);
        self.send_line(text)?;
        self.await_prompt(PROMPT, timeout)
    }

    /// Start the 6502. The monitor prompt won't come back.
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting 6502");
        self.send_line("RESET")?;
        self.read_line(self.timeout)?;
        Ok(())
    }

    /// Write `data` to memory at `addr` with a BINARY command
    pub fn send_binary(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        let crc = crc32fast::hash(data);
        debug!("BINARY ${:04X} ${:03X} ${:08X}", addr, data.len(), crc);
        self.send_line(&format!("BINARY ${:04X} ${:03X} ${:08X}", addr, data.len(), crc))?;
        self.transport.write_all(data)?;
        self.transport.flush()?;
        self.await_prompt(PROMPT, self.timeout)
    }

    /// Send every chunk of a ROM image in ascending address order
    pub fn send_image(&mut self, image: &MemoryImage) -> Result<()> {
        let mut count = 0;
        for chunk in image.chunks() {
            self.send_binary(chunk.addr, chunk.data)?;
            count += 1;
        }
        info!("Sent {} chunk(s)", count);
        Ok(())
    }

    /// Upload a stream to the device's drive as `name`
    pub fn upload<R: Read>(&mut self, reader: &mut R, name: &str) -> Result<()> {
        info!("Uploading {}", name);
        self.send_line(&format!("UPLOAD {}", name))?;
        self.await_prompt(UPLOAD_PROMPT, self.timeout)?;

        let mut buf = [0u8; MAX_CHUNK];
        loop {
            let n = read_full(reader, &mut buf)?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            debug!("Upload chunk ${:03X}", n);
            self.send_line(&format!("${:03X} ${:08X}", n, crc32fast::hash(chunk)))?;
            self.transport.write_all(chunk)?;
            self.transport.flush()?;
            self.await_prompt(UPLOAD_PROMPT, self.timeout)?;
        }

        self.run_command("END", self.timeout)
    }

    /// Ask the device which code page its console uses
    pub fn query_code_page(&mut self) -> Result<String> {
        self.send_line("SET CP")?;
        let deadline = Instant::now() + self.timeout;
        let digits = loop {
            let line = self.read_line(self.timeout)?;
            if line.first() == Some(&b'?') {
                return Err(self.device_error(&line[1..])?);
            }
            let digits: String = line
                .iter()
                .filter(|b| b.is_ascii_digit())
                .map(|&b| b as char)
                .collect();
            if !digits.is_empty() {
                break digits;
            }
            if line.is_empty() && Instant::now() > deadline {
                return Err(Error::Timeout);
            }
        };
        self.await_prompt(PROMPT, self.timeout)?;
        debug!("Code page {}", digits);
        Ok(format!("cp{}", digits))
    }

    /// Type a BASIC program into the interpreter and RUN it
    pub fn upload_basic_program(&mut self, path: impl AsRef<Path>, code_page: &CodePage) -> Result<()> {
        let source = fs::read_to_string(path.as_ref())?;
        self.upload_basic_source(&source, code_page)
    }

    pub fn upload_basic_source(&mut self, source: &str, code_page: &CodePage) -> Result<()> {
        self.send_line("BASIC")?;
        self.await_prompt(BASIC_PROMPT, self.timeout)?;

        for (index, line) in source.lines().enumerate() {
            let number = index + 1;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let encoded = code_page.encode(line).ok_or_else(|| {
                Error::Format(format!("line {}: not representable in {}", number, code_page.name()))
            })?;

            // The probe only echoes once the previous line has been consumed.
            // Anything else is the start of an error message.
            self.transport.write_all(&[PROBE])?;
            self.transport.flush()?;
            let echo = self.read_byte(self.timeout)?.ok_or(Error::Timeout)?;
            if echo != PROBE {
                let rest = self.read_line(self.timeout)?;
                let message = String::from_utf8_lossy(&rest).trim().to_string();
                return Err(Error::Device {
                    message,
                    line: Some(number),
                });
            }

            debug!("BASIC line {}", number);
            self.transport.write_all(&[BACKSPACE])?;
            self.transport.write_all(&encoded)?;
            self.transport.write_all(b"\r")?;
            self.transport.flush()?;
            self.read_line(self.timeout)?;
        }

        self.send_line("RUN")
    }

    /// Read until `prompt` arrives. Single-character prompts are matched
    /// byte by byte, longer ones line by line.
    pub fn await_prompt(&mut self, prompt: &str, timeout: Duration) -> Result<()> {
        let single = prompt.len() == 1;
        let mut deadline = Instant::now() + timeout;
        loop {
            let unit = if single {
                self.read_byte(timeout)?.map(|b| vec![b]).unwrap_or_default()
            } else {
                self.read_line(timeout)?
            };

            if unit.is_empty() {
                if Instant::now() > deadline {
                    return Err(Error::Timeout);
                }
                continue;
            }
            deadline = Instant::now() + timeout;

            if unit[0] == b'?' {
                return Err(self.device_error(&unit[1..])?);
            }
            if String::from_utf8_lossy(&unit).trim().eq_ignore_ascii_case(prompt) {
                return Ok(());
            }
        }
    }

    /// Build the error for a `?` response: rest of the unit plus one more line
    fn device_error(&mut self, rest: &[u8]) -> Result<Error> {
        let mut message = String::from_utf8_lossy(rest).into_owned();
        let next = self.read_line(self.timeout)?;
        message.push_str(&String::from_utf8_lossy(&next));
        let message = message.trim().to_string();
        warn!("Device error: {}", message);
        Ok(Error::device(message))
    }

    fn send_line(&mut self, text: &str) -> Result<()> {
        self.transport.write_all(text.as_bytes())?;
        self.transport.write_all(b"\r")?;
        self.transport.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let deadline = Instant::now() + timeout;
        loop {
            if self.transport.read_timeout(&mut byte, timeout)? == 1 {
                return Ok(Some(byte[0]));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    /// Read through the next `\n`. Returns what arrived if time runs out.
    fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let deadline = Instant::now() + timeout;
        let mut byte = [0u8; 1];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.transport.read_timeout(&mut byte, remaining)? == 1 {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    return Ok(line);
                }
            } else if remaining.is_zero() {
                return Ok(line);
            }
        }
    }
}

/// Fill `buf` unless the reader runs out first
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::scripted::ScriptedTransport;
    use std::io::Cursor;

    const SHORT: Duration = Duration::from_millis(20);

    fn monitor(input: &[u8]) -> Monitor<ScriptedTransport> {
        Monitor::new(ScriptedTransport::new(input)).with_timeout(SHORT)
    }

    #[test]
    fn test_await_prompt() {
        let mut mon = monitor(b"OK\n]");
        mon.await_prompt("]", SHORT).unwrap();

        let mut mon = monitor(b"noise\r\nready\r\n");
        mon.await_prompt("READY", SHORT).unwrap();
    }

    #[test]
    fn test_await_prompt_device_error() {
        let mut mon = monitor(b"?Bad thing\n");
        match mon.await_prompt("]", SHORT) {
            Err(Error::Device { message, line }) => {
                assert_eq!(message, "Bad thing");
                assert_eq!(line, None);
            }
            other => panic!("expected device error, got {:?}", other),
        }

        let mut mon = monitor(b"?invalid\r\nmore detail\r\n");
        match mon.await_prompt("READY", SHORT) {
            Err(Error::Device { message, .. }) => assert_eq!(message, "invalid\r\nmore detail"),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[test]
    fn test_await_prompt_timeout() {
        let mut mon = monitor(b"");
        let start = Instant::now();
        assert!(matches!(mon.await_prompt("]", SHORT), Err(Error::Timeout)));
        assert!(start.elapsed() >= SHORT);

        let mut mon = monitor(b"not a prompt\n");
        assert!(matches!(mon.await_prompt("]", SHORT), Err(Error::Timeout)));
    }

    #[test]
    fn test_send_break_retries_once() {
        let mut transport = ScriptedTransport::new(b"stale output");
        transport.break_replies.push_back(Vec::new());
        transport.break_replies.push_back(b"\r\n]".to_vec());
        let mut mon = Monitor::new(transport).with_timeout(SHORT);

        mon.send_break(1).unwrap();
        assert_eq!(mon.into_transport().breaks, 2);
    }

    #[test]
    fn test_send_break_gives_up() {
        let mut mon = monitor(b"");
        assert!(matches!(mon.send_break(2), Err(Error::Timeout)));
        assert_eq!(mon.into_transport().breaks, 3);
    }

    #[test]
    fn test_send_break_at_prompt() {
        let mut transport = ScriptedTransport::default();
        transport.break_replies.push_back(b"]".to_vec());
        let mut mon = Monitor::new(transport).with_timeout(SHORT);
        mon.send_break(0).unwrap();
        assert_eq!(mon.into_transport().breaks, 1);
    }

    #[test]
    fn test_command_and_reset() {
        let mut mon = monitor(b"]RESET\r\n");
        mon.run_command("LOAD game.rp6502", SHORT).unwrap();
        mon.reset().unwrap();
        assert_eq!(mon.into_transport().written_str(), "LOAD game.rp6502\rRESET\r");
    }

    #[test]
    fn test_send_binary() {
        let mut mon = monitor(b"]");
        mon.send_binary(0x0200, b"123456789").unwrap();
        let written = mon.into_transport().written;
        assert_eq!(written, b"BINARY $0200 $009 $CBF43926\r123456789".to_vec());
    }

    #[test]
    fn test_send_image_in_order() {
        let mut image = MemoryImage::new();
        image.set_reset_vector(0x0200).unwrap();
        image.write(0x0200, &[0xEA; 1500]).unwrap();

        let mut mon = monitor(b"]]]");
        mon.send_image(&image).unwrap();
        let written = mon.into_transport().written_str();
        let commands: Vec<_> = written
            .split('\r')
            .filter_map(|part| part.find("BINARY").map(|at| &part[at..at + 17]))
            .collect();
        assert_eq!(commands, vec!["BINARY $0200 $400", "BINARY $0600 $1DC", "BINARY $FFFC $002"]);
    }

    #[test]
    fn test_send_binary_device_error() {
        let mut mon = monitor(b"?CRC mismatch\r\n");
        let err = mon.send_binary(0x0200, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.to_string(), "CRC mismatch");
    }

    #[test]
    fn test_upload_chunks() {
        let data: Vec<u8> = (0..1500u32).map(|i| i as u8).collect();
        let mut mon = monitor(b"}}}]");
        mon.upload(&mut Cursor::new(&data), "game.rp6502").unwrap();

        let written = mon.into_transport().written;
        let mut expected = b"UPLOAD game.rp6502\r".to_vec();
        expected.extend(format!("$400 ${:08X}\r", crc32fast::hash(&data[..1024])).bytes());
        expected.extend_from_slice(&data[..1024]);
        expected.extend(format!("$1DC ${:08X}\r", crc32fast::hash(&data[1024..])).bytes());
        expected.extend_from_slice(&data[1024..]);
        expected.extend_from_slice(b"END\r");
        assert_eq!(written, expected);
    }

    #[test]
    fn test_upload_empty_file() {
        let mut mon = monitor(b"}]");
        mon.upload(&mut Cursor::new(Vec::new()), "empty").unwrap();
        assert_eq!(mon.into_transport().written_str(), "UPLOAD empty\rEND\r");
    }

    #[test]
    fn test_query_code_page() {
        let mut mon = monitor(b"SET CP\r\nCP 850\r\n]");
        assert_eq!(mon.query_code_page().unwrap(), "cp850");

        let mut mon = monitor(b"?unknown command\r\n");
        assert!(matches!(mon.query_code_page(), Err(Error::Device { .. })));
    }

    #[test]
    fn test_basic_upload() {
        let source = "10 PRINT \"HI\"\n\n20 GOTO 10\n";
        let mut mon = monitor(b"READY\r\n 10 PRINT \"HI\"\r\n 20 GOTO 10\r\n");
        mon.upload_basic_source(source, &CodePage::default()).unwrap();
        assert_eq!(
            mon.into_transport().written_str(),
            "BASIC\r \u{8}10 PRINT \"HI\"\r \u{8}20 GOTO 10\rRUN\r"
        );
    }

    #[test]
    fn test_basic_upload_syntax_error() {
        let source = "10 A=1\n20 B=2\n30 C=\n40 D=4\n";
        let mut mon = monitor(
            b"READY\r\n 10 A=1\r\n 20 B=2\r\n?Syntax error\r\n 40 D=4\r\n",
        );
        match mon.upload_basic_source(source, &CodePage::default()) {
            Err(Error::Device { message, line }) => {
                assert_eq!(message, "Syntax error");
                assert_eq!(line, Some(3));
            }
            other => panic!("expected device error, got {:?}", other),
        }
        let written = mon.into_transport().written_str();
        assert!(!written.contains("30 C="));
        assert!(!written.contains("40 D=4"));
        assert!(!written.contains("RUN"));
    }

    #[test]
    fn test_basic_upload_unencodable() {
        let mut mon = monitor(b"READY\r\n");
        let err = mon
            .upload_basic_source("10 PRINT \"ø\"\n", &CodePage::by_name("cp437"))
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
