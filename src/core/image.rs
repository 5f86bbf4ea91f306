//! Sparse RP6502 ROM image
//!
//! An image is up to a screen of help text followed by a sparse 128K address
//! space. The low bank ($0000-$FFFF) is 6502 RAM including the CPU vectors,
//! the high bank ($10000-$1FFFF) is extended memory. Both banks are sent to
//! the device and written to disk in the same chunked form:
//!
//! ```text
//! #!RP6502
//! # help line
//! $0200 $010 $1A2B3C4D
//! <16 raw bytes>
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use super::error::{Error, Result};

/// Size of the whole address space
pub const ADDRESS_SPACE: usize = 0x20000;
/// First address of the high bank
pub const BANK_SIZE: usize = 0x10000;
/// Largest chunk sent in one BINARY command or file record
pub const MAX_CHUNK: usize = 1024;
/// Help text limits (one screen)
pub const HELP_MAX_LINES: usize = 24;
pub const HELP_MAX_WIDTH: usize = 80;

pub const NMI_VECTOR: usize = 0xFFFA;
pub const RESET_VECTOR: usize = 0xFFFC;
pub const IRQ_VECTOR: usize = 0xFFFE;

/// Where a load address comes from when ingesting a raw binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSource {
    /// Not provided
    Absent,
    /// Explicit address
    At(usize),
    /// Read the next two little-endian bytes from the front of the data
    FromData,
}

/// A contiguous run of occupied bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub addr: usize,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Address just past this chunk, used to continue iteration
    pub fn end(&self) -> usize {
        self.addr + self.data.len()
    }

    pub fn crc(&self) -> u32 {
        crc32fast::hash(self.data)
    }
}

/// The RP6502 ROM image
#[derive(Clone)]
pub struct MemoryImage {
    help: Vec<String>,
    data: Box<[u8]>,
    occupied: Box<[bool]>,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImage {
    pub fn new() -> Self {
        Self {
            help: Vec::new(),
            data: vec![0u8; ADDRESS_SPACE].into_boxed_slice(),
            occupied: vec![false; ADDRESS_SPACE].into_boxed_slice(),
        }
    }

    #[cfg(test)]
    pub fn help(&self) -> &[String] {
        &self.help
    }

    /// Add one line of help text
    pub fn add_help(&mut self, line: &str) -> Result<()> {
        if line.chars().count() > HELP_MAX_WIDTH {
            return Err(Error::Format("Help line too long".to_string()));
        }
        if line.chars().any(char::is_control) {
            return Err(Error::Format("Control character in help line".to_string()));
        }
        if self.help.len() >= HELP_MAX_LINES {
            return Err(Error::Format(format!("Help lines > {}", HELP_MAX_LINES)));
        }
        self.help.push(line.to_string());
        Ok(())
    }

    /// Mark a range as used. Nothing is marked if any part of it fails.
    pub fn allocate(&mut self, addr: usize, len: usize) -> Result<()> {
        let end = addr
            .checked_add(len)
            .filter(|&end| end <= ADDRESS_SPACE)
            .ok_or(Error::Range { addr, len })?;
        if addr < BANK_SIZE && end > BANK_SIZE {
            return Err(Error::Range { addr, len });
        }
        if let Some(offset) = self.occupied[addr..end].iter().position(|&used| used) {
            return Err(Error::Overlap { addr: addr + offset });
        }
        self.occupied[addr..end].fill(true);
        Ok(())
    }

    /// Allocate and copy in `data`
    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        self.allocate(addr, data.len())?;
        self.data[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn set_nmi_vector(&mut self, addr: usize) -> Result<()> {
        self.set_vector(NMI_VECTOR, addr)
    }

    pub fn set_reset_vector(&mut self, addr: usize) -> Result<()> {
        self.set_vector(RESET_VECTOR, addr)
    }

    pub fn set_irq_vector(&mut self, addr: usize) -> Result<()> {
        self.set_vector(IRQ_VECTOR, addr)
    }

    /// Vectors point into the 6502's 64K
    fn set_vector(&mut self, slot: usize, addr: usize) -> Result<()> {
        let addr = u16::try_from(addr).map_err(|_| Error::Range { addr, len: 2 })?;
        self.write(slot, &addr.to_le_bytes())
    }

    /// True once both bytes of $FFFC-$FFFD are set
    pub fn has_reset_vector(&self) -> bool {
        self.occupied[RESET_VECTOR] && self.occupied[RESET_VECTOR + 1]
    }

    /// Ingest a raw binary. Addresses requested as `FromData` are taken off
    /// the front of `bytes` in the order data, NMI, RESET, IRQ. The image is
    /// untouched if anything fails.
    pub fn load_binary(
        &mut self,
        bytes: &[u8],
        data_addr: AddrSource,
        nmi: AddrSource,
        reset: AddrSource,
        irq: AddrSource,
    ) -> Result<()> {
        let mut staged = self.clone();
        staged.merge_binary(bytes, data_addr, nmi, reset, irq)?;
        *self = staged;
        Ok(())
    }

    fn merge_binary(
        &mut self,
        bytes: &[u8],
        data_addr: AddrSource,
        nmi: AddrSource,
        reset: AddrSource,
        irq: AddrSource,
    ) -> Result<()> {
        let mut rest = bytes;
        let data_addr = match take_addr(&mut rest, data_addr, "data")? {
            Some(addr) => addr,
            None => return Err(Error::Format("Address for data is required.".to_string())),
        };
        if let Some(addr) = take_addr(&mut rest, nmi, "nmi")? {
            self.set_nmi_vector(addr)?;
        }
        if let Some(addr) = take_addr(&mut rest, reset, "reset")? {
            self.set_reset_vector(addr)?;
        }
        if let Some(addr) = take_addr(&mut rest, irq, "irq")? {
            self.set_irq_vector(addr)?;
        }
        self.write(data_addr, rest)
    }

    /// Merge a packaged `.rp6502` file into this image
    pub fn load_packaged(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        self.read_from(&mut BufReader::new(file)).map_err(|e| match e {
            Error::Format(msg) => Error::Format(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse the packaged format from a reader, merging into this image.
    /// Nothing is merged unless the whole file is good.
    pub fn read_from<R: BufRead>(&mut self, reader: &mut R) -> Result<()> {
        let mut staged = self.clone();
        staged.merge_packaged(reader)?;
        *self = staged;
        Ok(())
    }

    fn merge_packaged<R: BufRead>(&mut self, reader: &mut R) -> Result<()> {
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;
        if !is_signature(&line) {
            return Err(Error::Format("Invalid RP6502 ROM file".to_string()));
        }

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let text = std::str::from_utf8(&line)
                .map_err(|_| Error::Format("Corrupt RP6502 ROM file".to_string()))?
                .trim_end();
            let body = text.trim_start_matches(' ');

            // An optional blank line ends the help block
            if body.is_empty() {
                continue;
            }
            if body == "#" {
                self.add_help("")?;
                continue;
            }
            if let Some(help) = body.strip_prefix("# ") {
                self.add_help(help)?;
                continue;
            }

            let (addr, len, crc) = parse_record_header(body)?;
            let mut data = Vec::new();
            reader.by_ref().take(len as u64).read_to_end(&mut data)?;
            if data.len() != len || crc32fast::hash(&data) != crc {
                return Err(Error::Checksum { addr });
            }
            self.write(addr, &data)?;
            debug!("Loaded ${:04X} ${:03X}", addr, len);
        }
        Ok(())
    }

    /// Write the packaged format to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(b"#!RP6502\n")?;
        for help in &self.help {
            if help.is_empty() {
                writer.write_all(b"#\n")?;
            } else {
                writeln!(writer, "# {}", help)?;
            }
        }
        for chunk in self.chunks() {
            writeln!(
                writer,
                "${:04X} ${:03X} ${:08X}",
                chunk.addr,
                chunk.data.len(),
                chunk.crc()
            )?;
            writer.write_all(chunk.data)?;
        }
        Ok(())
    }

    /// Find the next chunk at or after `from`. Chunks stop at 1K and at the
    /// bank boundary.
    pub fn next_chunk(&self, from: usize) -> Option<Chunk<'_>> {
        if from >= ADDRESS_SPACE {
            return None;
        }
        let addr = from + self.occupied[from..].iter().position(|&used| used)?;
        let limit = if addr < BANK_SIZE { BANK_SIZE } else { ADDRESS_SPACE };
        let limit = limit.min(addr + MAX_CHUNK);
        let len = self.occupied[addr..limit]
            .iter()
            .take_while(|&&used| used)
            .count();
        Some(Chunk {
            addr,
            data: &self.data[addr..addr + len],
        })
    }

    /// All chunks in ascending address order
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks { image: self, next: 0 }
    }
}

/// Iterator over `next_chunk`
pub struct Chunks<'a> {
    image: &'a MemoryImage,
    next: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.image.next_chunk(self.next)?;
        self.next = chunk.end();
        Some(chunk)
    }
}

fn take_addr(rest: &mut &[u8], source: AddrSource, what: &str) -> Result<Option<usize>> {
    match source {
        AddrSource::Absent => Ok(None),
        AddrSource::At(addr) => Ok(Some(addr)),
        AddrSource::FromData => {
            if rest.len() < 2 {
                return Err(Error::Format(format!("No {} address found in file.", what)));
            }
            let addr = u16::from_le_bytes([rest[0], rest[1]]);
            *rest = &rest[2..];
            Ok(Some(addr as usize))
        }
    }
}

/// `#!RP6502` with optional `\r`, case-insensitive on the letters
fn is_signature(line: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.eq_ignore_ascii_case(b"#!RP6502")
}

fn parse_record_header(text: &str) -> Result<(usize, usize, u32)> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [addr, len, crc] = fields.as_slice() else {
        return Err(Error::Format("Corrupt RP6502 ROM file".to_string()));
    };
    let crc = u32::try_from(parse_number(crc)?)
        .map_err(|_| Error::Format(format!("Invalid CRC: {}", crc)))?;
    Ok((parse_number(addr)?, parse_number(len)?, crc))
}

/// Parse a `$FFFF` or `0xFFFF` number
pub fn parse_number(text: &str) -> Result<usize> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| Error::Format(format!("Invalid address: {}", text)))?;
    usize::from_str_radix(digits, 16).map_err(|_| Error::Format(format!("Invalid address: {}", text)))
}
