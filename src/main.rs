//! rp6502 - Control an RP6502 over its RIA serial console
//!
//! Sends ROM images to 6502 RAM, uploads files to the USB drive, types in
//! BASIC programs, and provides a terminal to the running program.
//!
//! # Quick Start
//!
//! ```text
//! rp6502 run hello.rp6502 -t        # Load, reset, then attach a terminal
//! rp6502 upload game.rp6502         # Copy a file to the RP6502 drive
//! rp6502 create -a 0x200 -r 0x200 -o hello.rp6502 hello.bin
//! rp6502 basic adventure.bas -t     # Type in a BASIC program and RUN it
//! rp6502 term                       # Terminal only
//! ```
//!
//! # Terminal keys (Ctrl+A prefix)
//!
//! | Key | Action |
//! |-----|--------|
//! | b | Break to the monitor |
//! | x | Exit |

mod config;
mod core;
mod ui;

use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::codepage::CodePage;
use crate::core::image::{self, AddrSource, MemoryImage};
use crate::core::monitor::Monitor;
use crate::core::transport::SerialTransport;
use crate::ui::{input, RawModeGuard, TerminalBridge};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

const NAME: &str = "rp6502";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Upload,
    Create,
    Basic,
    Term,
}

/// Command line options
#[derive(Debug)]
struct Args {
    command: Command,
    files: Vec<String>,
    out: Option<String>,
    address: Option<AddrSource>,
    nmi: Option<AddrSource>,
    reset: Option<AddrSource>,
    irq: Option<AddrSource>,
    config: Option<PathBuf>,
    device: Option<String>,
    term: bool,
}

fn print_help() {
    eprintln!("{} {} - Control an RP6502 over its RIA serial console", NAME, VERSION);
    eprintln!();
    eprintln!("Usage: {} <COMMAND> [OPTIONS] [FILES...]", NAME);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <rom>             Send a local RP6502 ROM file to RAM and reset");
    eprintln!("  upload <files...>     Upload local files to the RP6502 USB drive");
    eprintln!("  create <bin> [roms]   Create a ROM file from a binary and other ROM files");
    eprintln!("  basic <file>          Type a BASIC program into the interpreter and RUN it");
    eprintln!("  term                  Open a terminal to the RP6502 console");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o <name>             Output path/filename");
    eprintln!("  -a, --address <addr>  Starting address of data, or `file` to read it from the file");
    eprintln!("  -n, --nmi <addr>      NMI vector for $FFFA-$FFFB, or `file`");
    eprintln!("  -r, --reset <addr>    Reset vector for $FFFC-$FFFD, or `file`");
    eprintln!("  -i, --irq <addr>      IRQ vector for $FFFE-$FFFF, or `file`");
    eprintln!("  -t, --term            Open a terminal after run or basic");
    eprintln!("  -c, --config <name>   Configuration file for serial device");
    eprintln!("  -D, --device <dev>    Serial device name. Default={}", config::default_device());
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Addresses may be written $FFFF, 0xFFFF or in decimal.");
    eprintln!();
    eprintln!("Terminal keys (Ctrl+A prefix):");
    eprintln!("  Ctrl+A, b             Break to the monitor");
    eprintln!("  Ctrl+A, x             Exit");
    eprintln!("  Ctrl+A, Ctrl+A        Send Ctrl+A");
}

/// Parse an address option. `file` means read it from the binary.
fn parse_address(text: &str, option: &str) -> Result<AddrSource, String> {
    if text.eq_ignore_ascii_case("file") {
        return Ok(AddrSource::FromData);
    }
    let parsed = if text.starts_with('$') || text.starts_with("0x") || text.starts_with("0X") {
        image::parse_number(text).ok()
    } else {
        text.parse::<usize>().ok()
    };
    parsed
        .map(AddrSource::At)
        .ok_or_else(|| format!("argument {}: invalid address: '{}'", option, text))
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut command = None;
    let mut parsed = Args {
        command: Command::Term,
        files: Vec::new(),
        out: None,
        address: None,
        nmi: None,
        reset: None,
        irq: None,
        config: None,
        device: None,
        term: false,
    };
    let mut i = 1;

    while i < args.len() {
        let arg = args[i].as_str();
        // Options that take a value
        let mut value = |name: &str| -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", name))
        };
        match arg {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                eprintln!("{} {}", NAME, VERSION);
                std::process::exit(0);
            }
            "-o" => parsed.out = Some(value(arg)?),
            "-a" | "--address" => parsed.address = Some(parse_address(&value(arg)?, "-a/--address")?),
            "-n" | "--nmi" => parsed.nmi = Some(parse_address(&value(arg)?, "-n/--nmi")?),
            "-r" | "--reset" => parsed.reset = Some(parse_address(&value(arg)?, "-r/--reset")?),
            "-i" | "--irq" => parsed.irq = Some(parse_address(&value(arg)?, "-i/--irq")?),
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value(arg)?)),
            "-D" | "--device" => parsed.device = Some(value(arg)?),
            "-t" | "--term" => parsed.term = true,
            "run" | "upload" | "create" | "basic" | "term" if command.is_none() => {
                command = Some(match arg {
                    "run" => Command::Run,
                    "upload" => Command::Upload,
                    "create" => Command::Create,
                    "basic" => Command::Basic,
                    _ => Command::Term,
                });
            }
            arg if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            file => parsed.files.push(file.to_string()),
        }
        i += 1;
    }

    parsed.command = command.ok_or_else(|| "Missing command. Use -h for help.".to_string())?;
    Ok(parsed)
}

/// Log to ~/.rp6502/rp6502.log so output never lands in the terminal
fn init_logging() {
    let log_path = config::home_dir()
        .map(|h| h.join(".rp6502").join("rp6502.log"))
        .unwrap_or_else(|| PathBuf::from("rp6502.log"));

    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("RP6502_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("{} {} starting: {:?}", NAME, VERSION, args.command);

    let config = load_config(&args)?;

    match args.command {
        Command::Run => run(&args, &config),
        Command::Upload => upload(&args, &config),
        Command::Create => create(&args),
        Command::Basic => basic(&args, &config),
        Command::Term => {
            let mut monitor = open_monitor(&config)?;
            monitor.send_break(config.break_retries)?;
            let code_page = query_code_page(&mut monitor)?;
            interactive(&mut monitor, code_page, &config)
        }
    }
}

/// Config file, with the command line device merged in. A named config
/// file that doesn't exist yet is created from these settings.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if let Some(path) = &args.config {
        if !path.exists() {
            config.device = Some(config.device_or_default());
            config.save(path)?;
            info!("Wrote config {}", path.display());
        }
    }
    Ok(config)
}

fn open_monitor(config: &Config) -> anyhow::Result<Monitor<SerialTransport>> {
    let device = config.device_or_default();
    println!("[{}] Opening device {}", NAME, device);
    let transport = SerialTransport::open(&device, config.baud_rate)
        .with_context(|| format!("Failed to open {}", device))?;
    Ok(Monitor::new(transport)
        .with_timeout(config.timeout())
        .with_break_duration(config.break_duration()))
}

fn query_code_page(monitor: &mut Monitor<SerialTransport>) -> anyhow::Result<CodePage> {
    let code_page = CodePage::by_name(&monitor.query_code_page()?);
    if !code_page.is_supported() {
        warn!("No table for {}, decoding ASCII only", code_page.name());
    }
    Ok(code_page)
}

/// rp6502 run
fn run(args: &Args, config: &Config) -> anyhow::Result<()> {
    let Some(file) = args.files.first() else {
        bail!("run needs a ROM file");
    };
    println!("[{}] Loading ROM {}", NAME, file);
    let mut rom = MemoryImage::new();
    rom.load_packaged(file)?;
    match args.reset {
        Some(AddrSource::At(addr)) => rom.set_reset_vector(addr)?,
        Some(AddrSource::FromData) => bail!("argument -r/--reset: `file` only applies to create"),
        _ => {}
    }

    let mut monitor = open_monitor(config)?;
    monitor.send_break(config.break_retries)?;
    let code_page = if args.term {
        Some(query_code_page(&mut monitor)?)
    } else {
        None
    };
    monitor.send_image(&rom)?;
    if rom.has_reset_vector() {
        monitor.reset()?;
    } else {
        println!("No reset vector. Not resetting.");
    }

    match code_page {
        Some(code_page) => interactive(&mut monitor, code_page, config),
        None => Ok(()),
    }
}

/// rp6502 upload
fn upload(args: &Args, config: &Config) -> anyhow::Result<()> {
    if args.files.is_empty() {
        return Ok(());
    }
    let mut monitor = open_monitor(config)?;
    monitor.send_break(config.break_retries)?;
    for file in &args.files {
        println!("[{}] Uploading {}", NAME, file);
        let dest = match (&args.out, args.files.len()) {
            (Some(out), 1) => out.clone(),
            _ => base_name(file)?,
        };
        let mut reader = File::open(file).with_context(|| format!("Failed to open {}", file))?;
        monitor.upload(&mut reader, &dest)?;
    }
    Ok(())
}

/// rp6502 create
fn create(args: &Args) -> anyhow::Result<()> {
    let Some(out) = &args.out else {
        bail!("argument -o required");
    };
    let Some(address) = args.address else {
        bail!("argument -a/--address required");
    };
    let Some((binary, roms)) = args.files.split_first() else {
        bail!("create needs a binary file");
    };

    println!("[{}] Creating {}", NAME, out);
    let mut rom = MemoryImage::new();
    println!("[{}] Adding binary asset {}", NAME, binary);
    let data = fs::read(binary).with_context(|| format!("Failed to read {}", binary))?;
    rom.load_binary(
        &data,
        address,
        args.nmi.unwrap_or(AddrSource::Absent),
        args.reset.unwrap_or(AddrSource::Absent),
        args.irq.unwrap_or(AddrSource::Absent),
    )?;
    for file in roms {
        println!("[{}] Adding ROM asset {}", NAME, file);
        rom.load_packaged(file)?;
    }
    rom.save(out)?;
    info!("Created {}", out);
    Ok(())
}

/// rp6502 basic
fn basic(args: &Args, config: &Config) -> anyhow::Result<()> {
    let Some(file) = args.files.first() else {
        bail!("basic needs a program file");
    };
    let mut monitor = open_monitor(config)?;
    monitor.send_break(config.break_retries)?;
    let code_page = query_code_page(&mut monitor)?;
    println!("[{}] Typing in {}", NAME, file);
    monitor.upload_basic_program(file, &code_page)?;

    if args.term {
        interactive(&mut monitor, code_page, config)?;
    }
    Ok(())
}

/// Attach the local terminal until the user leaves with Ctrl+A x
fn interactive(
    monitor: &mut Monitor<SerialTransport>,
    code_page: CodePage,
    config: &Config,
) -> anyhow::Result<()> {
    println!("[{}] Terminal open. Ctrl+A x to exit, Ctrl+A b to break.", NAME);
    let mut source = input::open(config.terminal.key_events, &code_page)?;
    let _raw = RawModeGuard::enable()?;
    let mut stdout = io::stdout();
    TerminalBridge::new(monitor, code_page, config.break_retries).run(source.as_mut(), &mut stdout)?;
    Ok(())
}

fn base_name(file: &str) -> anyhow::Result<String> {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("No file name in {}", file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("$FFFC", "-r"), Ok(AddrSource::At(0xFFFC)));
        assert_eq!(parse_address("0x10000", "-a"), Ok(AddrSource::At(0x10000)));
        assert_eq!(parse_address("512", "-a"), Ok(AddrSource::At(512)));
        assert_eq!(parse_address("FILE", "-a"), Ok(AddrSource::FromData));
        assert!(parse_address("$G00", "-a").is_err());
        assert!(parse_address("soon", "-a").is_err());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("roms/hello.rp6502").unwrap(), "hello.rp6502");
        assert!(base_name("..").is_err());
    }
}
