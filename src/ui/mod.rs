//! Interactive terminal.
//!
//! - **bridge**: Keyboard/device pass-through with the Ctrl+A command prefix
//! - **input**: Raw stdin or key-event input sources
//! - **keymapper**: Key events to VT byte sequences

pub mod bridge;
pub mod input;
pub mod keymapper;

pub use bridge::{RawModeGuard, TerminalBridge};
