//! Core RP6502 components.
//!
//! This module contains the protocol and data logic:
//!
//! - **image**: Sparse 128K ROM image and the `.rp6502` file format
//! - **transport**: Serial byte transport with timeouts and break
//! - **monitor**: RIA monitor commands, BINARY/UPLOAD transfers, BASIC entry
//! - **codepage**: Console code page tables
//! - **error**: Error taxonomy shared by all of the above
//!
//! # Architecture
//!
//! ```text
//! Monitor
//! ├── Transport (serial port)
//! └── MemoryImage (chunks sent with BINARY)
//! ```

pub mod codepage;
pub mod error;
pub mod image;
pub mod monitor;
pub mod transport;
