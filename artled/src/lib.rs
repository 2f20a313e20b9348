//! An Art-Net node driving a strip of RGB LEDs.
//!
//! Incoming ArtDmx packets are mapped onto the strip through a [patch_table::PatchTable]. The table can be changed at
//! run time over a line based TCP control port and is saved to a [settings::SettingsStore] after every change.
//!
//! # Examples
//!
//! Routing a received datagram into a frame buffer, without any sockets involved.
//! ```
//! use std::sync::RwLock;
//!
//! use artled::patch_table::PatchTable;
//! use artled::pixel::{PixelBuffer, Rgb};
//! use artled::receive::{handle_datagram, Reception};
//!
//! let table = RwLock::new(PatchTable::default());
//! let mut pixels = PixelBuffer::new();
//!
//! let mut datagram = Vec::from(*b"Art-Net\0");
//! datagram.extend_from_slice(&[0x00, 0x50, 0, 14, 0, 0]); // ArtDmx, protocol version, sequence, physical
//! datagram.extend_from_slice(&[2, 0]); // universe 2, low byte first
//! datagram.extend_from_slice(&[0, 3]); // 3 channels, high byte first
//! datagram.extend_from_slice(&[255, 128, 0]);
//!
//! let reception = handle_datagram(&datagram, &table, &mut pixels).unwrap();
//! assert_eq!(reception, Reception::Routed { slot: 2, pixels: 1 });
//! assert_eq!(pixels.get(20), Some(Rgb::new(255, 128, 0)));
//! ```
//!
//! Applying a control line.
//! ```
//! use artled::command::{Command, Outcome};
//! use artled::patch_table::PatchTable;
//!
//! let mut table = PatchTable::default();
//! assert_eq!(Command::parse("NUM_UNIS 2").apply(&mut table), Outcome::PersistAndRestart);
//! assert_eq!(table.offsets(), &[0, 10, 100]);
//! ```

#![warn(missing_docs)]

pub use artled_core::{command, definitions, node_name, packet, parse_error, patch_table, pixel, port_address};

pub mod control;
pub mod error;
pub mod node;
pub mod receive;
pub mod settings;

/// Result type of everything in this crate that can fail
pub type ArtledResult<T> = Result<T, error::Error>;
