#![no_std]
#![warn(missing_docs)]

//! Core types for the artled crate
//!
//! Everything in here works on plain buffers and fixed capacity containers so it can run without an allocator.

pub mod command;
pub mod definitions;
pub mod node_name;
pub mod packet;
pub mod parse_error;
pub mod patch_table;
pub mod pixel;
pub mod port_address;
