#![warn(missing_docs)]
//! This module contains the names a node announces itself with
//!
//! The same names show up in the control protocol banner and in the Art-Net poll reply.

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use heapless::String;

use crate::definitions::{POLL_REPLY_LONG_NAME_LENGTH, POLL_REPLY_SHORT_NAME_LENGTH};

/// A single name or identifier of the node
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeName {
    inner: String<{ Self::CAPACITY }>,
}

impl Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl core::ops::Deref for NodeName {
    type Target = String<{ Self::CAPACITY }>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl NodeName {
    /// Same as the long name field of the poll reply, anything longer could never be announced.
    pub const CAPACITY: usize = POLL_REPLY_LONG_NAME_LENGTH;

    /// Creates a new [NodeName]
    pub fn new<S: AsRef<str>>(s: S) -> Result<Self, NodeNameError> {
        let value = s.as_ref();

        let inner = String::from_str(value).map_err(|_| NodeNameError::NodeNameTooLong(value.len()))?;
        Ok(Self { inner })
    }

    /// Returns a [str] reference
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// Returns the bytes this name is made out of
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }
}

impl FromStr for NodeName {
    type Err = NodeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for NodeName {
    type Error = NodeNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

/// For any node name specific errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeNameError {
    /// A name that's too long was encountered.
    /// Maximum length should be [`NodeName::CAPACITY`]
    ///
    /// # Arguments
    /// Length of too long name
    #[error("Given node name is too long. Maximum is {} but current name is: {}", NodeName::CAPACITY, .0)]
    NodeNameTooLong(usize),
}

/// Everything the node tells others about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Descriptive name, shown in the banner and the long name field of the poll reply.
    pub long_name: NodeName,
    /// Short name for the poll reply.
    pub short_name: NodeName,
    /// Appended to both names.
    pub serial: NodeName,
    /// Shown in the banner.
    pub firmware_version: NodeName,
}

impl NodeIdentity {
    /// Long name used when none is configured.
    pub const DEFAULT_LONG_NAME: &'static str = "Krach vom Fach LED Tube";
    /// Short name used when none is configured.
    pub const DEFAULT_SHORT_NAME: &'static str = "LED Tube";
    /// Serial number used when none is configured.
    pub const DEFAULT_SERIAL: &'static str = "6";
    /// Firmware version reported in the banner.
    pub const DEFAULT_FIRMWARE_VERSION: &'static str = "1.0";

    /// Creates a new identity from plain strings.
    pub fn new(long_name: &str, short_name: &str, serial: &str, firmware_version: &str) -> Result<Self, NodeNameError> {
        Ok(Self {
            long_name: NodeName::new(long_name)?,
            short_name: NodeName::new(short_name)?,
            serial: NodeName::new(serial)?,
            firmware_version: NodeName::new(firmware_version)?,
        })
    }

    /// The greeting sent to every control connection before the first state report.
    pub fn banner(&self) -> Banner<'_> {
        Banner(self)
    }

    /// Writes `"{short_name} {serial}"` into the short name field of a poll reply.
    pub fn write_short_name(&self, field: &mut [u8; POLL_REPLY_SHORT_NAME_LENGTH]) {
        write_null_padded(field, &[self.short_name.as_bytes(), b" ", self.serial.as_bytes()]);
    }

    /// Writes `"{long_name} {serial}"` into the long name field of a poll reply.
    pub fn write_long_name(&self, field: &mut [u8; POLL_REPLY_LONG_NAME_LENGTH]) {
        write_null_padded(field, &[self.long_name.as_bytes(), b" ", self.serial.as_bytes()]);
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        // the defaults are far below NodeName::CAPACITY
        Self {
            long_name: NodeName { inner: heapless_str(Self::DEFAULT_LONG_NAME) },
            short_name: NodeName { inner: heapless_str(Self::DEFAULT_SHORT_NAME) },
            serial: NodeName { inner: heapless_str(Self::DEFAULT_SERIAL) },
            firmware_version: NodeName { inner: heapless_str(Self::DEFAULT_FIRMWARE_VERSION) },
        }
    }
}

fn heapless_str(s: &str) -> String<{ NodeName::CAPACITY }> {
    String::from_str(s).unwrap_or_default()
}

/// The control protocol banner: `"{long_name} {serial}\r\nFW {firmware_version}\r\n\r\n"`
#[derive(Debug, Clone, Copy)]
pub struct Banner<'a>(&'a NodeIdentity);

impl Display for Banner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}\r\nFW {}\r\n\r\n", self.0.long_name, self.0.serial, self.0.firmware_version)
    }
}

/// Concatenates `parts` into `field`, truncating so the last byte always stays null.
fn write_null_padded(field: &mut [u8], parts: &[&[u8]]) {
    field.fill(0);
    let limit = field.len().saturating_sub(1);
    let mut pos = 0;
    for part in parts {
        let take = part.len().min(limit - pos);
        field[pos..pos + take].copy_from_slice(&part[..take]);
        pos += take;
    }
}
