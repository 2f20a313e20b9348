//! This module contains the Art-Net `Port-Address`, the 15 bit universe number carried by ArtDmx packets.
//!
//! Net, sub-net and universe are not split out, the patch table only ever compares whole addresses.

use core::fmt::Display;

/// Port-Address value
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortAddress(u16);

impl Display for PortAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for PortAddress {
    type Error = PortAddressError;

    fn try_from(raw_address: u16) -> Result<Self, Self::Error> {
        Self::in_range(raw_address).map(|()| Self(raw_address))
    }
}

impl From<PortAddress> for u16 {
    fn from(address: PortAddress) -> Self {
        address.0
    }
}

impl PartialEq<u16> for PortAddress {
    fn eq(&self, other: &u16) -> bool {
        self.0.eq(other)
    }
}

impl PortAddress {
    /// The lowest Port-Address.
    pub const MIN_RAW: u16 = 0;
    /// See [Self::MIN_RAW]
    pub const MIN: Self = Self(Self::MIN_RAW);

    /// The highest Port-Address, bit 15 is reserved by Art-Net.
    pub const MAX_RAW: u16 = 0x7fff;
    /// See [Self::MAX_RAW]
    pub const MAX: Self = Self(Self::MAX_RAW);

    /// Checks if the given value fits into the 15 bits of a Port-Address.
    ///
    /// # Errors
    /// InvalidValue: Returned if bit 15 is set.
    pub const fn in_range(raw_address: u16) -> Result<(), PortAddressError> {
        if raw_address <= Self::MAX_RAW {
            return Ok(());
        }

        Err(PortAddressError::InvalidValue(raw_address))
    }

    /// Create a new Port-Address
    pub const fn new(raw_address: u16) -> Result<Self, PortAddressError> {
        match Self::in_range(raw_address) {
            Ok(()) => Ok(Self(raw_address)),
            Err(e) => Err(e),
        }
    }

    /// Create a new Port-Address from bytes in little endian order, the order used on the wire.
    pub const fn from_le_bytes(bytes: [u8; 2]) -> Result<Self, PortAddressError> {
        Self::new(u16::from_le_bytes(bytes))
    }
}

/// Error for creation of [PortAddress]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PortAddressError {
    /// Attempted to use a value with the reserved bit 15 set.
    ///
    /// # Arguments
    /// 0: Value of invalid Port-Address
    #[error("Invalid port-address used. Must be in the range [{} - {}], port-address: {}", PortAddress::MIN_RAW, PortAddress::MAX_RAW, .0)]
    InvalidValue(u16),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_port_address_limits() {
        assert_eq!(PortAddress::new(0).unwrap(), PortAddress::MIN);
        assert_eq!(PortAddress::new(0x7fff).unwrap(), PortAddress::MAX);
        assert_eq!(PortAddress::new(0x8000), Err(PortAddressError::InvalidValue(0x8000)));
        assert!(PortAddress::try_from(u16::MAX).is_err());
    }

    #[test]
    fn test_port_address_wire_order() {
        // low byte first
        assert_eq!(PortAddress::from_le_bytes([0x03, 0x00]).unwrap(), 3);
        assert_eq!(PortAddress::from_le_bytes([0x00, 0x01]).unwrap(), 256);
        assert!(PortAddress::from_le_bytes([0x00, 0x80]).is_err());
    }
}
