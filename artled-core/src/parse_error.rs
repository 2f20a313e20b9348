//! The errors related to parsing received Art-Net datagrams and packing replies.

use crate::{
    definitions::{ARTDMX_DATA_INDEX, ARTNET_MIN_PACKET_LENGTH, POLL_REPLY_LENGTH},
    port_address::PortAddressError,
};

/// Reasons why a datagram is not acted upon or a reply can't be packed.
///
/// None of these stop the receiver, they only decide which datagrams get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Datagram is too short for a signature and an opcode.
    ///
    /// # Arguments
    /// Length of the received datagram
    #[error("Datagram of {0} bytes is shorter than the minimum of {ARTNET_MIN_PACKET_LENGTH} bytes")]
    TooShort(usize),

    /// Datagram is an ArtDmx packet but ends before the DMX data starts.
    ///
    /// # Arguments
    /// Length of the received datagram
    #[error("ArtDmx packet of {0} bytes ends before the data field at byte {ARTDMX_DATA_INDEX}")]
    DmxHeaderTooShort(usize),

    /// The first eight bytes are not `Art-Net\0`.
    #[error("Datagram does not start with the Art-Net signature")]
    InvalidSignature,

    /// Opcode this node does not react to.
    ///
    /// # Arguments
    /// The opcode as read from the wire
    #[error("Opcode {0:#06x} not supported")]
    UnsupportedOpCode(u16),

    /// The port-address of an ArtDmx packet has the reserved bit set.
    #[error("Invalid port-address in ArtDmx packet: {0}")]
    InvalidPortAddress(#[from] PortAddressError),

    /// Supplied buffer is not large enough to pack a poll reply into.
    ///
    /// # Arguments
    /// Length of the supplied buffer
    #[error("Buffer of {0} bytes is too small for a poll reply of {POLL_REPLY_LENGTH} bytes")]
    PackBufferInsufficient(usize),
}
