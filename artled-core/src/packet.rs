#![warn(missing_docs)]

//! Parsing of received Art-Net datagrams and packing of the poll reply.
//!
//! Only the parts of Art-Net this node reacts to are understood: ArtDmx carries channel data,
//! ArtPoll, ArtAddress and ArtInput are all answered with the same fixed ArtPollReply.
//! Everything else is rejected with a [ParseError] and dropped by the receiver.
//!
//! # Examples
//!
//! ```
//! # use artled_core::packet::{ArtNetPacket, OpCode};
//! let mut buf = [0u8; 24];
//! buf[..8].copy_from_slice(b"Art-Net\0");
//! buf[8..10].copy_from_slice(&(OpCode::Dmx as u16).to_le_bytes());
//! buf[14..16].copy_from_slice(&3u16.to_le_bytes()); // port-address, low byte first
//! buf[16..18].copy_from_slice(&6u16.to_be_bytes()); // length, high byte first
//! buf[18..24].copy_from_slice(&[255, 0, 0, 0, 255, 0]);
//!
//! match ArtNetPacket::parse(&buf).unwrap() {
//!     ArtNetPacket::Dmx(dmx) => {
//!         assert_eq!(dmx.port_address, 3);
//!         assert_eq!(dmx.pixel_count(), 2);
//!     }
//!     ArtNetPacket::Poll(_) => unreachable!(),
//! }
//! ```

use core::net::Ipv4Addr;

/// The byteorder crate is used for reading and writing the mixed byte order fields of Art-Net.
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{
    definitions::{
        ARTDMX_DATA_INDEX, ARTDMX_LENGTH_INDEX, ARTDMX_PORT_ADDRESS_INDEX, ARTNET_HEADER, ARTNET_MIN_PACKET_LENGTH,
        ARTNET_OPCODE_INDEX, ARTNET_PORT, CHANNELS_PER_LED, POLL_REPLY_IP_INDEX, POLL_REPLY_LENGTH, POLL_REPLY_LONG_NAME_INDEX,
        POLL_REPLY_LONG_NAME_LENGTH, POLL_REPLY_PORT_INDEX, POLL_REPLY_SHORT_NAME_INDEX, POLL_REPLY_SHORT_NAME_LENGTH,
        POLL_REPLY_STATUS, POLL_REPLY_STATUS_INDEX,
    },
    node_name::NodeIdentity,
    parse_error::ParseError,
    pixel::Rgb,
    port_address::PortAddress,
};

/// The Art-Net opcodes this node knows about
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// ArtPoll, discovery request.
    Poll = 0x2000,
    /// ArtPollReply, sent by this node, never acted upon.
    PollReply = 0x2100,
    /// ArtDmx, channel data for one universe.
    Dmx = 0x5000,
    /// ArtAddress, answered like a poll.
    Address = 0x6000,
    /// ArtInput, answered like a poll.
    Input = 0x7000,
}

impl TryFrom<u16> for OpCode {
    type Error = ParseError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0x2000 => Ok(Self::Poll),
            0x2100 => Ok(Self::PollReply),
            0x5000 => Ok(Self::Dmx),
            0x6000 => Ok(Self::Address),
            0x7000 => Ok(Self::Input),
            raw => Err(ParseError::UnsupportedOpCode(raw)),
        }
    }
}

impl OpCode {
    /// True for the opcodes that are answered with a poll reply.
    pub const fn triggers_poll_reply(&self) -> bool {
        matches!(self, Self::Poll | Self::Address | Self::Input)
    }
}

/// A datagram that passed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtNetPacket<'a> {
    /// Channel data, borrowed from the receive buffer.
    Dmx(ArtDmx<'a>),

    /// A request that is answered with a poll reply.
    Poll(OpCode),
}

impl<'a> ArtNetPacket<'a> {
    /// Parse the packet from the given buffer.
    ///
    /// # Errors
    /// TooShort: Fewer than [ARTNET_MIN_PACKET_LENGTH] bytes.
    ///
    /// InvalidSignature: The buffer doesn't start with `Art-Net\0`.
    ///
    /// UnsupportedOpCode: Any opcode apart from ArtDmx, ArtPoll, ArtAddress and ArtInput.
    ///
    /// DmxHeaderTooShort / InvalidPortAddress: see [ArtDmx::parse].
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
        if buf.len() < ARTNET_MIN_PACKET_LENGTH {
            Err(ParseError::TooShort(buf.len()))?;
        }

        if buf[..ARTNET_HEADER.len()] != ARTNET_HEADER {
            Err(ParseError::InvalidSignature)?;
        }

        let opcode = LittleEndian::read_u16(&buf[ARTNET_OPCODE_INDEX..ARTNET_OPCODE_INDEX + 2]);
        match OpCode::try_from(opcode)? {
            OpCode::Dmx => Ok(ArtNetPacket::Dmx(ArtDmx::parse(buf)?)),
            op if op.triggers_poll_reply() => Ok(ArtNetPacket::Poll(op)),
            _ => Err(ParseError::UnsupportedOpCode(opcode)),
        }
    }
}

/// The fields of an ArtDmx packet this node uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtDmx<'a> {
    /// Universe the data is meant for.
    pub port_address: PortAddress,

    /// Number of channels the sender claims to have sent.
    pub declared_length: u16,

    /// Everything after the header, may be shorter or longer than `declared_length`.
    pub data: &'a [u8],
}

impl<'a> ArtDmx<'a> {
    /// Parse the ArtDmx fields of a datagram whose signature and opcode were already checked.
    ///
    /// The port-address is read low byte first, the length high byte first, as Art-Net defines them.
    ///
    /// # Errors
    /// DmxHeaderTooShort: The datagram ends before the data field.
    ///
    /// InvalidPortAddress: The reserved top bit of the port-address is set.
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
        if buf.len() < ARTDMX_DATA_INDEX {
            Err(ParseError::DmxHeaderTooShort(buf.len()))?;
        }

        let port_address = PortAddress::new(LittleEndian::read_u16(
            &buf[ARTDMX_PORT_ADDRESS_INDEX..ARTDMX_PORT_ADDRESS_INDEX + 2],
        ))?;
        let declared_length = BigEndian::read_u16(&buf[ARTDMX_LENGTH_INDEX..ARTDMX_LENGTH_INDEX + 2]);

        Ok(ArtDmx {
            port_address,
            declared_length,
            data: &buf[ARTDMX_DATA_INDEX..],
        })
    }

    /// The channels that are both declared and actually present.
    pub fn channels(&self) -> &'a [u8] {
        let len = self.data.len().min(self.declared_length as usize);
        &self.data[..len]
    }

    /// Number of complete RGB triples in [Self::channels].
    pub fn pixel_count(&self) -> usize {
        self.channels().len() / CHANNELS_PER_LED
    }

    /// The complete RGB triples in [Self::channels], a trailing partial triple is skipped.
    pub fn pixels(&self) -> impl Iterator<Item = Rgb> + 'a {
        self.channels()
            .chunks_exact(CHANNELS_PER_LED)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
    }
}

/// The reply to ArtPoll, ArtAddress and ArtInput
#[derive(Debug, Clone, Copy)]
pub struct PollReply<'a> {
    /// Address announced as the node address.
    pub ip: Ipv4Addr,

    /// Names announced in the short and long name fields.
    pub identity: &'a NodeIdentity,
}

impl PollReply<'_> {
    /// Packs the reply into a new array.
    pub fn pack_array(&self) -> [u8; POLL_REPLY_LENGTH] {
        let mut buf = [0; POLL_REPLY_LENGTH];
        self.pack_into(&mut buf);
        buf
    }

    /// Packs the reply into the given buffer.
    ///
    /// # Errors
    /// PackBufferInsufficient: The buffer is shorter than [POLL_REPLY_LENGTH].
    pub fn pack(&self, buf: &mut [u8]) -> Result<(), ParseError> {
        let len = buf.len();
        let buf: &mut [u8; POLL_REPLY_LENGTH] = buf
            .get_mut(..POLL_REPLY_LENGTH)
            .and_then(|b| b.try_into().ok())
            .ok_or(ParseError::PackBufferInsufficient(len))?;
        self.pack_into(buf);
        Ok(())
    }

    fn pack_into(&self, buf: &mut [u8; POLL_REPLY_LENGTH]) {
        buf.fill(0);

        buf[..ARTNET_HEADER.len()].copy_from_slice(&ARTNET_HEADER);
        LittleEndian::write_u16(&mut buf[ARTNET_OPCODE_INDEX..ARTNET_OPCODE_INDEX + 2], OpCode::PollReply as u16);

        buf[POLL_REPLY_IP_INDEX..POLL_REPLY_IP_INDEX + 4].copy_from_slice(&self.ip.octets());
        LittleEndian::write_u16(&mut buf[POLL_REPLY_PORT_INDEX..POLL_REPLY_PORT_INDEX + 2], ARTNET_PORT);

        buf[POLL_REPLY_STATUS_INDEX] = POLL_REPLY_STATUS;

        let mut short_name = [0; POLL_REPLY_SHORT_NAME_LENGTH];
        self.identity.write_short_name(&mut short_name);
        buf[POLL_REPLY_SHORT_NAME_INDEX..POLL_REPLY_SHORT_NAME_INDEX + POLL_REPLY_SHORT_NAME_LENGTH].copy_from_slice(&short_name);

        let mut long_name = [0; POLL_REPLY_LONG_NAME_LENGTH];
        self.identity.write_long_name(&mut long_name);
        buf[POLL_REPLY_LONG_NAME_INDEX..POLL_REPLY_LONG_NAME_INDEX + POLL_REPLY_LONG_NAME_LENGTH].copy_from_slice(&long_name);
    }
}
