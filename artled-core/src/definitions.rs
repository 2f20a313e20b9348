//! Constants used by the Art-Net receiver and the LED patch table.

/// The UDP port Art-Net traffic is received on.
pub const ARTNET_PORT: u16 = 6454;

/// The TCP port of the line based control protocol.
pub const CONTROL_PORT: u16 = 1337;

/// Every Art-Net packet starts with this signature, including the null terminator.
pub const ARTNET_HEADER: [u8; 8] = *b"Art-Net\0";

/// Datagrams shorter than this can't carry a signature and an opcode and are dropped.
pub const ARTNET_MIN_PACKET_LENGTH: usize = 10;

/// Index of the opcode field (little endian).
pub const ARTNET_OPCODE_INDEX: usize = 8;

/// Index of the port-address field of an ArtDmx packet (little endian).
pub const ARTDMX_PORT_ADDRESS_INDEX: usize = 14;

/// Index of the length field of an ArtDmx packet (big endian).
pub const ARTDMX_LENGTH_INDEX: usize = 16;

/// Index of the first DMX channel of an ArtDmx packet.
pub const ARTDMX_DATA_INDEX: usize = 18;

/// Number of DMX channels driving a single LED (red, green, blue).
pub const CHANNELS_PER_LED: usize = 3;

/// Total length of the poll reply this node sends.
pub const POLL_REPLY_LENGTH: usize = 239;

/// Index of the node IPv4 address within the poll reply.
pub const POLL_REPLY_IP_INDEX: usize = 10;

/// Index of the port field within the poll reply (little endian).
pub const POLL_REPLY_PORT_INDEX: usize = 14;

/// Index of the status byte within the poll reply.
pub const POLL_REPLY_STATUS_INDEX: usize = 23;

/// Status bits 5, 6 and 7 are set in every poll reply.
pub const POLL_REPLY_STATUS: u8 = 0b1110_0000;

/// Index of the short name field within the poll reply.
pub const POLL_REPLY_SHORT_NAME_INDEX: usize = 26;

/// Length of the short name field, including the null terminator.
pub const POLL_REPLY_SHORT_NAME_LENGTH: usize = 18;

/// Index of the long name field within the poll reply.
pub const POLL_REPLY_LONG_NAME_INDEX: usize = 44;

/// Length of the long name field, including the null terminator.
pub const POLL_REPLY_LONG_NAME_LENGTH: usize = 64;

/// Maximum number of universes that can be patched onto the strip.
pub const MAX_UNIVERSES: usize = 10;

/// Maximum number of LEDs on the strip.
pub const MAX_LEDS: usize = 600;

/// Size of the receive buffers of both the Art-Net socket and the control connection.
pub const RECEIVE_BUFFER_LENGTH: usize = 1024;
