//! The Art-Net side of the node.
//!
//! Every datagram received on the Art-Net port is handed to [handle_datagram], which routes ArtDmx data through the
//! shared [PatchTable] into a [PixelSink]. Polls are answered with a [PollReply] by the [ArtNetReceiver].

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    sync::RwLock,
    time::Duration,
};

use log::{debug, info, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::{
    ArtledResult,
    definitions::RECEIVE_BUFFER_LENGTH,
    error::Error,
    node_name::NodeIdentity,
    packet::{ArtNetPacket, OpCode, PollReply},
    patch_table::PatchTable,
    pixel::PixelSink,
    port_address::PortAddress,
};

/// What happened to a datagram that passed validation
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reception {
    /// ArtDmx data was copied onto the LEDs of `slot`.
    Routed {
        /// Slot the universe is patched to
        slot: usize,
        /// Number of LEDs set
        pixels: usize,
    },

    /// ArtDmx data for a universe that isn't patched, nothing was set.
    Unpatched(PortAddress),

    /// A request that has to be answered with a poll reply.
    Poll(OpCode),
}

/// Parses a datagram and routes its data into `sink`.
///
/// The read lock on `table` is held for the lookup and copy only.
///
/// # Errors
/// [Error::Parse] for datagrams that are dropped.
///
/// [Error::PatchTableCorrupt] if the lock has been poisoned.
pub fn handle_datagram<S: PixelSink>(buf: &[u8], table: &RwLock<PatchTable>, sink: &mut S) -> ArtledResult<Reception> {
    match ArtNetPacket::parse(buf)? {
        ArtNetPacket::Dmx(dmx) => {
            let table = table.read().map_err(|e| Error::poisoned("art-net receiver", e))?;
            Ok(match table.route_dmx(&dmx, sink) {
                Some((slot, pixels)) => Reception::Routed { slot, pixels },
                None => Reception::Unpatched(dmx.port_address),
            })
        }
        ArtNetPacket::Poll(opcode) => Ok(Reception::Poll(opcode)),
    }
}

/// A bound Art-Net socket
#[derive(Debug)]
pub struct ArtNetReceiver {
    socket: UdpSocket,
    identity: NodeIdentity,
    advertise_ip: Option<Ipv4Addr>,
    buf: [u8; RECEIVE_BUFFER_LENGTH],
}

impl ArtNetReceiver {
    /// Binds to `addr` with address reuse and broadcast reception enabled.
    ///
    /// `advertise_ip` is put into poll replies, if it is `None` the address the sender is reached through is used.
    pub fn bind(addr: SocketAddr, identity: NodeIdentity, advertise_ip: Option<Ipv4Addr>) -> ArtledResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&SockAddr::from(addr))?;

        let socket = UdpSocket::from(socket);
        info!("Art-Net receiver listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            identity,
            advertise_ip,
            buf: [0; RECEIVE_BUFFER_LENGTH],
        })
    }

    /// The address the socket is bound to
    pub fn local_addr(&self) -> ArtledResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sets how long [Self::recv_once] blocks, `None` blocks until a datagram arrives.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> ArtledResult<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Receives and handles a single datagram.
    ///
    /// Polls are answered before returning.
    ///
    /// # Errors
    /// [Error::Io] if receiving failed, including a read timeout.
    ///
    /// [Error::Parse] if the datagram was dropped.
    ///
    /// [Error::SendPollReply] if a reply couldn't be sent.
    pub fn recv_once<S: PixelSink>(&mut self, table: &RwLock<PatchTable>, sink: &mut S) -> ArtledResult<Reception> {
        let (len, peer) = self.socket.recv_from(&mut self.buf)?;
        let reception = handle_datagram(&self.buf[..len], table, sink)?;

        match reception {
            Reception::Routed { slot, pixels } => trace!("Set {pixels} LEDs of slot {slot} from {peer}"),
            Reception::Unpatched(universe) => trace!("Universe {universe} from {peer} is not patched"),
            Reception::Poll(opcode) => {
                debug!("Answering {opcode:?} from {peer}");
                self.send_poll_reply(peer)?;
            }
        }

        Ok(reception)
    }

    /// Receives until the socket fails.
    ///
    /// Dropped datagrams and replies that couldn't be sent are logged and skipped, they never end the loop.
    ///
    /// # Errors
    /// [Error::Io] if receiving failed.
    ///
    /// [Error::PatchTableCorrupt] if the table lock has been poisoned.
    pub fn run<S: PixelSink>(&mut self, table: &RwLock<PatchTable>, sink: &mut S) -> ArtledResult<()> {
        loop {
            skip_datagram_errors(self.recv_once(table, sink))?;
        }
    }

    fn send_poll_reply(&self, peer: SocketAddr) -> ArtledResult<()> {
        let reply = PollReply {
            ip: self.reply_ip(peer),
            identity: &self.identity,
        };

        self.socket
            .send_to(&reply.pack_array(), peer)
            .map_err(Error::SendPollReply)?;
        Ok(())
    }

    /// The address announced to `peer`.
    fn reply_ip(&self, peer: SocketAddr) -> Ipv4Addr {
        if let Some(ip) = self.advertise_ip {
            return ip;
        }

        match self.socket.local_addr() {
            Ok(SocketAddr::V4(local)) if !local.ip().is_unspecified() => *local.ip(),
            _ => route_ip(peer).unwrap_or(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// Swallows the errors caused by a single datagram, everything else is passed on.
fn skip_datagram_errors(result: ArtledResult<Reception>) -> ArtledResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(Error::Parse(e)) => {
            trace!("Dropped datagram: {e}");
            Ok(())
        }
        Err(Error::SendPollReply(e)) => {
            debug!("Failed to send poll reply: {e}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// The local address packets to `peer` are sent from, found by connecting an unbound socket.
fn route_ip(peer: SocketAddr) -> io::Result<Ipv4Addr> {
    let route = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    route.connect(peer)?;
    match route.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => ip
            .to_ipv4_mapped()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "no IPv4 route to peer")),
    }
}
