//! The line based TCP control port.
//!
//! A client is greeted with the node's banner and the current state report. Every line it sends is parsed into a
//! [Command], applied to the shared table, saved if needed and answered with the new state report.
//!
//! Only one client is served at a time, further connections wait in the listen backlog.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener},
    sync::RwLock,
};

use log::{debug, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::{
    ArtledResult,
    command::Command,
    definitions::RECEIVE_BUFFER_LENGTH,
    error::Error,
    node_name::NodeIdentity,
    patch_table::PatchTable,
    settings::{Settings, SettingsStore},
};

/// Pending connections the listener queues while a session is served.
pub const LISTEN_BACKLOG: i32 = 128;

/// Why a session ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection.
    Disconnected,
    /// A command changed the table in a way that needs a restart. The change has been saved.
    Restart,
}

/// Serves a single client until it disconnects or requests a restart.
///
/// Lines are cut off after [RECEIVE_BUFFER_LENGTH] bytes, the rest of a longer line is discarded. Neither the table
/// lock nor the settings are touched while writing to the client.
///
/// # Errors
/// [Error::Io] if reading from the client failed.
///
/// [Error::ControlWrite] if writing to the client failed.
///
/// [Error::PatchTableCorrupt] if the table lock has been poisoned.
pub fn run_session<R, W, S>(
    mut reader: R,
    writer: &mut W,
    table: &RwLock<PatchTable>,
    settings: &mut Settings<S>,
    identity: &NodeIdentity,
) -> ArtledResult<SessionEnd>
where
    R: BufRead,
    W: Write,
    S: SettingsStore,
{
    let snapshot = table.read().map_err(|e| Error::poisoned("control session", e))?.clone();
    send(writer, &identity.banner().to_string())?;
    send(writer, &snapshot.render_text())?;

    let mut line = Vec::with_capacity(RECEIVE_BUFFER_LENGTH);
    loop {
        line.clear();
        let read = (&mut reader)
            .take(RECEIVE_BUFFER_LENGTH as u64)
            .read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(SessionEnd::Disconnected);
        }
        if line.last() != Some(&b'\n') && read == RECEIVE_BUFFER_LENGTH {
            skip_line(&mut reader)?;
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\r', '\n']);
        let command = Command::parse(text);
        debug!("Control command {command:?}");

        let (outcome, snapshot) = {
            let mut table = table.write().map_err(|e| Error::poisoned("control session", e))?;
            let outcome = command.apply(&mut table);
            (outcome, table.clone())
        };

        if outcome.persists() {
            if let Err(e) = settings.save(&snapshot) {
                warn!("Failed to save settings: {e}");
            }
        }

        send(writer, &snapshot.render_text())?;

        if outcome.restarts() {
            info!("{text:?} needs a restart");
            return Ok(SessionEnd::Restart);
        }
    }
}

/// Discards everything up to and including the next newline.
fn skip_line<R: BufRead>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }

        match buf.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

fn send<W: Write>(writer: &mut W, text: &str) -> ArtledResult<()> {
    writer.write_all(text.as_bytes()).map_err(Error::ControlWrite)?;
    writer.flush().map_err(Error::ControlWrite)
}

/// A bound control port
#[derive(Debug)]
pub struct ControlServer {
    listener: TcpListener,
    identity: NodeIdentity,
}

impl ControlServer {
    /// Binds to `addr` with address reuse enabled.
    pub fn bind(addr: SocketAddr, identity: NodeIdentity) -> ArtledResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(LISTEN_BACKLOG)?;

        let listener = TcpListener::from(socket);
        info!("Control port listening on {}", listener.local_addr()?);

        Ok(Self { listener, identity })
    }

    /// The address the listener is bound to
    pub fn local_addr(&self) -> ArtledResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts and serves clients one after another.
    ///
    /// Returns once a client requested a restart. Sessions that fail on their connection are logged and the next client
    /// is accepted.
    ///
    /// # Errors
    /// [Error::Io] if accepting failed.
    ///
    /// [Error::PatchTableCorrupt] if the table lock has been poisoned.
    pub fn serve<S: SettingsStore>(&self, table: &RwLock<PatchTable>, settings: &mut Settings<S>) -> ArtledResult<()> {
        loop {
            let (mut stream, peer) = self.listener.accept()?;
            info!("Control client {peer} connected");

            let reader = BufReader::new(stream.try_clone()?);
            match run_session(reader, &mut stream, table, settings, &self.identity) {
                Ok(SessionEnd::Disconnected) => info!("Control client {peer} disconnected"),
                Ok(SessionEnd::Restart) => return Ok(()),
                Err(e) if e.is_recoverable() => warn!("Control session with {peer} failed: {e}"),
                Err(e) => return Err(e),
            }
        }
    }
}
