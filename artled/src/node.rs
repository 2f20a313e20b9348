//! Running a complete node: the Art-Net receiver and the control port on their own threads, sharing one patch table.
//!
//! Both workers set their socket up again after a second if it fails. The node stops when a control client requests
//! a restart or a worker hits an error it can't recover from.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, RwLock, mpsc},
    thread,
    time::Duration,
};

use log::{error, info, warn};

use crate::{
    ArtledResult,
    control::ControlServer,
    definitions::{ARTNET_PORT, CONTROL_PORT},
    error::Error,
    node_name::NodeIdentity,
    patch_table::PatchTable,
    pixel::PixelSink,
    receive::ArtNetReceiver,
    settings::{Settings, SettingsStore},
};

/// The patch table as shared by the workers
pub type SharedPatchTable = Arc<RwLock<PatchTable>>;

/// Delay before a worker sets its socket up again.
pub const SETUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Exit code of the process when a restart was requested.
pub const RESTART_EXIT_CODE: u8 = 3;

/// Everything needed to start a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Address both sockets are bound to.
    pub bind_ip: IpAddr,
    /// UDP port of the Art-Net receiver.
    pub artnet_port: u16,
    /// TCP port of the control server.
    pub control_port: u16,
    /// Address announced in poll replies, see [ArtNetReceiver::bind].
    pub advertise_ip: Option<Ipv4Addr>,
    /// Names the node announces itself with.
    pub identity: NodeIdentity,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            artnet_port: ARTNET_PORT,
            control_port: CONTROL_PORT,
            advertise_ip: None,
            identity: NodeIdentity::default(),
        }
    }
}

impl NodeConfig {
    /// Address of the Art-Net receiver
    pub fn artnet_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.artnet_port)
    }

    /// Address of the control server
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.control_port)
    }
}

/// Runs a node until a restart is requested.
///
/// The table is loaded from `settings`, or the defaults are saved if there is nothing to load.
///
/// # Errors
/// [Error::PatchTableCorrupt] if a worker found the table lock poisoned.
///
/// [Error::WorkersStopped] if the workers went away without a reason.
pub fn run<S, P>(config: NodeConfig, mut settings: Settings<S>, sink: P) -> ArtledResult<()>
where
    S: SettingsStore + Send + 'static,
    P: PixelSink + Send + 'static,
{
    let table: SharedPatchTable = Arc::new(RwLock::new(settings.load_or_default()));
    let (exit_tx, exit_rx) = mpsc::channel::<ArtledResult<()>>();

    {
        let config = config.clone();
        let table = Arc::clone(&table);
        let exit_tx = exit_tx.clone();
        let mut sink = sink;
        thread::Builder::new().name("artnet".into()).spawn(move || {
            let result = retry("Art-Net receiver", || {
                ArtNetReceiver::bind(config.artnet_addr(), config.identity.clone(), config.advertise_ip)?
                    .run(&table, &mut sink)
            });
            let _ = exit_tx.send(result);
        })?;
    }

    thread::Builder::new().name("control".into()).spawn(move || {
        let result = retry("control server", || {
            ControlServer::bind(config.control_addr(), config.identity.clone())?.serve(&table, &mut settings)
        });
        let _ = exit_tx.send(result);
    })?;

    exit_rx.recv().map_err(|_| Error::WorkersStopped)?
}

/// Runs `worker` again after [SETUP_RETRY_DELAY] until it returns `Ok` or an unrecoverable error.
fn retry<F>(name: &str, mut worker: F) -> ArtledResult<()>
where
    F: FnMut() -> ArtledResult<()>,
{
    loop {
        match worker() {
            Ok(()) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!("{name} failed, setting up again in {SETUP_RETRY_DELAY:?}: {e}");
                thread::sleep(SETUP_RETRY_DELAY);
            }
            Err(e) => {
                error!("{name} stopped: {e}");
                return Err(e);
            }
        }
    }
}

/// Logs how the node ended and maps it to the exit code of the process.
pub fn exit_code(result: &ArtledResult<()>) -> u8 {
    match result {
        Ok(()) => {
            info!("Restart requested");
            RESTART_EXIT_CODE
        }
        Err(e) => {
            error!("Node failed: {e}");
            1
        }
    }
}
