//! artled, an Art-Net node driving a strip of RGB LEDs
//!
//! Exits with code 3 after a control client changed a setting that needs a restart, a supervisor is expected to start
//! it again. Set `RUST_LOG=debug` for per-command and frame logging.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::Context;
use artled::{
    definitions::{ARTNET_PORT, CONTROL_PORT},
    node::{self, NodeConfig},
    node_name::NodeIdentity,
    pixel::{PixelBuffer, PixelSink, Rgb},
    settings::{FileStore, Settings},
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Art-Net node driving a strip of RGB LEDs")]
struct Cli {
    /// Address the Art-Net and control sockets are bound to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, default_value_t = ARTNET_PORT)]
    artnet_port: u16,

    #[arg(long, default_value_t = CONTROL_PORT)]
    control_port: u16,

    /// JSON file the patch table is saved to
    #[arg(long, default_value = "artled-settings.json")]
    settings: PathBuf,

    /// Address announced in poll replies, defaults to the address the poll was received on
    #[arg(long)]
    advertise_ip: Option<Ipv4Addr>,

    #[arg(long, default_value = NodeIdentity::DEFAULT_LONG_NAME)]
    long_name: String,

    #[arg(long, default_value = NodeIdentity::DEFAULT_SHORT_NAME)]
    short_name: String,

    #[arg(long, default_value = NodeIdentity::DEFAULT_SERIAL)]
    serial: String,

    #[arg(long, default_value = NodeIdentity::DEFAULT_FIRMWARE_VERSION)]
    fw_version: String,
}

impl Cli {
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let identity = NodeIdentity::new(&self.long_name, &self.short_name, &self.serial, &self.fw_version)
            .context("invalid node name")?;

        Ok(NodeConfig {
            bind_ip: self.bind,
            artnet_port: self.artnet_port,
            control_port: self.control_port,
            advertise_ip: self.advertise_ip,
            identity,
        })
    }
}

/// Keeps the strip in memory and logs the frame rate, standing in for an LED driver.
struct FrameLogger {
    pixels: PixelBuffer,
    reported_frames: u32,
    reported_at: Instant,
}

impl FrameLogger {
    const REPORT_INTERVAL: Duration = Duration::from_secs(5);

    fn new() -> Self {
        Self {
            pixels: PixelBuffer::new(),
            reported_frames: 0,
            reported_at: Instant::now(),
        }
    }
}

impl PixelSink for FrameLogger {
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        self.pixels.set_pixel(index, color);
    }

    fn universe_complete(&mut self, slot: usize) {
        self.pixels.universe_complete(slot);

        let elapsed = self.reported_at.elapsed();
        if slot == 0 && elapsed >= Self::REPORT_INTERVAL {
            let frames = self.pixels.frames().wrapping_sub(self.reported_frames);
            log::debug!(
                "{:.1} frames/s, first LED {:?}",
                frames as f64 / elapsed.as_secs_f64(),
                self.pixels.get(0).unwrap_or_default()
            );
            self.reported_frames = self.pixels.frames();
            self.reported_at = Instant::now();
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = cli.node_config()?;
    log::info!("Starting {} {}", config.identity.long_name, config.identity.serial);

    let store = FileStore::open(&cli.settings).with_context(|| format!("opening {}", cli.settings.display()))?;
    let result = node::run(config, Settings::new(store), FrameLogger::new());

    Ok(ExitCode::from(node::exit_code(&result)))
}
