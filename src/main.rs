//! `pipevisor` command line: runs one stream profile under the lifecycle supervisor.
//!
//! ```text
//! pipevisor sender 192.168.1.10 --port 5600
//! pipevisor receiver --port 5600 --payload 96 --codec h265
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`). The process id is written to a
//! well-known file so helper scripts can signal it.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipevisor::{
    BackoffPolicy, Codec, Config, ConfigError, DEFAULT_PAYLOAD_TYPE, DEFAULT_PORT, LogWriter,
    ReceiverConfig, Request, SenderConfig, SharedStatus, SignalBindings, SignalBridge,
    StreamProfile, Subscribe, SupervisorBuilder, SysfsLed,
};

#[derive(Parser, Debug)]
#[command(name = "pipevisor")]
#[command(version, about = "Supervise a camera sender or RTP viewer pipeline", long_about = None)]
struct Args {
    #[command(subcommand)]
    profile: ProfileArgs,

    /// Backing file of the shared recording-status flag
    #[arg(long, global = true, value_name = "PATH")]
    status_path: Option<PathBuf>,

    /// File naming the mount point of removable storage
    #[arg(long, global = true, value_name = "PATH")]
    mount_helper: Option<PathBuf>,

    /// GPIO `value` file of the recording LED
    #[arg(long, global = true, value_name = "PATH")]
    led_path: Option<PathBuf>,

    /// Override the PID file location
    #[arg(long, global = true, value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Request bound to SIGUSR1 (defaults depend on the profile)
    #[arg(long, global = true, value_enum)]
    usr1: Option<SignalAction>,

    /// Request bound to SIGUSR2 (defaults depend on the profile)
    #[arg(long, global = true, value_enum)]
    usr2: Option<SignalAction>,

    /// Watchdog check interval in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    watchdog_ms: Option<u64>,

    /// Frame age that counts as a stall, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    stall_ms: Option<u64>,

    /// Delay before retrying a failed build, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    retry_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ProfileArgs {
    /// Capture the camera, encode H.264 and send it over RTP/UDP
    Sender {
        /// Destination address
        address: IpAddr,

        #[arg(short, long, default_value_t = u32::from(DEFAULT_PORT))]
        port: u32,

        /// Capture device
        #[arg(long, default_value = "/dev/video0")]
        device: PathBuf,
    },
    /// Receive RTP/UDP and display it; SIGUSR1 toggles recording by default
    Receiver {
        #[arg(short, long, default_value_t = u32::from(DEFAULT_PORT))]
        port: u32,

        /// RTP payload type
        #[arg(long, default_value_t = u32::from(DEFAULT_PAYLOAD_TYPE))]
        payload: u32,

        #[arg(long, value_enum, default_value_t = CodecArg::H264)]
        codec: CodecArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
    H264,
    H265,
}

impl From<CodecArg> for Codec {
    fn from(c: CodecArg) -> Self {
        match c {
            CodecArg::H264 => Codec::H264,
            CodecArg::H265 => Codec::H265,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SignalAction {
    Restart,
    Stop,
    ToggleRecording,
}

impl From<SignalAction> for Request {
    fn from(a: SignalAction) -> Self {
        match a {
            SignalAction::Restart => Request::Restart,
            SignalAction::Stop => Request::Stop,
            SignalAction::ToggleRecording => Request::ToggleRecording,
        }
    }
}

fn port(raw: u32) -> Result<u16, ConfigError> {
    match u16::try_from(raw) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ConfigError::Port(raw)),
    }
}

fn payload_type(raw: u32) -> Result<u8, ConfigError> {
    match u8::try_from(raw) {
        Ok(pt) if pt <= 127 => Ok(pt),
        _ => Err(ConfigError::PayloadType(raw)),
    }
}

impl ProfileArgs {
    fn into_profile(self) -> Result<StreamProfile, ConfigError> {
        Ok(match self {
            ProfileArgs::Sender {
                address,
                port: p,
                device,
            } => StreamProfile::Sender(SenderConfig {
                address,
                port: port(p)?,
                device,
            }),
            ProfileArgs::Receiver {
                port: p,
                payload,
                codec,
            } => StreamProfile::Receiver(ReceiverConfig {
                port: port(p)?,
                payload_type: payload_type(payload)?,
                codec: codec.into(),
            }),
        })
    }
}

fn default_pid_file(profile: &StreamProfile) -> PathBuf {
    match profile {
        StreamProfile::Sender(_) => PathBuf::from("/tmp/camera-stream.pid"),
        StreamProfile::Receiver(_) => PathBuf::from("/tmp/stream-viewer.pid"),
    }
}

fn config_from(args: &Args) -> Config {
    let mut cfg = Config::default();
    if let Some(p) = &args.status_path {
        cfg.status_path = p.clone();
    }
    if let Some(p) = &args.mount_helper {
        cfg.mount_helper_path = p.clone();
    }
    if let Some(ms) = args.watchdog_ms {
        cfg.watchdog_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.stall_ms {
        cfg.stall_threshold = Duration::from_millis(ms);
    }
    if let Some(ms) = args.retry_ms {
        cfg.retry = BackoffPolicy::fixed(Duration::from_millis(ms));
    }
    cfg
}

#[cfg(feature = "gst")]
fn backend() -> Result<pipevisor::pipeline::gst::GstBackend> {
    pipevisor::pipeline::gst::GstBackend::new().context("gstreamer initialization failed")
}

#[cfg(not(feature = "gst"))]
fn backend() -> Result<pipevisor::pipeline::sim::SimBackend> {
    warn!("built without the `gst` feature; running the simulated backend");
    let (backend, _ctl) = pipevisor::pipeline::sim::SimBackend::new();
    Ok(backend)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = config_from(&args);
    let led = args.led_path.clone();
    let pid_path = args.pid_file.clone();
    let (usr1, usr2) = (args.usr1, args.usr2);
    let profile = args.profile.into_profile()?;

    let pid_path = pid_path.unwrap_or_else(|| default_pid_file(&profile));
    let pid = pipevisor::pidfile::write_pid(&pid_path)
        .with_context(|| format!("cannot write pid file {}", pid_path.display()))?;
    info!(pid, path = %pid_path.display(), profile = profile.name(), "starting");

    let mut bindings = SignalBindings::for_profile(&profile);
    if let Some(a) = usr1 {
        bindings.usr1 = a.into();
    }
    if let Some(a) = usr2 {
        bindings.usr2 = a.into();
    }

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut builder = SupervisorBuilder::new(cfg.clone(), profile).with_subscribers(subs);
    match SharedStatus::open(&cfg.status_path) {
        Ok(status) => builder = builder.with_status_region(status),
        Err(e) => warn!(error = %e, "recording status flag disabled"),
    }
    if let Some(path) = led {
        builder = builder.with_indicator(SysfsLed::new(path));
    }

    let (sup, handle) = builder.build(backend()?)?;

    let token = CancellationToken::new();
    let signals = SignalBridge::new(handle.clone(), bindings).spawn(token.clone())?;

    handle.start();
    sup.run().await;

    token.cancel();
    let _ = signals.await;
    info!("stopped");
    Ok(())
}
