//! vcamd - virtual camera daemon
//!
//! Opens one frame source and serves it over HTTP until Ctrl-C:
//! `/video_feed` streams MJPEG, `/snapshot` returns a single JPEG and
//! `/control/*` toggles capture, timestamps and dataset playback.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use virtual_cam::{create_frame_source, ServerConfig, SourceKind, StreamServer, VcamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve a virtual camera as an MJPEG stream")]
struct Args {
    /// TOML config file. Command line flags override its values.
    #[arg(long, env = "VCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address.
    #[arg(long)]
    addr: Option<String>,

    /// Frame origin: device, dataset or screen.
    #[arg(long)]
    mode: Option<SourceKind>,

    /// Capture device: index, device node, http(s) URL or stub://name.
    #[arg(long)]
    device: Option<String>,

    /// Dataset folder.
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Dataset file name prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// Dataset file extension, without the dot.
    #[arg(long)]
    ext: Option<String>,

    /// Dataset cycle length; 0 disables cycling and repeats the current image.
    #[arg(long)]
    cycle: Option<usize>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Burn the capture time into each frame.
    #[arg(long)]
    timestamp: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = VcamConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        cfg.addr = addr;
    }
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if let Some(device) = args.device {
        cfg.device.device = device;
    }
    if let Some(folder) = args.folder {
        cfg.dataset.folder = folder;
    }
    if let Some(prefix) = args.prefix {
        cfg.dataset.prefix = prefix;
    }
    if let Some(ext) = args.ext {
        cfg.dataset.extension = ext;
    }
    if let Some(cycle) = args.cycle {
        cfg.dataset.cycle_length = cycle;
    }
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }
    if args.timestamp {
        cfg.show_timestamp = true;
    }
    cfg.validate()?;

    // An unopenable source still gets a server; its streams are empty.
    let source = create_frame_source(cfg.source_config()).ok();
    if source.is_none() {
        log::warn!("serving without a frame source");
    }

    let server_config = ServerConfig {
        addr: cfg.addr.clone(),
        jpeg_quality: cfg.jpeg_quality,
    };
    let handle = StreamServer::new(server_config, source.clone()).spawn()?;
    log::info!(
        "vcamd serving {} frames at {} fps on http://{}/video_feed",
        cfg.mode,
        cfg.fps,
        handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let _ = rx.recv();
    log::info!("shutdown signal received, stopping streams...");
    if let Some(source) = &source {
        source.stop();
    }
    handle.stop()?;
    Ok(())
}
