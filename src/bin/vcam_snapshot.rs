//! vcam_snapshot - capture one JPEG from a frame source and write it to disk.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use virtual_cam::encode::JpegFrameEncoder;
use virtual_cam::stream::fetch_one_frame_with;
use virtual_cam::{create_frame_source, SourceKind, VcamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Write a single virtual camera frame as JPEG")]
struct Args {
    /// Output path.
    #[arg(long, default_value = "snapshot.jpg")]
    out: PathBuf,

    /// TOML config file.
    #[arg(long, env = "VCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Frame origin: device, dataset or screen.
    #[arg(long)]
    mode: Option<SourceKind>,

    /// Capture device: index, device node, http(s) URL or stub://name.
    #[arg(long)]
    device: Option<String>,

    /// Dataset folder.
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Dataset image index to capture.
    #[arg(long)]
    index: Option<usize>,

    /// Burn the capture time into the frame.
    #[arg(long)]
    timestamp: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = VcamConfig::load_from(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if let Some(device) = args.device {
        cfg.device.device = device;
    }
    if let Some(folder) = args.folder {
        cfg.dataset.folder = folder;
    }
    if args.timestamp {
        cfg.show_timestamp = true;
    }
    cfg.validate()?;

    let source = create_frame_source(cfg.source_config())?;
    if let Some(index) = args.index {
        source.set_next_frame_index(index)?;
    }
    let encoder = JpegFrameEncoder::new(cfg.jpeg_quality)?;
    let jpeg = fetch_one_frame_with(&source, &encoder)
        .ok_or_else(|| anyhow!("no {} frame available", source.kind()))?;
    std::fs::write(&args.out, &jpeg)
        .with_context(|| format!("write {}", args.out.display()))?;
    log::info!("wrote {} bytes to {}", jpeg.len(), args.out.display());
    Ok(())
}
