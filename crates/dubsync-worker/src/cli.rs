//! Command-line interface.

use clap::{Args, Parser, Subcommand};
use dubsync_models::{Device, PadSpec};
use std::path::PathBuf;

/// Offline lip-sync dubbing worker.
#[derive(Debug, Parser)]
#[command(name = "dubsync-worker", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a dubbing job and stream JSON events to stdout
    Run(RunArgs),
    /// Report the runtime environment (toolchain, models, device)
    Check,
}

/// Arguments for one dubbing job. Flags override `DUBSYNC_*` environment
/// variables, which override the built-in defaults.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Source face video (or still image)
    #[arg(long)]
    pub face: PathBuf,

    /// Target audio track
    #[arg(long)]
    pub audio: PathBuf,

    /// Output container path
    #[arg(long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Face detector ONNX model path
    #[arg(long)]
    pub detector_model: Option<PathBuf>,

    /// Mouth generator ONNX model path
    #[arg(long)]
    pub generator_model: Option<PathBuf>,

    /// Frame rate assumed for still-image inputs
    #[arg(long)]
    pub fps: Option<f64>,

    /// Integer downscale factor applied while decoding
    #[arg(long)]
    pub resize_factor: Option<u32>,

    /// Box padding as top,bottom,left,right pixels
    #[arg(long, value_parser = parse_pads)]
    pub pads: Option<PadSpec>,

    /// Detector batch size (halved automatically on overload)
    #[arg(long)]
    pub detect_batch_size: Option<usize>,

    /// Generator batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Box smoothing window; 0 disables smoothing
    #[arg(long)]
    pub smoothing_window: Option<usize>,

    /// Inference device (cpu or cuda)
    #[arg(long)]
    pub device: Option<Device>,
}

/// Parse "top,bottom,left,right" into a pad spec.
fn parse_pads(value: &str) -> Result<PadSpec, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!(
            "expected 4 comma-separated values, got {}",
            parts.len()
        ));
    }
    let mut nums = [0i32; 4];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid pad value: {part}"))?;
    }
    Ok(PadSpec::new(nums[0], nums[1], nums[2], nums[3]))
}
