use std::path::PathBuf;
use std::time::Duration;

use camconfig::EchoSetting;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pixelcam",
    author,
    version,
    about = "Live-video pixel-art renderer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON palette preset file (built-in presets when omitted).
    #[arg(long, value_name = "PATH")]
    pub presets: Option<PathBuf>,

    /// Output grid resolution (e.g. `128x112`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Operating rate in frames per second.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Palette preset id (see the `palettes` subcommand).
    #[arg(long, value_name = "ID")]
    pub palette: Option<String>,

    /// Echo trail placement: `off`, `before`, or `after`.
    #[arg(long, value_name = "MODE", value_parser = parse_echo)]
    pub echo: Option<EchoSetting>,

    /// Echo decay factor in [0, 1].
    #[arg(long, value_name = "DECAY")]
    pub echo_decay: Option<f32>,

    /// Read raw RGB24 frames from stdin at the given resolution instead of
    /// rendering the synthetic test pattern. Pair with e.g.
    /// `ffmpeg -i /dev/video0 -f rawvideo -pix_fmt rgb24 -`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub stdin_frames: Option<(u32, u32)>,

    /// Preview window scale relative to the output grid.
    #[arg(long, value_name = "FACTOR", default_value_t = 4)]
    pub window_scale: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a still capture to a PNG file without opening a window.
    Still {
        /// Destination file.
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Ticks to run before capturing (lets echo trails build up).
        #[arg(long, value_name = "COUNT", default_value_t = 1)]
        warmup: u32,
    },
    /// Record a looping GIF without opening a window.
    Record {
        /// Destination file.
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,

        /// Recording length (e.g. `5s`); defaults to the configured value.
        #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
    },
    /// List the available palette presets.
    Palettes,
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid width '{w}': {err}"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid height '{h}': {err}"))?;
    if width == 0 || height == 0 {
        return Err(format!("resolution must be non-zero, got '{raw}'"));
    }
    Ok((width, height))
}

fn parse_echo(raw: &str) -> Result<EchoSetting, String> {
    raw.parse()
}
