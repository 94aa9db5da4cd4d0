use anyhow::{Context, Result};
use camconfig::{CamConfig, EchoSetting};
use presets::PresetLibrary;
use renderer::{EchoMode, RenderParams};
use scheduler::TargetRate;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::{headless, window};

/// Everything resolved from the config file, preset file, and CLI overrides.
pub struct Session {
    pub config: CamConfig,
    pub library: PresetLibrary,
    pub initial: RenderParams,
    pub rate: TargetRate,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();

    let session = build_session(&cli)?;
    match cli.command {
        Some(Command::Palettes) => {
            for preset in session.library.iter() {
                println!("{:<12} {:<12} {:?}", preset.id, preset.name, preset.palette.to_rgb8());
            }
            Ok(())
        }
        Some(Command::Still { output, warmup }) => {
            headless::capture_still(&cli.run, session, &output, warmup)
        }
        Some(Command::Record { output, duration }) => {
            headless::record_gif(&cli.run, session, &output, duration)
        }
        None => window::run_preview(&cli.run, session),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_session(cli: &Cli) -> Result<Session> {
    let mut config = match &cli.run.config {
        Some(path) => CamConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CamConfig::default(),
    };

    if let Some((width, height)) = cli.run.size {
        config.output.width = width;
        config.output.height = height;
    }
    if let Some(fps) = cli.run.fps {
        config.fps = fps;
    }
    if let Some(echo) = cli.run.echo {
        config.controls.echo = echo;
    }
    if let Some(decay) = cli.run.echo_decay {
        config.controls.echo_decay = decay;
    }
    if let Some(palette) = &cli.run.palette {
        config.controls.palette = Some(palette.clone());
    }
    config
        .validate()
        .context("configuration rejected after applying command-line overrides")?;

    let presets_path = cli.run.presets.clone().or_else(|| config.presets.clone());
    let mut library = match &presets_path {
        Some(path) => PresetLibrary::load(path)
            .with_context(|| format!("failed to load presets {}", path.display()))?,
        None => PresetLibrary::builtin(),
    };
    if let Some(id) = &config.controls.palette {
        library
            .select(id)
            .with_context(|| format!("palette '{id}' not found"))?;
    }

    let rate = TargetRate::new(config.fps).context("invalid operating rate")?;

    let initial = RenderParams {
        brightness: config.controls.brightness,
        contrast: config.controls.contrast,
        dither: config.controls.dither,
        echo_mode: echo_mode(config.controls.echo),
        echo_decay: config.controls.echo_decay,
        palette: library.active().palette,
    };

    Ok(Session {
        config,
        library,
        initial,
        rate,
    })
}

fn echo_mode(setting: EchoSetting) -> EchoMode {
    match setting {
        EchoSetting::Off => EchoMode::Off,
        EchoSetting::Before => EchoMode::Before,
        EchoSetting::After => EchoMode::After,
    }
}
