//! Capture without a window: a timer-driven loop stands in for the display
//! callback, and the gate applies the same operating rate as the preview.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use renderer::capture::CaptureController;
use renderer::{FrameSource, ParamsHandle, PixelPipeline};
use scheduler::{FrameGate, IntervalDriver, TickDriver};

use crate::cli::RunArgs;
use crate::run::Session;
use crate::sources;

pub fn capture_still(
    args: &RunArgs,
    session: Session,
    output: &Path,
    warmup: u32,
) -> Result<()> {
    let (mut pipeline, mut source, mut gate, mut driver) = build(args, &session)?;

    let ticks = warmup.max(1);
    let mut executed = 0;
    while executed < ticks {
        let Some(now) = driver.next_tick() else { break };
        if gate.try_pass(now) {
            pipeline.tick(source.as_mut())?;
            executed += 1;
        }
    }

    let bytes = pipeline.capture_still(session.config.capture.still_scale)?;
    fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(path = %output.display(), bytes = bytes.len(), "still capture written");
    Ok(())
}

pub fn record_gif(
    args: &RunArgs,
    session: Session,
    output: &Path,
    duration: Option<Duration>,
) -> Result<()> {
    let (mut pipeline, mut source, mut gate, mut driver) = build(args, &session)?;

    let duration = duration.unwrap_or(session.config.capture.gif_duration);
    let mut capture = CaptureController::new(session.rate.fps(), session.config.capture.gif_scale);
    capture.start(duration);

    loop {
        let Some(now) = driver.next_tick() else { break };
        if !gate.try_pass(now) {
            continue;
        }

        pipeline.tick(source.as_mut())?;
        if capture.is_recording() {
            let (width, height) = pipeline.output_size();
            let rgba = pipeline.read_output_rgba()?;
            capture.record_frame(&rgba, width, height);
        }

        if let Some(result) = capture.poll() {
            let bytes = result?;
            fs::write(output, &bytes)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), bytes = bytes.len(), "recording written");
            break;
        }
    }
    Ok(())
}

fn build(
    args: &RunArgs,
    session: &Session,
) -> Result<(PixelPipeline, Box<dyn FrameSource>, FrameGate, IntervalDriver)> {
    let params = ParamsHandle::new(session.initial);
    let pipeline = PixelPipeline::headless(
        (session.config.output.width, session.config.output.height),
        params,
    )?;
    let source = sources::build_source(
        args.stdin_frames,
        (session.config.source.width, session.config.source.height),
    );
    Ok((
        pipeline,
        source,
        FrameGate::new(session.rate),
        IntervalDriver::new(session.rate),
    ))
}
