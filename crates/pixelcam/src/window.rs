//! Interactive preview: a winit window presents the pipeline output and the
//! keyboard adjusts render parameters.
//!
//! Keys: arrows = brightness/contrast, D = dither, P = next palette,
//! E = echo mode, Z/X = echo decay, S = save a still, G = record a GIF.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use presets::PresetLibrary;
use renderer::capture::CaptureController;
use renderer::{EchoMode, FrameSource, ParamsHandle, PixelPipeline};
use scheduler::FrameGate;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, StartCause, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::cli::RunArgs;
use crate::run::Session;
use crate::sources;

pub fn run_preview(args: &RunArgs, session: Session) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let scale = args.window_scale.max(1);
    let output_size = (session.config.output.width, session.config.output.height);
    let window_size = PhysicalSize::new(output_size.0 * scale, output_size.1 * scale);
    let window = WindowBuilder::new()
        .with_title("pixelcam")
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create preview window")?;
    let window = Arc::new(window);

    let params = ParamsHandle::new(session.initial);
    let mut pipeline =
        PixelPipeline::new(window.as_ref(), window_size, output_size, params.clone())?;
    let mut source: Box<dyn FrameSource> = sources::build_source(
        args.stdin_frames,
        (session.config.source.width, session.config.source.height),
    );
    let mut gate = FrameGate::new(session.rate);
    let mut capture = CaptureController::new(session.rate.fps(), session.config.capture.gif_scale);
    let mut library = session.library.clone();
    let still_scale = session.config.capture.still_scale;
    let gif_duration = session.config.capture.gif_duration;
    let mut next_deadline = Instant::now();

    window.request_redraw();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::WaitUntil(next_deadline));

            match event {
                Event::NewEvents(StartCause::ResumeTimeReached { .. }) => {
                    window.request_redraw();
                }
                Event::WindowEvent { window_id, event } if window_id == window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                            pipeline.dispose();
                            elwt.exit();
                        }
                        WindowEvent::Resized(new_size) => {
                            pipeline.resize_surface(new_size);
                        }
                        WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    physical_key: PhysicalKey::Code(code),
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        } => {
                            handle_key(
                                code,
                                &params,
                                &mut library,
                                &mut capture,
                                &mut pipeline,
                                still_scale,
                                gif_duration,
                            );
                        }
                        WindowEvent::RedrawRequested => {
                            if gate.try_pass(Instant::now()) {
                                if let Err(err) = pipeline.tick(source.as_mut()) {
                                    tracing::error!(error = %err, "tick failed");
                                }
                                drive_capture(&mut capture, &mut pipeline);
                            }
                            next_deadline = Instant::now() + gate.interval();
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))
}

fn handle_key(
    code: KeyCode,
    params: &ParamsHandle,
    library: &mut PresetLibrary,
    capture: &mut CaptureController,
    pipeline: &mut PixelPipeline,
    still_scale: u32,
    gif_duration: Duration,
) {
    match code {
        KeyCode::ArrowUp => params.apply(|p| p.brightness = (p.brightness + 0.05).min(1.0)),
        KeyCode::ArrowDown => params.apply(|p| p.brightness = (p.brightness - 0.05).max(-1.0)),
        KeyCode::ArrowRight => params.apply(|p| p.contrast = (p.contrast + 0.05).min(4.0)),
        KeyCode::ArrowLeft => params.apply(|p| p.contrast = (p.contrast - 0.05).max(0.0)),
        KeyCode::KeyD => params.apply(|p| {
            p.dither = !p.dither;
            tracing::info!(dither = p.dither, "dither toggled");
        }),
        KeyCode::KeyP => {
            let preset = library.select_next();
            tracing::info!(palette = %preset.id, "palette changed");
            let palette = preset.palette;
            params.apply(|p| p.palette = palette);
        }
        KeyCode::KeyE => params.apply(|p| {
            p.echo_mode = match p.echo_mode {
                EchoMode::Off => EchoMode::Before,
                EchoMode::Before => EchoMode::After,
                EchoMode::After => EchoMode::Off,
            };
            tracing::info!(mode = %p.echo_mode, "echo mode changed");
        }),
        KeyCode::KeyZ => params.apply(|p| {
            let decay = p.echo_decay - 0.05;
            p.set_echo_decay(decay);
        }),
        KeyCode::KeyX => params.apply(|p| {
            let decay = p.echo_decay + 0.05;
            p.set_echo_decay(decay);
        }),
        KeyCode::KeyS => match pipeline.capture_still(still_scale) {
            Ok(bytes) => write_artifact("png", &bytes),
            Err(err) => tracing::error!(error = %err, "still capture failed"),
        },
        KeyCode::KeyG => {
            capture.start(gif_duration);
        }
        _ => {}
    }
}

fn drive_capture(capture: &mut CaptureController, pipeline: &mut PixelPipeline) {
    if capture.is_recording() {
        let (width, height) = pipeline.output_size();
        match pipeline.read_output_rgba() {
            Ok(rgba) => capture.record_frame(&rgba, width, height),
            Err(err) => tracing::warn!(error = %err, "skipping recording frame"),
        }
    }
    if let Some(result) = capture.poll() {
        match result {
            Ok(bytes) => write_artifact("gif", &bytes),
            Err(err) => tracing::error!(error = %err, "GIF encoding failed"),
        }
    }
}

fn write_artifact(extension: &str, bytes: &[u8]) {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let path = format!("pixelcam-{stamp}.{extension}");
    match fs::write(&path, bytes) {
        Ok(()) => tracing::info!(path, bytes = bytes.len(), "capture written"),
        Err(err) => tracing::error!(path, error = %err, "failed to write capture"),
    }
}
