//! Still and animated capture of the rendered output.
//!
//! The pipeline hands this module already-read-back RGBA buffers; nothing
//! here touches rendering state. Stills are upscaled and PNG-encoded inline.
//! Animated captures run a small state machine (`Idle -> Recording ->
//! Encoding -> Idle`); the GIF encode itself happens on a worker thread that
//! owns its frames by value, so recording never stalls the render loop.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, TryRecvError};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame as AnimationFrame, ImageEncoder, RgbaImage};

/// Integer nearest-neighbor upscale, preserving hard pixel edges.
pub fn upscale_nearest(rgba: &[u8], width: u32, height: u32, factor: u32) -> Vec<u8> {
    if factor <= 1 {
        return rgba.to_vec();
    }
    let (w, h, f) = (width as usize, height as usize, factor as usize);
    let out_row_bytes = w * f * 4;
    let mut out = vec![0u8; out_row_bytes * h * f];
    let mut row = vec![0u8; out_row_bytes];
    for y in 0..h {
        let src_row = &rgba[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let px = &src_row[x * 4..x * 4 + 4];
            for repeat in 0..f {
                let dst = (x * f + repeat) * 4;
                row[dst..dst + 4].copy_from_slice(px);
            }
        }
        for repeat in 0..f {
            let dst = (y * f + repeat) * out_row_bytes;
            out[dst..dst + out_row_bytes].copy_from_slice(&row);
        }
    }
    out
}

/// Encodes an RGBA buffer as a PNG, returning the file bytes.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut out);
    encoder
        .write_image(rgba, width, height, image::ExtendedColorType::Rgba8)
        .context("failed to encode PNG")?;
    Ok(out)
}

fn encode_gif(
    frames: Vec<Vec<u8>>,
    width: u32,
    height: u32,
    frame_delay: Duration,
) -> Result<Vec<u8>> {
    if frames.is_empty() {
        bail!("no frames recorded");
    }
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut out, 10);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("failed to mark GIF as looping")?;
        for pixels in frames {
            let buffer = RgbaImage::from_raw(width, height, pixels)
                .ok_or_else(|| anyhow!("recorded frame does not match {width}x{height}"))?;
            let frame = AnimationFrame::from_parts(
                buffer,
                0,
                0,
                Delay::from_saturating_duration(frame_delay),
            );
            encoder
                .encode_frame(frame)
                .context("failed to encode GIF frame")?;
        }
    }
    Ok(out)
}

struct GifJob {
    receiver: Receiver<Result<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
}

impl GifJob {
    fn spawn(
        frames: Vec<Vec<u8>>,
        width: u32,
        height: u32,
        frame_delay: Duration,
    ) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let worker = thread::Builder::new()
            .name("pixelcam-gif-encoder".into())
            .spawn(move || {
                let result = encode_gif(frames, width, height, frame_delay);
                let _ = sender.send(result);
            })
            .context("failed to spawn GIF encoder thread")?;
        Ok(Self {
            receiver,
            worker: Some(worker),
        })
    }

    fn try_result(&mut self) -> Option<Result<Vec<u8>>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                if let Some(worker) = self.worker.take() {
                    let _ = worker.join();
                }
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.worker.take();
                Some(Err(anyhow!("GIF encoder thread died before finishing")))
            }
        }
    }
}

enum CaptureState {
    Idle,
    Recording {
        frames: Vec<Vec<u8>>,
        size: Option<(u32, u32)>,
        target: usize,
    },
    Encoding {
        job: GifJob,
    },
}

/// Drives one animated capture at a time.
///
/// A request while a capture is in flight is ignored, never queued; the
/// in-flight capture is unaffected.
pub struct CaptureController {
    fps: f32,
    scale: u32,
    state: CaptureState,
}

impl CaptureController {
    /// `fps` is the pipeline's operating rate (it becomes the per-frame GIF
    /// delay); `scale` is the integer upscale applied to recorded frames.
    pub fn new(fps: f32, scale: u32) -> Self {
        Self {
            fps: fps.max(1.0),
            scale: scale.max(1),
            state: CaptureState::Idle,
        }
    }

    /// Begins recording `duration` worth of frames at the operating rate.
    /// Returns false (and changes nothing) when a capture is in flight.
    pub fn start(&mut self, duration: Duration) -> bool {
        if !matches!(self.state, CaptureState::Idle) {
            tracing::warn!("capture already in flight; ignoring request");
            return false;
        }
        let target = (duration.as_secs_f32() * self.fps).ceil().max(1.0) as usize;
        tracing::info!(target_frames = target, "recording started");
        self.state = CaptureState::Recording {
            frames: Vec::with_capacity(target),
            size: None,
            target,
        };
        true
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, CaptureState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, CaptureState::Recording { .. })
    }

    /// Feeds one rendered output frame (native resolution). Ignored unless
    /// recording.
    pub fn record_frame(&mut self, rgba: &[u8], width: u32, height: u32) {
        let CaptureState::Recording {
            frames,
            size,
            target,
        } = &mut self.state
        else {
            return;
        };

        let scaled_size = (width * self.scale, height * self.scale);
        match size {
            None => *size = Some(scaled_size),
            Some(expected) if *expected != scaled_size => {
                tracing::warn!(
                    ?expected,
                    got = ?scaled_size,
                    "dropping frame with mismatched size during recording"
                );
                return;
            }
            Some(_) => {}
        }

        frames.push(upscale_nearest(rgba, width, height, self.scale));
        if frames.len() < *target {
            return;
        }

        let frames = std::mem::take(frames);
        let (gif_width, gif_height) = scaled_size;
        let frame_delay = Duration::from_secs_f32(1.0 / self.fps);
        tracing::info!(frames = frames.len(), "recording complete; encoding GIF");
        match GifJob::spawn(frames, gif_width, gif_height, frame_delay) {
            Ok(job) => self.state = CaptureState::Encoding { job },
            Err(err) => {
                tracing::error!(error = %err, "failed to start GIF encoder");
                self.state = CaptureState::Idle;
            }
        }
    }

    /// Returns the encoded GIF once the worker finishes, transitioning back
    /// to idle. `None` while recording/encoding is still under way or when
    /// idle.
    pub fn poll(&mut self) -> Option<Result<Vec<u8>>> {
        let CaptureState::Encoding { job } = &mut self.state else {
            return None;
        };
        let result = job.try_result()?;
        self.state = CaptureState::Idle;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for_result(controller: &mut CaptureController) -> Result<Vec<u8>> {
        for _ in 0..500 {
            if let Some(result) = controller.poll() {
                return result;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("GIF encoder did not finish in time");
    }

    fn gray_frame(width: u32, height: u32, value: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            out.extend_from_slice(&[value, value, value, 255]);
        }
        out
    }

    #[test]
    fn upscale_repeats_pixels() {
        let src = vec![1, 2, 3, 4, 5, 6, 7, 8]; // two pixels
        let out = upscale_nearest(&src, 2, 1, 2);
        assert_eq!(out.len(), 4 * 2 * 1 * 4);
        assert_eq!(&out[0..4], &[1, 2, 3, 4]);
        assert_eq!(&out[4..8], &[1, 2, 3, 4]);
        assert_eq!(&out[8..12], &[5, 6, 7, 8]);
    }

    #[test]
    fn upscale_factor_one_is_identity() {
        let src = vec![9, 8, 7, 6];
        assert_eq!(upscale_nearest(&src, 1, 1, 1), src);
    }

    #[test]
    fn upscale_repeats_rows() {
        let src = gray_frame(1, 2, 3);
        let out = upscale_nearest(&src, 1, 2, 3);
        assert_eq!(out.len(), 3 * 6 * 4);
        // Three copies of row 0, then three of row 1.
        assert!(out[..3 * 3 * 4].chunks_exact(4).all(|px| px[0] == 3));
    }

    #[test]
    fn png_bytes_carry_the_signature() {
        let bytes = encode_png(&gray_frame(2, 2, 10), 2, 2).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn records_until_target_then_encodes() {
        let mut controller = CaptureController::new(10.0, 1);
        assert!(controller.start(Duration::from_millis(300)));
        assert!(controller.is_recording());

        for value in 0..3 {
            controller.record_frame(&gray_frame(4, 4, value), 4, 4);
        }
        assert!(!controller.is_recording());
        assert!(!controller.is_idle());

        let bytes = wait_for_result(&mut controller).expect("gif bytes");
        assert_eq!(&bytes[..6], b"GIF89a");
        assert!(controller.is_idle());
    }

    #[test]
    fn second_request_is_rejected_and_first_is_unaffected() {
        let mut controller = CaptureController::new(10.0, 1);
        assert!(controller.start(Duration::from_millis(200)));
        controller.record_frame(&gray_frame(4, 4, 1), 4, 4);

        assert!(!controller.start(Duration::from_secs(60)));

        controller.record_frame(&gray_frame(4, 4, 2), 4, 4);
        let bytes = wait_for_result(&mut controller).expect("gif bytes");
        assert_eq!(&bytes[..6], b"GIF89a");

        // Back to idle: a new capture may begin.
        assert!(controller.start(Duration::from_millis(100)));
    }

    #[test]
    fn zero_duration_still_records_one_frame() {
        let mut controller = CaptureController::new(10.0, 1);
        assert!(controller.start(Duration::ZERO));
        controller.record_frame(&gray_frame(2, 2, 5), 2, 2);
        assert!(wait_for_result(&mut controller).is_ok());
    }

    #[test]
    fn frames_are_ignored_while_idle() {
        let mut controller = CaptureController::new(10.0, 1);
        controller.record_frame(&gray_frame(2, 2, 5), 2, 2);
        assert!(controller.is_idle());
        assert!(controller.poll().is_none());
    }

    #[test]
    fn recorded_frames_are_upscaled() {
        let mut controller = CaptureController::new(10.0, 2);
        assert!(controller.start(Duration::from_millis(100)));
        controller.record_frame(&gray_frame(2, 2, 7), 2, 2);
        let bytes = wait_for_result(&mut controller).expect("gif bytes");
        // Logical screen descriptor stores width/height little-endian after
        // the 6-byte header: 2x2 upscaled by 2 gives 4x4.
        assert_eq!(bytes[6], 4);
        assert_eq!(bytes[8], 4);
    }
}
