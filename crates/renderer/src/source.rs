//! Frame-source boundary.
//!
//! The pipeline only ever sees [`FrameSource::current_frame`]; who produces
//! the pixels (a capture device adapter, a raw pipe, a synthetic pattern) is
//! the caller's business. Returning `None` is normal — it means "nothing new
//! since the last tick" and the pipeline keeps presenting what it has.

use anyhow::{ensure, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};

/// One video frame: tightly packed RGBA8 rows, top-down.
#[derive(Clone, Debug)]
pub struct Frame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn from_rgba(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        ensure!(
            pixels.len() == expected,
            "RGBA frame of {width}x{height} needs {expected} bytes, got {}",
            pixels.len()
        );
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Expands packed RGB24 rows (the raw-pipe wire format) to RGBA.
    pub fn from_rgb24(data: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        ensure!(
            data.len() == expected,
            "RGB frame of {width}x{height} needs {expected} bytes, got {}",
            data.len()
        );
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for rgb in data.chunks_exact(3) {
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// A single-color frame.
    pub fn solid(rgba: [u8; 4], width: u32, height: u32) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            pixels,
            width,
            height,
        }
    }
}

/// Read-only view of a frame producer, polled once per tick.
pub trait FrameSource {
    /// Latest frame not yet consumed, or `None` when nothing new arrived.
    fn current_frame(&mut self) -> Option<Frame>;
}

/// Creates a bounded producer/consumer pair for feeding frames from another
/// thread into the render loop.
pub fn frame_channel(capacity: usize) -> (FrameSender, ChannelSource) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (FrameSender { sender }, ChannelSource { receiver })
}

/// Producer half; dropping it leaves the source permanently empty, which the
/// pipeline tolerates as "no active frame source".
#[derive(Clone)]
pub struct FrameSender {
    sender: Sender<Frame>,
}

impl FrameSender {
    /// Queues a frame without blocking. When the consumer lags, the frame is
    /// dropped — stale video is worthless.
    pub fn send(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("render loop behind; dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half implementing [`FrameSource`].
pub struct ChannelSource {
    receiver: Receiver<Frame>,
}

impl FrameSource for ChannelSource {
    fn current_frame(&mut self) -> Option<Frame> {
        // Drain everything queued since the last tick and keep the newest.
        self.receiver.try_iter().last()
    }
}

/// Deterministic synthetic source: a diagonal luminance ramp with a bright
/// bar sweeping across it. Used for previews without a camera and for
/// exercising the pipeline in tests.
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }
}

impl FrameSource for TestPattern {
    fn current_frame(&mut self) -> Option<Frame> {
        let (w, h) = (self.width, self.height);
        let bar_width = (w / 16).max(1);
        let bar_x = (self.tick * 3 % u64::from(w)) as u32;
        self.tick = self.tick.wrapping_add(1);

        let mut pixels = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            for x in 0..w {
                let ramp = ((x + y) * 255 / (w + h - 1)) as u8;
                let in_bar = x.abs_diff(bar_x) < bar_width;
                let value = if in_bar { 255 } else { ramp };
                pixels.extend_from_slice(&[value, value, value, 255]);
            }
        }
        Some(Frame {
            pixels,
            width: w,
            height: h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb24_expands_to_rgba() {
        let frame = Frame::from_rgb24(&[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(frame.pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(Frame::from_rgb24(&[0; 5], 2, 1).is_err());
        assert!(Frame::from_rgba(vec![0; 7], 2, 1).is_err());
    }

    #[test]
    fn channel_source_keeps_only_the_newest_frame() {
        let (sender, mut source) = frame_channel(4);
        assert!(sender.send(Frame::solid([1, 1, 1, 255], 2, 2)));
        assert!(sender.send(Frame::solid([9, 9, 9, 255], 2, 2)));
        let frame = source.current_frame().expect("a frame");
        assert_eq!(frame.pixels[0], 9);
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sender, mut source) = frame_channel(1);
        assert!(sender.send(Frame::solid([1, 1, 1, 255], 1, 1)));
        assert!(!sender.send(Frame::solid([2, 2, 2, 255], 1, 1)));
        assert_eq!(source.current_frame().unwrap().pixels[0], 1);
    }

    #[test]
    fn disconnected_producer_reads_as_no_frame() {
        let (sender, mut source) = frame_channel(1);
        drop(sender);
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_pattern_is_deterministic() {
        let mut a = TestPattern::new(8, 8);
        let mut b = TestPattern::new(8, 8);
        let fa = a.current_frame().unwrap();
        let fb = b.current_frame().unwrap();
        assert_eq!(fa.pixels, fb.pixels);
        assert_eq!(fa.pixels.len(), 8 * 8 * 4);
        // The sweep advances between ticks.
        let fa2 = a.current_frame().unwrap();
        assert_ne!(fa.pixels, fa2.pixels);
    }
}
