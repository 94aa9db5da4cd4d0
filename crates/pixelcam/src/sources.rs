use std::io::{self, Read};
use std::thread;

use renderer::{frame_channel, ChannelSource, Frame, FrameSource, TestPattern};

/// Builds the frame source selected on the command line: a raw RGB24 stdin
/// reader, or the synthetic test pattern at the configured source size.
pub fn build_source(
    stdin_frames: Option<(u32, u32)>,
    pattern_size: (u32, u32),
) -> Box<dyn FrameSource> {
    match stdin_frames {
        Some((width, height)) => Box::new(spawn_stdin_source(width, height)),
        None => Box::new(TestPattern::new(pattern_size.0, pattern_size.1)),
    }
}

/// Reads tightly packed RGB24 frames from stdin on a dedicated thread and
/// feeds them through a bounded channel; the render loop keeps only the
/// newest frame. When the pipe closes, the source goes quiet and the
/// pipeline keeps presenting the last frame.
fn spawn_stdin_source(width: u32, height: u32) -> ChannelSource {
    let (sender, source) = frame_channel(2);
    let frame_bytes = width as usize * height as usize * 3;

    let spawned = thread::Builder::new()
        .name("pixelcam-stdin-reader".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut buffer = vec![0u8; frame_bytes];
            loop {
                match input.read_exact(&mut buffer) {
                    Ok(()) => match Frame::from_rgb24(&buffer, width, height) {
                        Ok(frame) => {
                            sender.send(frame);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping malformed stdin frame");
                        }
                    },
                    Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                        tracing::info!("stdin frame stream ended");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "stdin read failed; stopping frame stream");
                        break;
                    }
                }
            }
        });

    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to spawn stdin reader; no frames will arrive");
    }
    source
}
