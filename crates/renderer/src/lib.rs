//! Rendering core for pixelcam.
//!
//! The crate turns a stream of raw video frames into a quantized pixel-art
//! image on the GPU. The per-tick flow is:
//!
//! ```text
//!   FrameSource ──▶ video texture ──▶ [echo "before"] ──▶ quantize ─┐
//!                                                                   ├─▶ offscreen target
//!                                         [echo "after" ◀── quantize]
//!                                                                   │
//!                          surface (blit, nearest upscale) ◀────────┤
//!                          capture (readback, PNG/GIF)     ◀────────┘
//! ```
//!
//! [`PixelPipeline`] owns every GPU resource and runs the pass sequence once
//! per admitted tick; pacing lives in the `scheduler` crate and parameter
//! updates arrive through a [`ParamsHandle`] snapshot read at the start of
//! each tick. The echo trail accumulates in a pair of ping-pong buffers so a
//! pass never samples the texture it is writing.
//!
//! Shaders are GLSL compiled at pipeline construction through wgpu's naga
//! frontend; a compile failure aborts construction with a single diagnostic.

pub mod capture;
mod compile;
mod gpu;
pub mod params;
pub mod source;

pub use gpu::state::{PipelineStats, PixelPipeline};
pub use params::{EchoMode, ParamsHandle, RenderParams};
pub use presets::Palette;
pub use source::{frame_channel, ChannelSource, Frame, FrameSender, FrameSource, TestPattern};
