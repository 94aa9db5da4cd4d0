//! Render parameters shared between the UI collaborator and the render tick.
//!
//! The UI side mutates a [`ParamsHandle`]; the pipeline takes one
//! [`RenderParams`] snapshot at the start of each tick, so a tick never
//! observes a half-applied update. Last write between ticks wins.

use std::fmt;
use std::sync::{Arc, Mutex};

use presets::Palette;

/// Where the feedback trail composites relative to palette quantization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EchoMode {
    /// No trail; the current frame is quantized directly.
    #[default]
    Off,
    /// Trail accumulates on the raw input, then the blend is quantized:
    /// the smear looks continuous.
    Before,
    /// The quantized frame accumulates: the smear is palette-colored ghosts.
    After,
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// One tick's worth of tunables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Signed offset added after the contrast gain.
    pub brightness: f32,
    /// Multiplicative gain around mid-gray.
    pub contrast: f32,
    /// Ordered dithering on/off.
    pub dither: bool,
    pub echo_mode: EchoMode,
    /// Per-tick decay of the accumulated trail, in `[0, 1]`.
    pub echo_decay: f32,
    pub palette: Palette,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            dither: true,
            echo_mode: EchoMode::Off,
            echo_decay: 0.85,
            palette: Palette::default(),
        }
    }
}

impl RenderParams {
    /// Sets the echo decay, clamping out-of-range values instead of letting
    /// them reach the shader.
    pub fn set_echo_decay(&mut self, decay: f32) {
        let clamped = if decay.is_finite() {
            decay.clamp(0.0, 1.0)
        } else {
            self.echo_decay
        };
        if clamped != decay {
            tracing::warn!(requested = decay, applied = clamped, "echo decay out of range");
        }
        self.echo_decay = clamped;
    }
}

/// Shared handle through which the UI writes parameters.
#[derive(Clone)]
pub struct ParamsHandle {
    inner: Arc<Mutex<RenderParams>>,
}

impl ParamsHandle {
    pub fn new(initial: RenderParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Copies the current parameters; called once per tick by the pipeline.
    pub fn snapshot(&self) -> RenderParams {
        *self.lock()
    }

    /// Applies an update atomically with respect to snapshots.
    pub fn apply(&self, update: impl FnOnce(&mut RenderParams)) {
        update(&mut self.lock());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RenderParams> {
        // A poisoned lock only means a writer panicked mid-update; the
        // parameter struct itself is always a valid value.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ParamsHandle {
    fn default() -> Self {
        Self::new(RenderParams::default())
    }
}
