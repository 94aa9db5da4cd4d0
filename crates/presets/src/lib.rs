//! Palette preset library for the pixelcam renderer.
//!
//! Presets are named, ordered sets of exactly [`PALETTE_SIZE`] colors loaded
//! from a JSON file (or from the built-in table when no file is supplied).
//! Channels are stored as 8-bit values on disk and normalized to `[0, 1]`
//! here, so the renderer only ever sees a validated [`Palette`].
//!
//! Validation happens once at load time; a [`Palette`] value can therefore
//! never carry the wrong number of entries.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Number of colors in every palette. The quantization shader bins luminance
/// into this many levels, so the count is fixed by construction.
pub const PALETTE_SIZE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("failed to read preset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse preset file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("preset '{id}' must have exactly {PALETTE_SIZE} colors, got {count}")]
    WrongColorCount { id: String, count: usize },
    #[error("duplicate preset id '{0}'")]
    DuplicateId(String),
    #[error("unknown preset id '{0}'")]
    UnknownId(String),
    #[error("preset file declares no presets")]
    Empty,
}

/// An ordered set of exactly four normalized RGB colors.
///
/// Ordering matters: entry 0 is the darkest quantization level and entry 3
/// the brightest, matching the shader's luminance bins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Palette {
    entries: [[f32; 3]; PALETTE_SIZE],
}

impl Palette {
    /// Normalizes 8-bit channels into `[0, 1]`.
    pub fn from_rgb8(colors: [[u8; 3]; PALETTE_SIZE]) -> Self {
        let entries = colors.map(|[r, g, b]| {
            [
                f32::from(r) / 255.0,
                f32::from(g) / 255.0,
                f32::from(b) / 255.0,
            ]
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[[f32; 3]; PALETTE_SIZE] {
        &self.entries
    }

    /// Returns the entries re-expanded to 8-bit channels, rounding to the
    /// nearest representable value.
    pub fn to_rgb8(&self) -> [[u8; 3]; PALETTE_SIZE] {
        self.entries
            .map(|[r, g, b]| [channel_to_u8(r), channel_to_u8(g), channel_to_u8(b)])
    }
}

impl Default for Palette {
    /// Four-level grayscale ramp.
    fn default() -> Self {
        Self::from_rgb8([[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]])
    }
}

fn channel_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A preset after validation: its palette is guaranteed well-formed.
#[derive(Clone, Debug)]
pub struct LoadedPreset {
    pub id: String,
    pub name: String,
    pub palette: Palette,
}

/// On-disk schema. Kept private so callers only ever observe validated data.
#[derive(Debug, Deserialize, Serialize)]
struct PresetFile {
    #[serde(default)]
    presets: Vec<RawPreset>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawPreset {
    id: String,
    #[serde(default)]
    name: Option<String>,
    colors: Vec<[u8; 3]>,
}

/// Collection of validated presets plus the currently selected one.
#[derive(Clone, Debug)]
pub struct PresetLibrary {
    presets: Vec<LoadedPreset>,
    active: usize,
}

impl PresetLibrary {
    /// Parses and validates a preset file.
    pub fn from_json_str(input: &str) -> Result<Self, PresetError> {
        let file: PresetFile = serde_json::from_str(input)?;
        if file.presets.is_empty() {
            return Err(PresetError::Empty);
        }

        let mut presets = Vec::with_capacity(file.presets.len());
        for raw in file.presets {
            if raw.colors.len() != PALETTE_SIZE {
                return Err(PresetError::WrongColorCount {
                    id: raw.id,
                    count: raw.colors.len(),
                });
            }
            if presets.iter().any(|p: &LoadedPreset| p.id == raw.id) {
                return Err(PresetError::DuplicateId(raw.id));
            }
            let colors = [raw.colors[0], raw.colors[1], raw.colors[2], raw.colors[3]];
            let name = raw.name.unwrap_or_else(|| raw.id.clone());
            presets.push(LoadedPreset {
                id: raw.id,
                name,
                palette: Palette::from_rgb8(colors),
            });
        }

        tracing::debug!(count = presets.len(), "loaded palette presets");
        Ok(Self { presets, active: 0 })
    }

    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json_str(&input)
    }

    /// The built-in presets shipped with the renderer, used when no preset
    /// file is given.
    pub fn builtin() -> Self {
        let table: [(&str, &str, [[u8; 3]; PALETTE_SIZE]); 4] = [
            (
                "grayscale",
                "Grayscale",
                [[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]],
            ),
            (
                "gameboy",
                "Game Boy",
                [[15, 56, 15], [48, 98, 48], [139, 172, 15], [155, 188, 15]],
            ),
            (
                "sepia",
                "Sepia",
                [[38, 19, 0], [87, 51, 8], [166, 124, 54], [245, 230, 196]],
            ),
            (
                "cga",
                "CGA",
                [[0, 0, 0], [85, 255, 255], [255, 85, 255], [255, 255, 255]],
            ),
        ];
        let presets = table
            .into_iter()
            .map(|(id, name, colors)| LoadedPreset {
                id: id.to_string(),
                name: name.to_string(),
                palette: Palette::from_rgb8(colors),
            })
            .collect();
        Self { presets, active: 0 }
    }

    pub fn get(&self, id: &str) -> Option<&LoadedPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// Selects the active preset by id, leaving the previous selection in
    /// place when the id is unknown.
    pub fn select(&mut self, id: &str) -> Result<&LoadedPreset, PresetError> {
        match self.presets.iter().position(|p| p.id == id) {
            Some(index) => {
                self.active = index;
                Ok(&self.presets[index])
            }
            None => Err(PresetError::UnknownId(id.to_string())),
        }
    }

    /// Advances the selection to the next preset, wrapping around.
    pub fn select_next(&mut self) -> &LoadedPreset {
        self.active = (self.active + 1) % self.presets.len();
        &self.presets[self.active]
    }

    pub fn active(&self) -> &LoadedPreset {
        &self.presets[self.active]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedPreset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
    {
        "presets": [
            {
                "id": "grayscale",
                "name": "Grayscale",
                "colors": [[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]]
            },
            {
                "id": "ocean",
                "colors": [[4, 12, 34], [18, 52, 110], [64, 120, 180], [210, 236, 250]]
            }
        ]
    }
    "#;

    #[test]
    fn parses_sample_file() {
        let library = PresetLibrary::from_json_str(SAMPLE).expect("parse presets");
        assert_eq!(library.len(), 2);
        assert_eq!(library.active().id, "grayscale");
        assert_eq!(library.get("ocean").unwrap().name, "ocean");
    }

    #[test]
    fn normalizes_channels() {
        let library = PresetLibrary::from_json_str(SAMPLE).unwrap();
        let entries = *library.get("grayscale").unwrap().palette.entries();
        assert_eq!(entries[0], [0.0, 0.0, 0.0]);
        assert_eq!(entries[3], [1.0, 1.0, 1.0]);
        assert!((entries[2][0] - 170.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_color_count() {
        let input = r#"{"presets": [{"id": "short", "colors": [[0,0,0], [255,255,255]]}]}"#;
        let err = PresetLibrary::from_json_str(input).unwrap_err();
        assert!(matches!(
            err,
            PresetError::WrongColorCount { count: 2, .. }
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let input = r#"{"presets": [
            {"id": "a", "colors": [[0,0,0],[1,1,1],[2,2,2],[3,3,3]]},
            {"id": "a", "colors": [[0,0,0],[1,1,1],[2,2,2],[3,3,3]]}
        ]}"#;
        let err = PresetLibrary::from_json_str(input).unwrap_err();
        assert!(matches!(err, PresetError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn rejects_empty_file() {
        let err = PresetLibrary::from_json_str(r#"{"presets": []}"#).unwrap_err();
        assert!(matches!(err, PresetError::Empty));
    }

    #[test]
    fn unknown_selection_keeps_previous() {
        let mut library = PresetLibrary::builtin();
        library.select("gameboy").unwrap();
        assert!(library.select("does-not-exist").is_err());
        assert_eq!(library.active().id, "gameboy");
    }

    #[test]
    fn select_next_wraps() {
        let mut library = PresetLibrary::builtin();
        let count = library.len();
        for _ in 0..count {
            library.select_next();
        }
        assert_eq!(library.active().id, "grayscale");
    }

    #[test]
    fn builtin_palettes_are_well_formed() {
        let library = PresetLibrary::builtin();
        assert_eq!(library.len(), 4);
        for preset in library.iter() {
            for entry in preset.palette.entries() {
                for channel in entry {
                    assert!((0.0..=1.0).contains(channel));
                }
            }
        }
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write presets");
        let library = PresetLibrary::load(file.path()).expect("load presets");
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn palette_round_trips_to_rgb8() {
        let palette = Palette::from_rgb8([[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]]);
        assert_eq!(
            palette.to_rgb8(),
            [[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]]
        );
    }
}
