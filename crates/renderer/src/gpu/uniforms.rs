use bytemuck::{Pod, Zeroable};
use presets::Palette;

/// Mapping of output coordinates onto a sub-rectangle of a source texture:
/// `src_uv = offset + uv * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CropMapping {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

impl CropMapping {
    pub(crate) const IDENTITY: Self = Self {
        scale: [1.0, 1.0],
        offset: [0.0, 0.0],
    };
}

/// Center-crop: trim the larger source dimension so the remaining region
/// matches the output aspect ratio. Exactly one axis scales below 1 (none
/// when the ratios already match), and the cropped region stays centered.
pub(crate) fn center_crop(source: (u32, u32), output: (u32, u32)) -> CropMapping {
    let (sw, sh) = source;
    let (ow, oh) = output;
    if sw == 0 || sh == 0 || ow == 0 || oh == 0 {
        return CropMapping::IDENTITY;
    }

    let source_ratio = sw as f32 / sh as f32;
    let output_ratio = ow as f32 / oh as f32;
    let mut mapping = CropMapping::IDENTITY;
    if source_ratio > output_ratio {
        // Source is wider: crop the sides.
        let scale = output_ratio / source_ratio;
        mapping.scale[0] = scale;
        mapping.offset[0] = (1.0 - scale) * 0.5;
    } else if source_ratio < output_ratio {
        // Source is taller: crop top and bottom.
        let scale = source_ratio / output_ratio;
        mapping.scale[1] = scale;
        mapping.offset[1] = (1.0 - scale) * 0.5;
    }
    mapping
}

/// std140 mirror of the `QuantizeParams` uniform block.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct QuantizeUniforms {
    pub palette: [[f32; 4]; 4],
    pub tex_scale: [f32; 2],
    pub tex_offset: [f32; 2],
    pub brightness: f32,
    pub contrast: f32,
    pub dither: f32,
    pub _pad: f32,
}

unsafe impl Zeroable for QuantizeUniforms {}
unsafe impl Pod for QuantizeUniforms {}

impl QuantizeUniforms {
    pub(crate) fn new() -> Self {
        let mut uniforms = Self {
            palette: [[0.0; 4]; 4],
            tex_scale: [1.0, 1.0],
            tex_offset: [0.0, 0.0],
            brightness: 0.0,
            contrast: 1.0,
            dither: 0.0,
            _pad: 0.0,
        };
        uniforms.set_palette(&Palette::default());
        uniforms
    }

    pub(crate) fn set_palette(&mut self, palette: &Palette) {
        for (slot, [r, g, b]) in self.palette.iter_mut().zip(palette.entries()) {
            *slot = [*r, *g, *b, 1.0];
        }
    }

    pub(crate) fn set_adjust(&mut self, brightness: f32, contrast: f32, dither: bool) {
        self.brightness = brightness;
        self.contrast = contrast;
        self.dither = if dither { 1.0 } else { 0.0 };
    }

    pub(crate) fn set_crop(&mut self, crop: CropMapping) {
        self.tex_scale = crop.scale;
        self.tex_offset = crop.offset;
    }
}

/// std140 mirror of the `EchoParams` uniform block.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct EchoUniforms {
    pub tex_scale: [f32; 2],
    pub tex_offset: [f32; 2],
    pub decay: f32,
    pub _pad0: f32,
    pub _pad1: [f32; 2],
}

unsafe impl Zeroable for EchoUniforms {}
unsafe impl Pod for EchoUniforms {}

impl EchoUniforms {
    pub(crate) fn new() -> Self {
        Self {
            tex_scale: [1.0, 1.0],
            tex_offset: [0.0, 0.0],
            decay: 0.0,
            _pad0: 0.0,
            _pad1: [0.0, 0.0],
        }
    }

    pub(crate) fn set_crop(&mut self, crop: CropMapping) {
        self.tex_scale = crop.scale;
        self.tex_offset = crop.offset;
    }

    pub(crate) fn set_decay(&mut self, decay: f32) {
        self.decay = decay.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn quantize_uniforms_follow_std140_layout() {
        let uniforms = QuantizeUniforms::new();
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<QuantizeUniforms>(), 16);
        assert_eq!(size_of::<QuantizeUniforms>(), 96);
        assert_eq!((&uniforms.palette as *const _ as usize) - base, 0);
        assert_eq!((&uniforms.tex_scale as *const _ as usize) - base, 64);
        assert_eq!((&uniforms.tex_offset as *const _ as usize) - base, 72);
        assert_eq!((&uniforms.brightness as *const _ as usize) - base, 80);
        assert_eq!((&uniforms.contrast as *const _ as usize) - base, 84);
        assert_eq!((&uniforms.dither as *const _ as usize) - base, 88);
    }

    #[test]
    fn echo_uniforms_follow_std140_layout() {
        let uniforms = EchoUniforms::new();
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<EchoUniforms>(), 16);
        assert_eq!(size_of::<EchoUniforms>(), 32);
        assert_eq!((&uniforms.tex_scale as *const _ as usize) - base, 0);
        assert_eq!((&uniforms.tex_offset as *const _ as usize) - base, 8);
        assert_eq!((&uniforms.decay as *const _ as usize) - base, 16);
    }

    #[test]
    fn matching_ratios_crop_nothing() {
        assert_eq!(center_crop((1280, 1120), (128, 112)), CropMapping::IDENTITY);
        assert_eq!(center_crop((128, 112), (128, 112)), CropMapping::IDENTITY);
    }

    #[test]
    fn wider_source_crops_sides() {
        let crop = center_crop((1280, 720), (128, 112));
        assert_eq!(crop.scale[1], 1.0);
        assert!(crop.scale[0] < 1.0);
        assert!((crop.offset[0] - (1.0 - crop.scale[0]) * 0.5).abs() < 1e-6);
        assert_eq!(crop.offset[1], 0.0);
    }

    #[test]
    fn taller_source_crops_top_and_bottom() {
        let crop = center_crop((480, 640), (128, 112));
        assert_eq!(crop.scale[0], 1.0);
        assert!(crop.scale[1] < 1.0);
        assert!((crop.offset[1] - (1.0 - crop.scale[1]) * 0.5).abs() < 1e-6);
        assert_eq!(crop.offset[0], 0.0);
    }

    #[test]
    fn exactly_one_axis_is_trimmed() {
        for source in [(640, 480), (1920, 1080), (480, 640), (100, 100)] {
            for output in [(128, 112), (64, 64), (160, 90)] {
                let crop = center_crop(source, output);
                let full_axes = [crop.scale[0], crop.scale[1]]
                    .iter()
                    .filter(|&&s| s == 1.0)
                    .count();
                assert!(full_axes >= 1, "{source:?} -> {output:?}: {crop:?}");
                assert!(crop.scale[0] <= 1.0 && crop.scale[1] <= 1.0);
            }
        }
    }

    #[test]
    fn cropped_region_stays_inside_the_source() {
        let crop = center_crop((1920, 1080), (128, 112));
        for axis in 0..2 {
            let end = crop.offset[axis] + crop.scale[axis];
            assert!(crop.offset[axis] >= 0.0);
            assert!(end <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn degenerate_dimensions_fall_back_to_identity() {
        assert_eq!(center_crop((0, 480), (128, 112)), CropMapping::IDENTITY);
        assert_eq!(center_crop((640, 480), (0, 0)), CropMapping::IDENTITY);
    }

    #[test]
    fn palette_entries_carry_into_the_uniform_block() {
        let mut uniforms = QuantizeUniforms::new();
        let palette =
            Palette::from_rgb8([[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]]);
        uniforms.set_palette(&palette);
        assert_eq!(uniforms.palette[3], [1.0, 1.0, 1.0, 1.0]);
        assert!((uniforms.palette[1][0] - 85.0 / 255.0).abs() < 1e-6);
    }
}
