//! GLSL programs for the three passes plus the shared fullscreen vertex
//! shader, compiled through wgpu's naga frontend at pipeline construction.
//!
//! The fragment shaders use Vulkan-flavored GLSL with split texture/sampler
//! bindings; uniform blocks are std140 and must stay byte-compatible with the
//! structs in `gpu::uniforms`.

use std::borrow::Cow;

use anyhow::Result;
use wgpu::naga::ShaderStage;

pub(crate) fn vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    }))
}

pub(crate) fn fragment_shader(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
) -> Result<wgpu::ShaderModule> {
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    }))
}

/// Fullscreen triangle. `v_uv` has y = 0 at the top so texture rows (stored
/// top-down) sample upright in every pass without per-pass flips.
const VERTEX_SHADER: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[uint(gl_VertexIndex)];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Brightness/contrast, optional ordered dithering, and 4-level palette
/// lookup. The output is always one of the four palette entries.
pub(crate) const QUANTIZE_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform QuantizeParams {
    vec4 palette[4];
    vec2 tex_scale;
    vec2 tex_offset;
    float brightness;
    float contrast;
    float dither;
    float _pad;
} params;

layout(set = 1, binding = 0) uniform texture2D source_texture;
layout(set = 1, binding = 1) uniform sampler source_sampler;

// Rec. 709 luma is the ordering key for palette binning.
const vec3 LUMA = vec3(0.2126, 0.7152, 0.0722);

const float BAYER[16] = float[16](
     0.0,  8.0,  2.0, 10.0,
    12.0,  4.0, 14.0,  6.0,
     3.0, 11.0,  1.0,  9.0,
    15.0,  7.0, 13.0,  5.0
);

void main() {
    vec2 src_uv = params.tex_offset + v_uv * params.tex_scale;
    vec3 color = texture(sampler2D(source_texture, source_sampler), src_uv).rgb;
    color = (color - 0.5) * params.contrast + 0.5 + params.brightness;

    float luma = dot(color, LUMA);
    if (params.dither > 0.5) {
        int cx = int(mod(gl_FragCoord.x, 4.0));
        int cy = int(mod(gl_FragCoord.y, 4.0));
        // Zero-mean threshold scaled to one quantization step.
        luma += ((BAYER[cy * 4 + cx] + 0.5) / 16.0 - 0.5) * 0.25;
    }
    luma = clamp(luma, 0.0, 1.0);

    // Bins [0,.25) [.25,.5) [.5,.75) [.75,1]; mid-gray lands in bin 2.
    int level = min(int(luma * 4.0), 3);
    out_color = vec4(params.palette[level].rgb, 1.0);
}
";

/// Feedback accumulation: current frame plus the decayed previous
/// accumulation, saturating so the trail can never leave the displayable
/// range for any decay in [0, 1].
pub(crate) const ECHO_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform EchoParams {
    vec2 tex_scale;
    vec2 tex_offset;
    float decay;
    float _pad0;
    vec2 _pad1;
} params;

layout(set = 1, binding = 0) uniform texture2D current_texture;
layout(set = 1, binding = 1) uniform sampler current_sampler;
layout(set = 1, binding = 2) uniform texture2D history_texture;
layout(set = 1, binding = 3) uniform sampler history_sampler;

void main() {
    vec2 src_uv = params.tex_offset + v_uv * params.tex_scale;
    vec3 current = texture(sampler2D(current_texture, current_sampler), src_uv).rgb;
    vec3 history = texture(sampler2D(history_texture, history_sampler), v_uv).rgb;
    out_color = vec4(min(current + params.decay * history, vec3(1.0)), 1.0);
}
";

/// Verbatim copy of a texture onto the bound target.
pub(crate) const BLIT_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 0) uniform texture2D source_texture;
layout(set = 0, binding = 1) uniform sampler source_sampler;

void main() {
    out_color = texture(sampler2D(source_texture, source_sampler), v_uv);
}
";
