//! Vertex Layout Generator
//!
//! Emits, from a normalized feature-flag set, both sides of the vertex
//! contract: the `wgpu` vertex buffer layouts and the WGSL `VertexInput` /
//! `VertexOutput` struct source injected into the shader template. The two
//! outputs are produced from one stream table so they can never drift.

use wgpu::VertexFormat;

use crate::features::FeatureFlags;

/// One vertex stream: a separate buffer slot per attribute (the loader
/// contract is de-interleaved streams).
struct Stream {
    name: &'static str,
    format: VertexFormat,
    /// Present when any of these bits is set; `empty()` = always present.
    gate: FeatureFlags,
}

const STREAMS: &[Stream] = &[
    Stream {
        name: "position",
        format: VertexFormat::Float32x3,
        gate: FeatureFlags::empty(),
    },
    Stream {
        name: "normal",
        format: VertexFormat::Float32x3,
        gate: FeatureFlags::empty(),
    },
    Stream {
        name: "tangent",
        format: VertexFormat::Float32x4,
        gate: FeatureFlags::NORMAL_MAP
            .union(FeatureFlags::CLEARCOAT_NORMAL_MAP)
            .union(FeatureFlags::ANISOTROPY),
    },
    Stream {
        name: "uv0",
        format: VertexFormat::Float32x2,
        gate: FeatureFlags::empty(),
    },
    Stream {
        name: "uv1",
        format: VertexFormat::Float32x2,
        gate: FeatureFlags::TEXCOORD1,
    },
    Stream {
        name: "color",
        format: VertexFormat::Float32x4,
        gate: FeatureFlags::VERTEX_COLORS,
    },
    Stream {
        name: "joints",
        format: VertexFormat::Uint16x4,
        gate: FeatureFlags::SKINNING,
    },
    Stream {
        name: "weights",
        format: VertexFormat::Float32x4,
        gate: FeatureFlags::SKINNING,
    },
];

/// Owned mirror of `wgpu::VertexBufferLayout` (which borrows its attribute
/// slice).
#[derive(Debug, Clone)]
pub struct OwnedVertexBufferDesc {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl OwnedVertexBufferDesc {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

/// Generated vertex contract for one variant.
#[derive(Debug, Clone)]
pub struct GeneratedVertexLayout {
    pub buffers: Vec<OwnedVertexBufferDesc>,
    /// WGSL `struct VertexInput { ... }` source.
    pub vertex_input_code: String,
    /// WGSL `struct VertexOutput { ... }` source (varyings).
    pub varyings_code: String,
}

/// Generates the vertex layout and struct sources for `flags`.
///
/// `flags` must already be normalized; stream presence follows the same
/// gates the attribute writer and templates use.
#[must_use]
pub fn generate_vertex_layout(flags: FeatureFlags) -> GeneratedVertexLayout {
    let mut buffers = Vec::new();
    let mut input_fields = Vec::new();
    let mut location = 0u32;

    for stream in STREAMS {
        if !stream.gate.is_empty() && !flags.intersects(stream.gate) {
            continue;
        }

        buffers.push(OwnedVertexBufferDesc {
            array_stride: stream.format.size(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: vec![wgpu::VertexAttribute {
                format: stream.format,
                offset: 0,
                shader_location: location,
            }],
        });

        let wgsl_type = format_to_wgsl_type(stream.format);
        input_fields.push(format!(
            "    @location({location}) {}: {wgsl_type},",
            stream.name
        ));
        location += 1;
    }

    let vertex_input_code = format!("struct VertexInput {{\n{}\n}};", input_fields.join("\n"));

    GeneratedVertexLayout {
        buffers,
        vertex_input_code,
        varyings_code: generate_varyings_code(flags),
    }
}

/// Names of the vertex streams active for `flags`, in buffer-slot order.
///
/// The draw dispatcher binds the model's stream buffers in exactly this
/// order; slot `i` of the pipeline's vertex state is `stream_names(...)[i]`.
#[must_use]
pub fn stream_names(flags: FeatureFlags) -> Vec<&'static str> {
    STREAMS
        .iter()
        .filter(|s| s.gate.is_empty() || flags.intersects(s.gate))
        .map(|s| s.name)
        .collect()
}

/// Generates the `VertexOutput` (varyings) struct for `flags`.
///
/// Independent of the input generator on purpose: varyings exist that no
/// vertex stream feeds directly (world position, previous clip position).
#[must_use]
pub fn generate_varyings_code(flags: FeatureFlags) -> String {
    let mut fields = vec![
        "    @builtin(position) clip_position: vec4<f32>,".to_string(),
        "    @location(0) world_position: vec3<f32>,".to_string(),
        "    @location(1) world_normal: vec3<f32>,".to_string(),
        "    @location(2) uv0: vec2<f32>,".to_string(),
    ];
    let mut location = 3u32;
    let mut push = |text: String| {
        fields.push(text);
    };

    if flags.intersects(
        FeatureFlags::NORMAL_MAP
            .union(FeatureFlags::CLEARCOAT_NORMAL_MAP)
            .union(FeatureFlags::ANISOTROPY),
    ) {
        push(format!(
            "    @location({location}) world_tangent: vec4<f32>,"
        ));
        location += 1;
    }
    if flags.contains(FeatureFlags::TEXCOORD1) {
        push(format!("    @location({location}) uv1: vec2<f32>,"));
        location += 1;
    }
    if flags.contains(FeatureFlags::VERTEX_COLORS) {
        push(format!("    @location({location}) color: vec4<f32>,"));
        location += 1;
    }
    if flags.contains(FeatureFlags::MOTION_VECTORS) {
        push(format!(
            "    @location({location}) curr_clip_position: vec4<f32>,"
        ));
        location += 1;
        push(format!(
            "    @location({location}) prev_clip_position: vec4<f32>,"
        ));
    }

    format!("struct VertexOutput {{\n{}\n}};", fields.join("\n"))
}

#[allow(clippy::match_same_arms)]
fn format_to_wgsl_type(format: VertexFormat) -> &'static str {
    match format {
        VertexFormat::Float32 => "f32",
        VertexFormat::Float32x2 => "vec2<f32>",
        VertexFormat::Float32x3 => "vec3<f32>",
        VertexFormat::Float32x4 => "vec4<f32>",
        VertexFormat::Uint32 => "u32",
        VertexFormat::Uint32x4 => "vec4<u32>",
        VertexFormat::Uint16x4 => "vec4<u32>",
        VertexFormat::Unorm8x4 => "vec4<f32>",
        _ => "f32",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_layout_has_core_streams_only() {
        let layout = generate_vertex_layout(FeatureFlags::empty());
        // position, normal, uv0
        assert_eq!(layout.buffers.len(), 3);
        assert!(layout.vertex_input_code.contains("position"));
        assert!(!layout.vertex_input_code.contains("joints"));
    }

    #[test]
    fn skinning_adds_joint_streams() {
        let layout = generate_vertex_layout(FeatureFlags::SKINNING);
        assert!(layout.vertex_input_code.contains("joints"));
        assert!(layout.vertex_input_code.contains("weights"));
        assert_eq!(layout.buffers.len(), 5);
    }

    #[test]
    fn locations_are_dense_and_unique() {
        let layout = generate_vertex_layout(FeatureFlags::all());
        let locations: Vec<u32> = layout
            .buffers
            .iter()
            .flat_map(|b| b.attributes.iter().map(|a| a.shader_location))
            .collect();
        for (i, loc) in locations.iter().enumerate() {
            assert_eq!(*loc, i as u32);
        }
    }
}
