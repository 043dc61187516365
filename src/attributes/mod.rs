//! Per-Primitive Attribute Writer
//!
//! Serializes per-draw shading parameters (transforms, material constants,
//! texture-attribute descriptors) into a GPU-visible buffer region whose
//! byte layout is a strict mirror of the shader-side `PrimitiveAttribs`
//! struct for the same feature-flag combination.
//!
//! One declarative [`SCHEMA`] table drives all three consumers:
//!
//! - [`write_attribs`] — the byte writer,
//! - [`attribs_size`] — the size query (must return exactly what `write`
//!   produces; callers pre-size their buffers with it),
//! - [`attribs_struct_wgsl`] — the shader-side struct source.
//!
//! There is no second copy of the layout to keep in sync. Every block is a
//! `#[repr(C)]` Pod struct padded to 16 bytes; conditional blocks are gated
//! by the same feature bits on all three paths.
//!
//! Overflow is a checked error (`AttributeOverflow`), not a debug-only
//! assertion: a sizing mismatch corrupts every draw after it, so the branch
//! is always on.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::error::{RenderError, Result};
use crate::features::FeatureFlags;
use crate::model::Material;
use crate::settings::RendererSettings;

// ─── Block structs (host side of the layout contract) ────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct NodeAttribs {
    node_matrix: Mat4,
    joint_count: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PrevNodeAttribs {
    prev_node_matrix: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MaterialBasicAttribs {
    base_color_factor: Vec4,
    emissive_factor: Vec3,
    normal_scale: f32,
    metallic_factor: f32,
    roughness_factor: f32,
    occlusion_strength: f32,
    alpha_cutoff: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ClearcoatAttribs {
    factor: f32,
    roughness_factor: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SheenAttribs {
    color_factor: Vec3,
    roughness_factor: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AnisotropyAttribs {
    strength: f32,
    rotation: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct IridescenceAttribs {
    factor: f32,
    ior: f32,
    thickness_min: f32,
    thickness_max: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransmissionAttribs {
    factor: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct VolumeAttribs {
    attenuation_color: Vec3,
    thickness_factor: f32,
    attenuation_distance: f32,
    _pad: [f32; 3],
}

/// One entry of the texture-attribute descriptor array: exactly one per map
/// bit set in the flags, packed in canonical attribute order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TextureAttribDesc {
    /// UV scale (xy) and offset (zw).
    pub uv_scale_offset: Vec4,
    /// UV rotation in radians.
    pub rotation: f32,
    /// UV set selector.
    pub texcoord: u32,
    /// Stable attribute index from the settings registry.
    pub attrib_index: u32,
    /// Slice when the source lives in a texture array / streamed atlas.
    pub array_slice: u32,
}

pub const TEXTURE_ATTRIB_DESC_SIZE: usize = size_of::<TextureAttribDesc>();

// ─── Schema ──────────────────────────────────────────────────────────────────

/// One fixed-order block of the per-primitive layout.
struct AttribBlock {
    name: &'static str,
    size: usize,
    present: fn(FeatureFlags) -> bool,
    /// Field list contributed to the WGSL `PrimitiveAttribs` struct.
    wgsl_fields: &'static str,
}

fn always(_: FeatureFlags) -> bool {
    true
}

/// The layout contract. Order is load-bearing: writer, size query, and WGSL
/// generator all iterate this table front to back.
const SCHEMA: &[AttribBlock] = &[
    AttribBlock {
        name: "node",
        size: size_of::<NodeAttribs>(),
        present: always,
        // Scalar pads on purpose: a vec3 pad would realign to 16 bytes in
        // the uniform address space and shift every following block.
        wgsl_fields: "    node_matrix: mat4x4<f32>,\n    joint_count: u32,\n    _pad_node_0: u32,\n    _pad_node_1: u32,\n    _pad_node_2: u32,",
    },
    AttribBlock {
        name: "prev_node",
        size: size_of::<PrevNodeAttribs>(),
        present: |f| f.contains(FeatureFlags::MOTION_VECTORS),
        wgsl_fields: "    prev_node_matrix: mat4x4<f32>,",
    },
    AttribBlock {
        name: "material",
        size: size_of::<MaterialBasicAttribs>(),
        present: always,
        wgsl_fields: "    base_color_factor: vec4<f32>,\n    emissive_factor: vec3<f32>,\n    normal_scale: f32,\n    metallic_factor: f32,\n    roughness_factor: f32,\n    occlusion_strength: f32,\n    alpha_cutoff: f32,",
    },
    AttribBlock {
        name: "clearcoat",
        size: size_of::<ClearcoatAttribs>(),
        present: |f| f.contains(FeatureFlags::CLEARCOAT),
        wgsl_fields: "    clearcoat_factor: f32,\n    clearcoat_roughness_factor: f32,\n    _pad_clearcoat: vec2<f32>,",
    },
    AttribBlock {
        name: "sheen",
        size: size_of::<SheenAttribs>(),
        present: |f| f.contains(FeatureFlags::SHEEN),
        wgsl_fields: "    sheen_color_factor: vec3<f32>,\n    sheen_roughness_factor: f32,",
    },
    AttribBlock {
        name: "anisotropy",
        size: size_of::<AnisotropyAttribs>(),
        present: |f| f.contains(FeatureFlags::ANISOTROPY),
        wgsl_fields: "    anisotropy_strength: f32,\n    anisotropy_rotation: f32,\n    _pad_anisotropy: vec2<f32>,",
    },
    AttribBlock {
        name: "iridescence",
        size: size_of::<IridescenceAttribs>(),
        present: |f| f.contains(FeatureFlags::IRIDESCENCE),
        wgsl_fields: "    iridescence_factor: f32,\n    iridescence_ior: f32,\n    iridescence_thickness_min: f32,\n    iridescence_thickness_max: f32,",
    },
    AttribBlock {
        name: "transmission",
        size: size_of::<TransmissionAttribs>(),
        present: |f| f.contains(FeatureFlags::TRANSMISSION),
        wgsl_fields: "    transmission_factor: f32,\n    _pad_transmission_0: f32,\n    _pad_transmission_1: f32,\n    _pad_transmission_2: f32,",
    },
    AttribBlock {
        name: "volume",
        size: size_of::<VolumeAttribs>(),
        present: |f| f.contains(FeatureFlags::VOLUME),
        wgsl_fields: "    attenuation_color: vec3<f32>,\n    thickness_factor: f32,\n    attenuation_distance: f32,\n    _pad_volume_0: f32,\n    _pad_volume_1: f32,\n    _pad_volume_2: f32,",
    },
];

// ─── Size query ──────────────────────────────────────────────────────────────

/// Exact byte count [`write_attribs`] produces for `flags` plus
/// `custom_len` trailing bytes.
///
/// Deterministic and cheap; callers size the destination buffer with it
/// before any frame that may change the active flag set.
#[must_use]
pub fn attribs_size(flags: FeatureFlags, custom_len: usize) -> usize {
    let blocks: usize = SCHEMA
        .iter()
        .filter(|b| (b.present)(flags))
        .map(|b| b.size)
        .sum();
    blocks + flags.texture_attrib_count() * TEXTURE_ATTRIB_DESC_SIZE + custom_len
}

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Writes the per-primitive attribute block into `dst`.
///
/// Strict fixed order: node transform (always, carries the clamped joint
/// count), previous transform (iff MOTION_VECTORS), base material constants,
/// per-extension blocks (each iff its enable bit), texture-attribute
/// descriptors (one per set map bit, canonical order), trailing custom data.
///
/// `prev_transform` falls back to `node_transform` when motion vectors are
/// active but the caller has no history yet.
///
/// Returns the byte count written, always equal to
/// `attribs_size(flags, custom.len())`.
pub fn write_attribs(
    dst: &mut [u8],
    settings: &RendererSettings,
    flags: FeatureFlags,
    node_transform: Mat4,
    prev_transform: Option<Mat4>,
    joint_count: u32,
    material: &Material,
    custom: &[u8],
) -> Result<usize> {
    let required = attribs_size(flags, custom.len());
    if required > dst.len() {
        return Err(RenderError::AttributeOverflow {
            required,
            capacity: dst.len(),
        });
    }

    let joint_count = if joint_count > settings.max_joint_count {
        log::warn!(
            "primitive requests {joint_count} joints, clamping to {}",
            settings.max_joint_count
        );
        settings.max_joint_count
    } else {
        joint_count
    };

    let mut cursor = 0usize;
    let mut put = |bytes: &[u8], cursor: &mut usize| {
        dst[*cursor..*cursor + bytes.len()].copy_from_slice(bytes);
        *cursor += bytes.len();
    };

    for block in SCHEMA {
        if !(block.present)(flags) {
            continue;
        }
        let start = cursor;
        match block.name {
            "node" => put(
                bytemuck::bytes_of(&NodeAttribs {
                    node_matrix: node_transform,
                    joint_count,
                    _pad: [0; 3],
                }),
                &mut cursor,
            ),
            "prev_node" => put(
                bytemuck::bytes_of(&PrevNodeAttribs {
                    prev_node_matrix: prev_transform.unwrap_or(node_transform),
                }),
                &mut cursor,
            ),
            "material" => put(
                bytemuck::bytes_of(&MaterialBasicAttribs {
                    base_color_factor: material.base_color_factor,
                    emissive_factor: material.emissive_factor,
                    normal_scale: material.normal_scale,
                    metallic_factor: material.metallic_factor,
                    roughness_factor: material.roughness_factor,
                    occlusion_strength: material.occlusion_strength,
                    alpha_cutoff: match material.alpha_mode {
                        crate::model::AlphaMode::Mask => material.alpha_cutoff,
                        _ => 0.0,
                    },
                }),
                &mut cursor,
            ),
            "clearcoat" => {
                let cc = material.clearcoat.unwrap_or(crate::model::Clearcoat {
                    factor: 0.0,
                    roughness_factor: 0.0,
                });
                put(
                    bytemuck::bytes_of(&ClearcoatAttribs {
                        factor: cc.factor,
                        roughness_factor: cc.roughness_factor,
                        _pad: [0.0; 2],
                    }),
                    &mut cursor,
                );
            }
            "sheen" => {
                let sheen = material.sheen.unwrap_or(crate::model::Sheen {
                    color_factor: Vec3::ZERO,
                    roughness_factor: 0.0,
                });
                put(
                    bytemuck::bytes_of(&SheenAttribs {
                        color_factor: sheen.color_factor,
                        roughness_factor: sheen.roughness_factor,
                    }),
                    &mut cursor,
                );
            }
            "anisotropy" => {
                let aniso = material.anisotropy.unwrap_or(crate::model::Anisotropy {
                    strength: 0.0,
                    rotation: 0.0,
                });
                put(
                    bytemuck::bytes_of(&AnisotropyAttribs {
                        strength: aniso.strength,
                        rotation: aniso.rotation,
                        _pad: [0.0; 2],
                    }),
                    &mut cursor,
                );
            }
            "iridescence" => {
                let irid = material.iridescence.unwrap_or(crate::model::Iridescence {
                    factor: 0.0,
                    ior: 1.3,
                    thickness_min: 100.0,
                    thickness_max: 400.0,
                });
                put(
                    bytemuck::bytes_of(&IridescenceAttribs {
                        factor: irid.factor,
                        ior: irid.ior,
                        thickness_min: irid.thickness_min,
                        thickness_max: irid.thickness_max,
                    }),
                    &mut cursor,
                );
            }
            "transmission" => {
                let t = material
                    .transmission
                    .map_or(0.0, |t| t.factor);
                put(
                    bytemuck::bytes_of(&TransmissionAttribs {
                        factor: t,
                        _pad: [0.0; 3],
                    }),
                    &mut cursor,
                );
            }
            "volume" => {
                let vol = material.volume.unwrap_or(crate::model::Volume {
                    thickness_factor: 0.0,
                    attenuation_distance: f32::MAX,
                    attenuation_color: Vec3::ONE,
                });
                put(
                    bytemuck::bytes_of(&VolumeAttribs {
                        attenuation_color: vol.attenuation_color,
                        thickness_factor: vol.thickness_factor,
                        attenuation_distance: vol.attenuation_distance,
                        _pad: [0.0; 3],
                    }),
                    &mut cursor,
                );
            }
            _ => unreachable!("unknown schema block"),
        }
        debug_assert_eq!(cursor - start, block.size, "block '{}' size drift", block.name);
    }

    for attrib in flags.texture_attribs() {
        let binding = material
            .texture(attrib)
            .copied()
            .unwrap_or_default();
        let desc = TextureAttribDesc {
            uv_scale_offset: binding.uv_scale_offset,
            rotation: binding.rotation,
            texcoord: binding.texcoord,
            attrib_index: settings.texture_attrib_index(attrib).unwrap_or(0),
            array_slice: 0,
        };
        put(bytemuck::bytes_of(&desc), &mut cursor);
    }

    if !custom.is_empty() {
        put(custom, &mut cursor);
    }

    debug_assert_eq!(cursor, required);
    Ok(cursor)
}

// ─── WGSL struct generation ──────────────────────────────────────────────────

/// Emits the shader-side `PrimitiveAttribs` struct for `flags`, field for
/// field the mirror of what [`write_attribs`] produces.
///
/// The trailing custom-data block is caller-defined and intentionally not
/// part of the generated struct.
#[must_use]
pub fn attribs_struct_wgsl(flags: FeatureFlags) -> String {
    let mut out = String::new();

    let tex_count = flags.texture_attrib_count();
    if tex_count > 0 {
        out.push_str(
            "struct TextureAttribDesc {\n    uv_scale_offset: vec4<f32>,\n    rotation: f32,\n    texcoord: u32,\n    attrib_index: u32,\n    array_slice: u32,\n};\n\n",
        );
    }

    out.push_str("struct PrimitiveAttribs {\n");
    for block in SCHEMA {
        if (block.present)(flags) {
            out.push_str(block.wgsl_fields);
            out.push('\n');
        }
    }
    if tex_count > 0 {
        out.push_str(&format!(
            "    tex_attribs: array<TextureAttribDesc, {tex_count}>,\n"
        ));
    }
    out.push_str("};\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_16_byte_aligned() {
        for block in SCHEMA {
            assert_eq!(block.size % 16, 0, "block '{}' not 16-aligned", block.name);
        }
        assert_eq!(TEXTURE_ATTRIB_DESC_SIZE % 16, 0);
    }

    #[test]
    fn minimal_size_is_node_plus_material() {
        let size = attribs_size(FeatureFlags::empty(), 0);
        assert_eq!(
            size,
            size_of::<NodeAttribs>() + size_of::<MaterialBasicAttribs>()
        );
    }
}
