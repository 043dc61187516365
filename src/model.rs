//! Scene Input Shapes
//!
//! The asset loader is an external collaborator; these types fix the shape
//! of the data it hands to the renderer: an ordered material list, nodes
//! with resolved global transforms (and optional joint arrays), and
//! primitives referencing vertex/index ranges plus a material index.
//!
//! [`Material::feature_request`] is the bridge into the variant system: it
//! derives the raw (pre-normalization) feature bits from which optional
//! textures and extensions the material carries.

use glam::{Mat4, Vec3, Vec4};

use crate::features::{FeatureFlags, TextureAttrib};

// ─── Alpha Mode ──────────────────────────────────────────────────────────────

/// Material alpha mode; also the dispatch bucket selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Per-pixel discard against `alpha_cutoff`. Shares the opaque PSO.
    Mask,
    /// Hardware alpha blending, drawn last, back-to-front.
    Blend,
}

// ─── Textures ────────────────────────────────────────────────────────────────

/// A GPU texture owned by the loader, referenced by materials.
///
/// The raw `wgpu::Texture` is kept (not just a view) so the binding manager
/// can lazily reinterpret plain 2D sources as 2D-array views when the
/// signature requires array dimensions.
#[derive(Debug)]
pub struct TextureSource {
    pub texture: wgpu::Texture,
    pub label: String,
}

/// A material's reference to one texture slot.
#[derive(Debug, Clone, Copy)]
pub struct TextureBinding {
    /// Index into [`Model::textures`].
    pub source: usize,
    /// UV set selector (0 = TEXCOORD0, 1 = TEXCOORD1).
    pub texcoord: u32,
    /// UV scale (xy) and offset (zw) packed for the attribute descriptor.
    pub uv_scale_offset: Vec4,
    /// UV rotation in radians.
    pub rotation: f32,
}

impl Default for TextureBinding {
    fn default() -> Self {
        Self {
            source: 0,
            texcoord: 0,
            uv_scale_offset: Vec4::new(1.0, 1.0, 0.0, 0.0),
            rotation: 0.0,
        }
    }
}

// ─── Material extensions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Sheen {
    pub color_factor: Vec3,
    pub roughness_factor: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Clearcoat {
    pub factor: f32,
    pub roughness_factor: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Anisotropy {
    pub strength: f32,
    pub rotation: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Iridescence {
    pub factor: f32,
    pub ior: f32,
    pub thickness_min: f32,
    pub thickness_max: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Transmission {
    pub factor: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Volume {
    pub thickness_factor: f32,
    pub attenuation_distance: f32,
    pub attenuation_color: Vec3,
}

// ─── Material ────────────────────────────────────────────────────────────────

/// One material as produced by the loader.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,

    pub base_color_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive_factor: Vec3,

    pub sheen: Option<Sheen>,
    pub clearcoat: Option<Clearcoat>,
    pub anisotropy: Option<Anisotropy>,
    pub iridescence: Option<Iridescence>,
    pub transmission: Option<Transmission>,
    pub volume: Option<Volume>,

    textures: [Option<TextureBinding>; TextureAttrib::CANONICAL.len()],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_factor: Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive_factor: Vec3::ZERO,
            sheen: None,
            clearcoat: None,
            anisotropy: None,
            iridescence: None,
            transmission: None,
            volume: None,
            textures: [None; TextureAttrib::CANONICAL.len()],
        }
    }
}

impl Material {
    /// Sets the texture bound to `attrib`.
    pub fn set_texture(&mut self, attrib: TextureAttrib, binding: TextureBinding) {
        self.textures[Self::slot_of(attrib)] = Some(binding);
    }

    /// Returns the texture bound to `attrib`, if any.
    #[must_use]
    pub fn texture(&self, attrib: TextureAttrib) -> Option<&TextureBinding> {
        self.textures[Self::slot_of(attrib)].as_ref()
    }

    /// Derives the raw feature bits this material requests.
    ///
    /// Map bits for each bound texture, parent bits for each present
    /// extension. The result still has to go through
    /// [`FeatureFlags::normalize`] — a map bit whose extension data is
    /// absent is cleared there.
    #[must_use]
    pub fn feature_request(&self) -> FeatureFlags {
        let mut flags = FeatureFlags::empty();

        for attrib in TextureAttrib::CANONICAL {
            if self.textures[Self::slot_of(*attrib)].is_some() {
                flags |= attrib.flag();
            }
        }

        if self.sheen.is_some() {
            flags |= FeatureFlags::SHEEN;
        }
        if self.clearcoat.is_some() {
            flags |= FeatureFlags::CLEARCOAT;
        }
        if self.anisotropy.is_some() {
            flags |= FeatureFlags::ANISOTROPY;
        }
        if self.iridescence.is_some() {
            flags |= FeatureFlags::IRIDESCENCE;
        }
        if self.transmission.is_some() {
            flags |= FeatureFlags::TRANSMISSION;
        }
        if self.volume.is_some() {
            flags |= FeatureFlags::VOLUME;
        }

        flags
    }

    fn slot_of(attrib: TextureAttrib) -> usize {
        TextureAttrib::CANONICAL
            .iter()
            .position(|a| *a == attrib)
            .expect("attrib is canonical")
    }
}

// ─── Nodes & Primitives ──────────────────────────────────────────────────────

/// One scene-graph node with resolved transforms.
#[derive(Debug, Clone)]
pub struct Node {
    /// World transform for the current frame.
    pub global_transform: Mat4,
    /// World transform of the previous frame (motion vectors).
    pub prev_global_transform: Mat4,
    /// Joint matrices when this node drives a skinned primitive.
    pub joints: Vec<Mat4>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            global_transform: Mat4::IDENTITY,
            prev_global_transform: Mat4::IDENTITY,
            joints: Vec::new(),
        }
    }
}

/// One drawable vertex/index range.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub node_index: usize,
    pub material_index: usize,
    /// First index and count when indexed; `index_count == 0` means
    /// non-indexed drawing of `vertex_count` vertices.
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub vertex_count: u32,
    /// Vertex-stream feature bits (VERTEX_COLORS, TEXCOORD1, SKINNING).
    pub vertex_features: FeatureFlags,
}

/// A loaded model: the renderer's per-scene input.
#[derive(Debug, Default)]
pub struct Model {
    pub materials: Vec<Material>,
    pub textures: Vec<TextureSource>,
    pub nodes: Vec<Node>,
    pub primitives: Vec<Primitive>,
    /// De-interleaved vertex streams keyed by canonical stream name
    /// (`position`, `normal`, `uv0`, ...).
    pub vertex_streams: Vec<(String, wgpu::Buffer)>,
    pub index_buffer: Option<wgpu::Buffer>,
}

impl Model {
    /// Looks up a vertex stream buffer by canonical name.
    #[must_use]
    pub fn stream_buffer(&self, name: &str) -> Option<&wgpu::Buffer> {
        self.vertex_streams
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }

    /// Looks up the node of a primitive, `None` when the loader produced a
    /// dangling index (a recoverable per-draw error at dispatch time).
    #[must_use]
    pub fn node_of(&self, primitive: &Primitive) -> Option<&Node> {
        self.nodes.get(primitive.node_index)
    }

    /// Looks up the material of a primitive.
    #[must_use]
    pub fn material_of(&self, primitive: &Primitive) -> Option<&Material> {
        self.materials.get(primitive.material_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_request_tracks_textures_and_extensions() {
        let mut material = Material::default();
        material.set_texture(TextureAttrib::BaseColor, TextureBinding::default());
        material.sheen = Some(Sheen {
            color_factor: Vec3::ONE,
            roughness_factor: 0.3,
        });

        let flags = material.feature_request();
        assert!(flags.contains(FeatureFlags::BASE_COLOR_MAP));
        assert!(flags.contains(FeatureFlags::SHEEN));
        assert!(!flags.contains(FeatureFlags::CLEARCOAT));
    }
}
