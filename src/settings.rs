//! Renderer Settings
//!
//! [`RendererSettings`] is consumed once at renderer construction and fixes
//! everything a compiled variant may depend on globally: which optional
//! features are compiled in, the render-target formats, the texture-attribute
//! index registry, and the pipeline-compilation mode.
//!
//! Per-draw state (alpha mode, double-sidedness, the active feature subset)
//! lives in the pipeline variant key instead — see
//! [`VariantKey`](crate::pipeline::VariantKey).

use crate::features::{FeatureFlags, TextureAttrib};

// ---------------------------------------------------------------------------
// DebugView
// ---------------------------------------------------------------------------

/// Debug visualization selector, folded into the pipeline key.
///
/// Anything other than [`DebugView::None`] replaces the shaded output with
/// the selected intermediate term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugView {
    #[default]
    None,
    BaseColor,
    Normals,
    Occlusion,
    Roughness,
    Metallic,
    Emissive,
    MotionVectors,
}

impl DebugView {
    /// Numeric value emitted as the `DEBUG_VIEW` macro.
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::None => 0,
            Self::BaseColor => 1,
            Self::Normals => 2,
            Self::Occlusion => 3,
            Self::Roughness => 4,
            Self::Metallic => 5,
            Self::Emissive => 6,
            Self::MotionVectors => 7,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global renderer configuration.
///
/// | Field                | Description                                  | Default          |
/// |----------------------|----------------------------------------------|------------------|
/// | `supported_features` | Features compiled into shader variants       | all              |
/// | `color_format`       | Scene color attachment format                | `Rgba16Float`    |
/// | `depth_format`       | Depth attachment format                      | `Depth32Float`   |
/// | `sample_count`       | MSAA sample count                            | 1                |
/// | `max_joint_count`    | Reserved skinning-matrix capacity            | 64               |
/// | `async_pipelines`    | Defer PSO creation behind readiness polling  | `false`          |
/// | `packed_texture_arrays` | Bind material textures as one indexed array | `false`       |
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// Mask of features the renderer was built with. Bits outside this mask
    /// are cleared by [`FeatureFlags::normalize`].
    pub supported_features: FeatureFlags,

    /// Color attachment format for the shaded scene.
    pub color_format: wgpu::TextureFormat,

    /// Depth attachment format. `Depth32Float` is expected by the PostFX
    /// depth-prefilter chain.
    pub depth_format: wgpu::TextureFormat,

    /// MSAA sample count. The PostFX path requires 1.
    pub sample_count: u32,

    /// Reserved joint-matrix capacity per frame. Primitives requesting more
    /// joints are clamped (with a warning), never dropped.
    pub max_joint_count: u32,

    /// Request asynchronous pipeline creation; techniques poll readiness and
    /// substitute placeholder output until compiled.
    pub async_pipelines: bool,

    /// Bind material textures through one indexed texture array rather than
    /// individual named slots (for binding-slot-starved targets).
    pub packed_texture_arrays: bool,

    /// Stable attribute index per canonical texture attribute.
    /// `None` = attribute not registered; requesting its map bit is a
    /// configuration error and the bit is treated as unsupported.
    texture_attrib_indices: [Option<u32>; TextureAttrib::CANONICAL.len()],
}

impl Default for RendererSettings {
    fn default() -> Self {
        let mut indices = [None; TextureAttrib::CANONICAL.len()];
        for (i, slot) in indices.iter_mut().enumerate() {
            *slot = Some(i as u32);
        }
        Self {
            supported_features: FeatureFlags::all(),
            color_format: wgpu::TextureFormat::Rgba16Float,
            depth_format: wgpu::TextureFormat::Depth32Float,
            sample_count: 1,
            max_joint_count: 64,
            async_pipelines: false,
            packed_texture_arrays: false,
            texture_attrib_indices: indices,
        }
    }
}

impl RendererSettings {
    /// Restricts the compiled-in feature set.
    #[must_use]
    pub fn with_supported_features(mut self, features: FeatureFlags) -> Self {
        self.supported_features = features;
        self
    }

    /// Settings with no texture attributes registered. Every map bit will
    /// normalize away until attributes are registered explicitly.
    #[must_use]
    pub fn without_registered_attribs(mut self) -> Self {
        self.texture_attrib_indices = [None; TextureAttrib::CANONICAL.len()];
        self
    }

    /// Registers `attrib`, assigning the next free stable index.
    ///
    /// Indices are assigned once and never reused for the lifetime of the
    /// settings; re-registering returns the existing index.
    pub fn register_texture_attrib(&mut self, attrib: TextureAttrib) -> u32 {
        let slot = Self::slot_of(attrib);
        if let Some(idx) = self.texture_attrib_indices[slot] {
            return idx;
        }
        let next = self
            .texture_attrib_indices
            .iter()
            .flatten()
            .copied()
            .max()
            .map_or(0, |m| m + 1);
        self.texture_attrib_indices[slot] = Some(next);
        next
    }

    /// Returns the registered index of `attrib`, if any.
    #[must_use]
    pub fn texture_attrib_index(&self, attrib: TextureAttrib) -> Option<u32> {
        self.texture_attrib_indices[Self::slot_of(attrib)]
    }

    fn slot_of(attrib: TextureAttrib) -> usize {
        TextureAttrib::CANONICAL
            .iter()
            .position(|a| *a == attrib)
            .expect("attrib is canonical")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registers_all_attribs_in_canonical_order() {
        let settings = RendererSettings::default();
        for (i, attrib) in TextureAttrib::CANONICAL.iter().enumerate() {
            assert_eq!(settings.texture_attrib_index(*attrib), Some(i as u32));
        }
    }

    #[test]
    fn registration_assigns_stable_indices() {
        let mut settings = RendererSettings::default().without_registered_attribs();
        let a = settings.register_texture_attrib(TextureAttrib::Normal);
        let b = settings.register_texture_attrib(TextureAttrib::BaseColor);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        // Re-registering never reassigns.
        assert_eq!(settings.register_texture_attrib(TextureAttrib::Normal), 0);
    }
}
