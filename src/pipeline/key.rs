//! Pipeline cache keys.
//!
//! The cache is partitioned coarsely by [`FixedFunctionKey`] (render-target
//! formats, sample count, topology, fill mode — everything a render pass
//! imposes from outside) and finely by [`VariantKey`] (the per-draw state
//! that selects a compiled shader variant). Two draws with equal normalized
//! keys inside one partition must resolve to the same pipeline object.
//!
//! `wgpu` descriptor types used in fullscreen-pass keys do not all implement
//! `Hash`/`Eq`; the mirror types at the bottom extract the identity-relevant
//! fields and derive the traits.

use std::hash::{Hash, Hasher};

use crate::features::FeatureFlags;
use crate::model::AlphaMode;
use crate::settings::{DebugView, RendererSettings};

// ─── Coarse partition ────────────────────────────────────────────────────────

/// Fixed-function state a render pass imposes on every pipeline drawn in it.
///
/// Each distinct value owns its own sub-cache; e.g. the wireframe pass and
/// the shaded pass never share pipelines even for identical variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedFunctionKey {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub topology: wgpu::PrimitiveTopology,
    pub polygon_mode: wgpu::PolygonMode,
}

impl FixedFunctionKey {
    /// The shaded-scene partition for the given settings.
    #[must_use]
    pub fn scene(settings: &RendererSettings) -> Self {
        Self {
            color_format: settings.color_format,
            depth_format: settings.depth_format,
            sample_count: settings.sample_count,
            topology: wgpu::PrimitiveTopology::TriangleList,
            polygon_mode: wgpu::PolygonMode::Fill,
        }
    }

    /// The wireframe partition: same targets, line fill mode.
    #[must_use]
    pub fn wireframe(settings: &RendererSettings) -> Self {
        Self {
            polygon_mode: wgpu::PolygonMode::Line,
            ..Self::scene(settings)
        }
    }
}

// ─── Fine variant key ────────────────────────────────────────────────────────

/// Per-draw pipeline selection state.
///
/// `user_data` is an opaque caller discriminant for variants the renderer
/// itself does not distinguish (e.g. an ID-buffer pass index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VariantKey {
    pub flags: FeatureFlags,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub debug_view: DebugView,
    pub user_data: u32,
}

impl VariantKey {
    /// Returns the key with its flag set normalized against `settings`.
    ///
    /// Cache lookups always operate on normalized keys; equal normalized
    /// keys imply an identical compiled variant.
    #[must_use]
    pub fn normalized(self, settings: &RendererSettings) -> Self {
        Self {
            flags: self.flags.normalize(settings),
            ..self
        }
    }

    /// Cull mode derived from the double-sided attribute.
    #[must_use]
    pub fn cull_mode(self) -> Option<wgpu::Face> {
        if self.double_sided {
            None
        } else {
            Some(wgpu::Face::Back)
        }
    }

    /// Blend state derived from the alpha mode. Mask intentionally shares
    /// the opaque (no-blend) state — discard happens per pixel.
    #[must_use]
    pub fn blend_state(self) -> Option<wgpu::BlendState> {
        match self.alpha_mode {
            AlphaMode::Opaque | AlphaMode::Mask => None,
            AlphaMode::Blend => Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }

    /// Blend variants must not write depth; opaque and mask do.
    #[must_use]
    pub fn depth_write(self) -> bool {
        self.alpha_mode != AlphaMode::Blend
    }
}

// ─── Hashable mirrors for fullscreen-pass keys ───────────────────────────────

/// Hashable mirror of `wgpu::BlendComponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentKey {
    pub src_factor: wgpu::BlendFactor,
    pub dst_factor: wgpu::BlendFactor,
    pub operation: wgpu::BlendOperation,
}

impl From<wgpu::BlendComponent> for BlendComponentKey {
    fn from(b: wgpu::BlendComponent) -> Self {
        Self {
            src_factor: b.src_factor,
            dst_factor: b.dst_factor,
            operation: b.operation,
        }
    }
}

/// Hashable mirror of `wgpu::BlendState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateKey {
    pub color: BlendComponentKey,
    pub alpha: BlendComponentKey,
}

impl From<wgpu::BlendState> for BlendStateKey {
    fn from(b: wgpu::BlendState) -> Self {
        Self {
            color: b.color.into(),
            alpha: b.alpha.into(),
        }
    }
}

/// Hashable mirror of `wgpu::ColorTargetState`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorTargetKey {
    pub format: wgpu::TextureFormat,
    pub blend: Option<BlendStateKey>,
    pub write_mask: u32, // wgpu::ColorWrites bits
}

impl From<wgpu::ColorTargetState> for ColorTargetKey {
    fn from(c: wgpu::ColorTargetState) -> Self {
        Self {
            format: c.format,
            blend: c.blend.map(Into::into),
            write_mask: c.write_mask.bits(),
        }
    }
}

/// Cache key for PostFX / fullscreen techniques.
///
/// These pipelines use a fixed fullscreen-triangle vertex stage, so the key
/// is the final-source hash plus the output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TechniqueKey {
    /// Truncated xxh3-128 hash of the final WGSL source.
    pub shader_hash: u128,
    pub color_targets: smallvec::SmallVec<[ColorTargetKey; 2]>,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// Compute a `u64` hash of any `Hash`-able value using `FxHasher`.
#[inline]
#[must_use]
pub fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_opaque_share_blend_state() {
        let opaque = VariantKey {
            alpha_mode: AlphaMode::Opaque,
            ..VariantKey::default()
        };
        let mask = VariantKey {
            alpha_mode: AlphaMode::Mask,
            ..VariantKey::default()
        };
        assert_eq!(opaque.blend_state(), mask.blend_state());
        assert!(
            VariantKey {
                alpha_mode: AlphaMode::Blend,
                ..VariantKey::default()
            }
            .blend_state()
            .is_some()
        );
    }

    #[test]
    fn double_sided_selects_cull_none() {
        let ds = VariantKey {
            double_sided: true,
            ..VariantKey::default()
        };
        assert_eq!(ds.cull_mode(), None);
        assert_eq!(
            VariantKey::default().cull_mode(),
            Some(wgpu::Face::Back)
        );
    }
}
