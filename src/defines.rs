//! Shader Macro Definition System
//!
//! A [`ShaderDefines`] set is the canonical, order-independent macro form of
//! a feature-flag combination: interned `(key, value)` symbol pairs held in
//! sorted order, so identical macro sets always hash identically regardless
//! of insertion order.
//!
//! [`ShaderDefines::from_variant`] is the macro builder of the variant-key
//! system: a pure function of renderer settings plus the normalized flag set,
//! fully determining shader source generation.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::features::{FeatureFlags, TextureAttrib};
use crate::model::AlphaMode;
use crate::settings::{DebugView, RendererSettings};
use crate::utils::interner::{self, Symbol};

/// A collection of shader macro definitions.
///
/// Internally an ordered `Vec<(Symbol, Symbol)>`; insertion keeps the vector
/// sorted by key symbol so equal sets are bitwise-equal slices.
#[derive(Debug, Clone, Default)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, Symbol)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    /// Builds the canonical macro set for one pipeline variant.
    ///
    /// Pure function of `(settings, flags, alpha_mode, debug_view)`; the
    /// caller must pass flags that already went through
    /// [`FeatureFlags::normalize`].
    #[must_use]
    pub fn from_variant(
        settings: &RendererSettings,
        flags: FeatureFlags,
        alpha_mode: AlphaMode,
        debug_view: DebugView,
    ) -> Self {
        let mut defines = Self::with_capacity(24);

        for attrib in flags.texture_attribs() {
            defines.set(attrib.define(), "1");
        }

        const PARENTS: &[(FeatureFlags, &str)] = &[
            (FeatureFlags::CLEARCOAT, "ENABLE_CLEARCOAT"),
            (FeatureFlags::SHEEN, "ENABLE_SHEEN"),
            (FeatureFlags::ANISOTROPY, "ENABLE_ANISOTROPY"),
            (FeatureFlags::IRIDESCENCE, "ENABLE_IRIDESCENCE"),
            (FeatureFlags::TRANSMISSION, "ENABLE_TRANSMISSION"),
            (FeatureFlags::VOLUME, "ENABLE_VOLUME"),
            (FeatureFlags::IBL, "USE_IBL"),
            (FeatureFlags::SKINNING, "ENABLE_SKINNING"),
            (FeatureFlags::MOTION_VECTORS, "ENABLE_MOTION_VECTORS"),
            (FeatureFlags::VERTEX_COLORS, "USE_VERTEX_COLORS"),
            (FeatureFlags::TEXCOORD1, "USE_TEXCOORD1"),
            (FeatureFlags::UNSHADED, "UNSHADED"),
        ];
        for &(bit, name) in PARENTS {
            if flags.contains(bit) {
                defines.set(name, "1");
            }
        }

        // Opaque and Mask share a compiled module: the per-pixel discard is
        // driven by the alpha-cutoff attribute (0 disables it), so only
        // Blend changes the generated source.
        if alpha_mode == AlphaMode::Blend {
            defines.set("ALPHA_MODE_BLEND", "1");
        }

        if debug_view != DebugView::None {
            defines.set("DEBUG_VIEW", &debug_view.index().to_string());
        }

        if flags.contains(FeatureFlags::SKINNING) {
            defines.set("MAX_JOINT_COUNT", &settings.max_joint_count.to_string());
        }

        if settings.packed_texture_arrays {
            defines.set("PACKED_TEXTURE_ARRAY", "1");
            // The array-slot macro per attribute lets the template index the
            // packed array with a compile-time constant.
            for attrib in flags.texture_attribs() {
                if let Some(idx) = settings.texture_attrib_index(attrib) {
                    defines.set(
                        &format!("{}_ATTRIB_INDEX", attrib.define()),
                        &idx.to_string(),
                    );
                }
            }
        }

        defines
    }

    /// Canonical macro set for one PostFX technique variant.
    #[must_use]
    pub fn from_postfx(flags: FeatureFlags) -> Self {
        let mut defines = Self::with_capacity(4);
        const BITS: &[(FeatureFlags, &str)] = &[
            (FeatureFlags::HALF_RESOLUTION, "HALF_RESOLUTION"),
            (FeatureFlags::HALF_PRECISION_DEPTH, "HALF_PRECISION_DEPTH"),
            (FeatureFlags::UNIFORM_WEIGHTING, "UNIFORM_WEIGHTING"),
        ];
        for &(bit, name) in BITS {
            if flags.contains(bit) {
                defines.set(name, "1");
            }
        }
        defines
    }

    /// Sets a define (maintains sorted order). Existing keys are updated.
    pub fn set(&mut self, key: &str, value: &str) {
        let key_sym = interner::intern(key);
        let value_sym = interner::intern(value);
        self.set_symbol(key_sym, value_sym);
    }

    #[inline]
    pub fn set_symbol(&mut self, key: Symbol, value: Symbol) {
        match self.defines.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(idx) => {
                self.defines[idx].1 = value;
            }
            Err(idx) => {
                self.defines.insert(idx, (key, value));
            }
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        interner::get(key).is_some_and(|key_sym| {
            self.defines
                .binary_search_by_key(&key_sym, |&(k, _)| k)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'static str> {
        let key_sym = interner::get(key)?;
        self.defines
            .binary_search_by_key(&key_sym, |&(k, _)| k)
            .ok()
            .map(|idx| interner::resolve(self.defines[idx].1))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Merges another set into this one; `other` wins on conflicts.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for &(key, value) in &other.defines {
            self.set_symbol(key, value);
        }
    }

    /// Iterates all defines as strings.
    #[inline]
    pub fn iter_strings(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), interner::resolve(v)))
    }

    /// Converts to a `BTreeMap` for template rendering.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter_strings()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Content hash for cache keys.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderDefines {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderDefines {}

impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::with_capacity(defines.len());
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut defines = ShaderDefines::new();
        defines.set("USE_NORMAL_MAP", "1");
        defines.set("MAX_JOINT_COUNT", "64");

        assert!(defines.contains("USE_NORMAL_MAP"));
        assert!(!defines.contains("USE_OCCLUSION_MAP"));
        assert_eq!(defines.get("MAX_JOINT_COUNT"), Some("64"));
    }

    #[test]
    fn test_hash_is_order_independent() {
        let mut d1 = ShaderDefines::new();
        d1.set("A", "1");
        d1.set("B", "2");

        let mut d2 = ShaderDefines::new();
        d2.set("B", "2");
        d2.set("A", "1");

        assert_eq!(d1, d2);
        assert_eq!(d1.compute_hash(), d2.compute_hash());
    }

    #[test]
    fn test_merge_overrides() {
        let mut d1 = ShaderDefines::from(&[("A", "1"), ("B", "2")][..]);
        let d2 = ShaderDefines::from(&[("B", "3"), ("C", "4")][..]);

        d1.merge(&d2);

        assert_eq!(d1.get("A"), Some("1"));
        assert_eq!(d1.get("B"), Some("3"));
        assert_eq!(d1.get("C"), Some("4"));
    }

    #[test]
    fn variant_macros_track_flags() {
        let settings = RendererSettings::default();
        let flags = (FeatureFlags::NORMAL_MAP | FeatureFlags::SHEEN | FeatureFlags::SHEEN_COLOR_MAP)
            .normalize(&settings);
        let defines =
            ShaderDefines::from_variant(&settings, flags, AlphaMode::Opaque, DebugView::None);

        assert!(defines.contains("USE_NORMAL_MAP"));
        assert!(defines.contains("ENABLE_SHEEN"));
        assert!(defines.contains("USE_SHEEN_COLOR_MAP"));
        assert!(!defines.contains("ENABLE_CLEARCOAT"));
        // Opaque and Mask must produce identical macro sets (shared PSO).
        let mask = ShaderDefines::from_variant(&settings, flags, AlphaMode::Mask, DebugView::None);
        assert_eq!(defines, mask);
        let blend =
            ShaderDefines::from_variant(&settings, flags, AlphaMode::Blend, DebugView::None);
        assert!(blend.contains("ALPHA_MODE_BLEND"));
    }
}
