//! Shader Feature Flags
//!
//! A [`FeatureFlags`] bitmask selects which optional shading and
//! post-processing capabilities are active for a compiled variant. The bits
//! form a lattice: each `ENABLE_*` extension bit gates a set of `*_MAP`
//! sub-bits, and [`FeatureFlags::normalize`] enforces the lattice before any
//! cache lookup. Two flag sets that normalize equal always resolve to the
//! same compiled pipeline.
//!
//! The texture-attribute side of the system assigns every optional texture
//! a stable position in [`TextureAttrib::CANONICAL`]; per-primitive
//! attribute descriptors and the packed texture-array binding mode both rely
//! on that order being fixed.

use bitflags::bitflags;

use crate::settings::RendererSettings;

bitflags! {
    /// Per-variant shading / post-processing feature selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u64 {
        // ---- Base material texture maps ----
        const BASE_COLOR_MAP          = 1 << 0;
        const NORMAL_MAP              = 1 << 1;
        const METALLIC_ROUGHNESS_MAP  = 1 << 2;
        const OCCLUSION_MAP           = 1 << 3;
        const EMISSIVE_MAP            = 1 << 4;

        // ---- Material extension toggles (lattice parents) ----
        const CLEARCOAT               = 1 << 5;
        const SHEEN                   = 1 << 6;
        const ANISOTROPY              = 1 << 7;
        const IRIDESCENCE             = 1 << 8;
        const TRANSMISSION            = 1 << 9;
        const VOLUME                  = 1 << 10;

        // ---- Extension texture maps (gated by their parent) ----
        const CLEARCOAT_MAP             = 1 << 11;
        const CLEARCOAT_ROUGHNESS_MAP   = 1 << 12;
        const CLEARCOAT_NORMAL_MAP      = 1 << 13;
        const SHEEN_COLOR_MAP           = 1 << 14;
        const SHEEN_ROUGHNESS_MAP       = 1 << 15;
        const ANISOTROPY_MAP            = 1 << 16;
        const IRIDESCENCE_MAP           = 1 << 17;
        const IRIDESCENCE_THICKNESS_MAP = 1 << 18;
        const TRANSMISSION_MAP          = 1 << 19;
        const THICKNESS_MAP             = 1 << 20;

        // ---- Lighting / vertex stream features ----
        const IBL             = 1 << 21;
        const SKINNING        = 1 << 22;
        const MOTION_VECTORS  = 1 << 23;
        const VERTEX_COLORS   = 1 << 24;
        const TEXCOORD1       = 1 << 25;
        const UNSHADED        = 1 << 26;

        // ---- PostFX variant bits ----
        const HALF_RESOLUTION       = 1 << 27;
        const HALF_PRECISION_DEPTH  = 1 << 28;
        const UNIFORM_WEIGHTING     = 1 << 29;
    }
}

/// (parent, children) pairs of the feature lattice.
///
/// Clearing a parent must clear every child; `normalize` walks this table.
const LATTICE: &[(FeatureFlags, FeatureFlags)] = &[
    (
        FeatureFlags::CLEARCOAT,
        FeatureFlags::CLEARCOAT_MAP
            .union(FeatureFlags::CLEARCOAT_ROUGHNESS_MAP)
            .union(FeatureFlags::CLEARCOAT_NORMAL_MAP),
    ),
    (
        FeatureFlags::SHEEN,
        FeatureFlags::SHEEN_COLOR_MAP.union(FeatureFlags::SHEEN_ROUGHNESS_MAP),
    ),
    (FeatureFlags::ANISOTROPY, FeatureFlags::ANISOTROPY_MAP),
    (
        FeatureFlags::IRIDESCENCE,
        FeatureFlags::IRIDESCENCE_MAP.union(FeatureFlags::IRIDESCENCE_THICKNESS_MAP),
    ),
    (FeatureFlags::TRANSMISSION, FeatureFlags::TRANSMISSION_MAP),
    (FeatureFlags::VOLUME, FeatureFlags::THICKNESS_MAP),
];

impl FeatureFlags {
    /// All texture-map bits (base + extension).
    #[must_use]
    pub const fn all_map_bits() -> Self {
        Self::BASE_COLOR_MAP
            .union(Self::NORMAL_MAP)
            .union(Self::METALLIC_ROUGHNESS_MAP)
            .union(Self::OCCLUSION_MAP)
            .union(Self::EMISSIVE_MAP)
            .union(Self::CLEARCOAT_MAP)
            .union(Self::CLEARCOAT_ROUGHNESS_MAP)
            .union(Self::CLEARCOAT_NORMAL_MAP)
            .union(Self::SHEEN_COLOR_MAP)
            .union(Self::SHEEN_ROUGHNESS_MAP)
            .union(Self::ANISOTROPY_MAP)
            .union(Self::IRIDESCENCE_MAP)
            .union(Self::IRIDESCENCE_THICKNESS_MAP)
            .union(Self::TRANSMISSION_MAP)
            .union(Self::THICKNESS_MAP)
    }

    /// Normalizes the flag set for cache lookup.
    ///
    /// 1. Bits the renderer settings do not support are cleared.
    /// 2. Map bits whose lattice parent is absent are cleared.
    /// 3. Map bits whose [`TextureAttrib`] has no registered attribute index
    ///    are treated as unsupported (logged once per call, not fatal).
    ///
    /// Idempotent: `normalize(normalize(f)) == normalize(f)`.
    #[must_use]
    pub fn normalize(self, settings: &RendererSettings) -> Self {
        let mut flags = self & settings.supported_features;

        for &(parent, children) in LATTICE {
            if !flags.contains(parent) {
                flags.remove(children);
            }
        }

        for attrib in TextureAttrib::CANONICAL {
            let bit = attrib.flag();
            if flags.contains(bit) && settings.texture_attrib_index(*attrib).is_none() {
                log::error!(
                    "texture attribute '{}' requested without a registered index; \
                     treating as unsupported",
                    attrib.name()
                );
                flags.remove(bit);
            }
        }

        flags
    }

    /// Number of texture-attribute descriptors a primitive with these flags
    /// carries (one per set map bit).
    #[must_use]
    pub fn texture_attrib_count(self) -> usize {
        (self & Self::all_map_bits()).bits().count_ones() as usize
    }

    /// Iterates the set texture attributes in canonical order.
    pub fn texture_attribs(self) -> impl Iterator<Item = TextureAttrib> {
        TextureAttrib::CANONICAL
            .iter()
            .copied()
            .filter(move |a| self.contains(a.flag()))
    }
}

// ─── Texture Attributes ──────────────────────────────────────────────────────

/// One optional material texture, identified by its canonical position.
///
/// The order of [`CANONICAL`](Self::CANONICAL) is a layout contract: the
/// per-primitive attribute descriptor array and the packed texture-array
/// binding indices both follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureAttrib {
    BaseColor,
    Normal,
    MetallicRoughness,
    Occlusion,
    Emissive,
    Clearcoat,
    ClearcoatRoughness,
    ClearcoatNormal,
    SheenColor,
    SheenRoughness,
    Anisotropy,
    Iridescence,
    IridescenceThickness,
    Transmission,
    Thickness,
}

impl TextureAttrib {
    /// Canonical, order-stable attribute list.
    pub const CANONICAL: &'static [TextureAttrib] = &[
        Self::BaseColor,
        Self::Normal,
        Self::MetallicRoughness,
        Self::Occlusion,
        Self::Emissive,
        Self::Clearcoat,
        Self::ClearcoatRoughness,
        Self::ClearcoatNormal,
        Self::SheenColor,
        Self::SheenRoughness,
        Self::Anisotropy,
        Self::Iridescence,
        Self::IridescenceThickness,
        Self::Transmission,
        Self::Thickness,
    ];

    /// The feature bit selecting this attribute's map.
    #[must_use]
    pub const fn flag(self) -> FeatureFlags {
        match self {
            Self::BaseColor => FeatureFlags::BASE_COLOR_MAP,
            Self::Normal => FeatureFlags::NORMAL_MAP,
            Self::MetallicRoughness => FeatureFlags::METALLIC_ROUGHNESS_MAP,
            Self::Occlusion => FeatureFlags::OCCLUSION_MAP,
            Self::Emissive => FeatureFlags::EMISSIVE_MAP,
            Self::Clearcoat => FeatureFlags::CLEARCOAT_MAP,
            Self::ClearcoatRoughness => FeatureFlags::CLEARCOAT_ROUGHNESS_MAP,
            Self::ClearcoatNormal => FeatureFlags::CLEARCOAT_NORMAL_MAP,
            Self::SheenColor => FeatureFlags::SHEEN_COLOR_MAP,
            Self::SheenRoughness => FeatureFlags::SHEEN_ROUGHNESS_MAP,
            Self::Anisotropy => FeatureFlags::ANISOTROPY_MAP,
            Self::Iridescence => FeatureFlags::IRIDESCENCE_MAP,
            Self::IridescenceThickness => FeatureFlags::IRIDESCENCE_THICKNESS_MAP,
            Self::Transmission => FeatureFlags::TRANSMISSION_MAP,
            Self::Thickness => FeatureFlags::THICKNESS_MAP,
        }
    }

    /// Shader-facing attribute name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BaseColor => "base_color",
            Self::Normal => "normal",
            Self::MetallicRoughness => "metallic_roughness",
            Self::Occlusion => "occlusion",
            Self::Emissive => "emissive",
            Self::Clearcoat => "clearcoat",
            Self::ClearcoatRoughness => "clearcoat_roughness",
            Self::ClearcoatNormal => "clearcoat_normal",
            Self::SheenColor => "sheen_color",
            Self::SheenRoughness => "sheen_roughness",
            Self::Anisotropy => "anisotropy",
            Self::Iridescence => "iridescence",
            Self::IridescenceThickness => "iridescence_thickness",
            Self::Transmission => "transmission",
            Self::Thickness => "thickness",
        }
    }

    /// The macro this attribute's map bit emits.
    #[must_use]
    pub const fn define(self) -> &'static str {
        match self {
            Self::BaseColor => "USE_BASE_COLOR_MAP",
            Self::Normal => "USE_NORMAL_MAP",
            Self::MetallicRoughness => "USE_METALLIC_ROUGHNESS_MAP",
            Self::Occlusion => "USE_OCCLUSION_MAP",
            Self::Emissive => "USE_EMISSIVE_MAP",
            Self::Clearcoat => "USE_CLEARCOAT_MAP",
            Self::ClearcoatRoughness => "USE_CLEARCOAT_ROUGHNESS_MAP",
            Self::ClearcoatNormal => "USE_CLEARCOAT_NORMAL_MAP",
            Self::SheenColor => "USE_SHEEN_COLOR_MAP",
            Self::SheenRoughness => "USE_SHEEN_ROUGHNESS_MAP",
            Self::Anisotropy => "USE_ANISOTROPY_MAP",
            Self::Iridescence => "USE_IRIDESCENCE_MAP",
            Self::IridescenceThickness => "USE_IRIDESCENCE_THICKNESS_MAP",
            Self::Transmission => "USE_TRANSMISSION_MAP",
            Self::Thickness => "USE_THICKNESS_MAP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order_matches_bit_order() {
        // Descriptor packing iterates CANONICAL; the flag bits must ascend
        // with it so `texture_attribs()` yields a stable order.
        let bits: Vec<u64> = TextureAttrib::CANONICAL
            .iter()
            .map(|a| a.flag().bits())
            .collect();
        assert!(bits.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lattice_children_are_map_bits() {
        for (_, children) in LATTICE {
            assert!(FeatureFlags::all_map_bits().contains(*children));
        }
    }
}
