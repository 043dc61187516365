//! Feature-Flag System Tests
//!
//! Tests for:
//! - FeatureFlags::normalize: idempotence, lattice enforcement, settings
//!   masking, unregistered-attribute clearing
//! - ShaderDefines: canonical macro derivation, order independence
//! - TextureAttrib: canonical ordering contract

use prism::defines::ShaderDefines;
use prism::features::{FeatureFlags, TextureAttrib};
use prism::model::AlphaMode;
use prism::settings::{DebugView, RendererSettings};

/// A spread of representative flag sets, including deliberately
/// inconsistent ones (children without parents).
fn sample_flag_sets() -> Vec<FeatureFlags> {
    vec![
        FeatureFlags::empty(),
        FeatureFlags::all(),
        FeatureFlags::NORMAL_MAP | FeatureFlags::BASE_COLOR_MAP,
        FeatureFlags::SHEEN_COLOR_MAP, // orphan child
        FeatureFlags::SHEEN | FeatureFlags::SHEEN_COLOR_MAP,
        FeatureFlags::CLEARCOAT_NORMAL_MAP | FeatureFlags::IRIDESCENCE_MAP,
        FeatureFlags::TRANSMISSION | FeatureFlags::VOLUME | FeatureFlags::THICKNESS_MAP,
        FeatureFlags::SKINNING | FeatureFlags::MOTION_VECTORS,
        FeatureFlags::IBL | FeatureFlags::HALF_RESOLUTION,
    ]
}

// ============================================================================
// Normalization
// ============================================================================

#[test]
fn normalize_is_idempotent() {
    let settings = RendererSettings::default();
    for flags in sample_flag_sets() {
        let once = flags.normalize(&settings);
        let twice = once.normalize(&settings);
        assert_eq!(once, twice, "normalize not idempotent for {flags:?}");
    }
}

#[test]
fn lattice_clears_children_without_parent() {
    let settings = RendererSettings::default();

    let cases = [
        (
            FeatureFlags::SHEEN,
            FeatureFlags::SHEEN_COLOR_MAP | FeatureFlags::SHEEN_ROUGHNESS_MAP,
        ),
        (
            FeatureFlags::CLEARCOAT,
            FeatureFlags::CLEARCOAT_MAP
                | FeatureFlags::CLEARCOAT_ROUGHNESS_MAP
                | FeatureFlags::CLEARCOAT_NORMAL_MAP,
        ),
        (FeatureFlags::ANISOTROPY, FeatureFlags::ANISOTROPY_MAP),
        (
            FeatureFlags::IRIDESCENCE,
            FeatureFlags::IRIDESCENCE_MAP | FeatureFlags::IRIDESCENCE_THICKNESS_MAP,
        ),
        (FeatureFlags::TRANSMISSION, FeatureFlags::TRANSMISSION_MAP),
        (FeatureFlags::VOLUME, FeatureFlags::THICKNESS_MAP),
    ];

    for (parent, children) in cases {
        // Children alone: everything cleared.
        let normalized = children.normalize(&settings);
        assert!(
            !normalized.intersects(children),
            "children of {parent:?} survived without parent"
        );

        // With the parent: children survive.
        let normalized = (parent | children).normalize(&settings);
        assert!(normalized.contains(parent));
        assert!(normalized.contains(children));
    }
}

#[test]
fn unsupported_bits_are_cleared() {
    let settings = RendererSettings::default()
        .with_supported_features(FeatureFlags::BASE_COLOR_MAP | FeatureFlags::NORMAL_MAP);

    let requested = FeatureFlags::BASE_COLOR_MAP | FeatureFlags::IBL | FeatureFlags::SKINNING;
    let normalized = requested.normalize(&settings);

    assert_eq!(normalized, FeatureFlags::BASE_COLOR_MAP);
}

#[test]
fn unregistered_attribute_is_treated_as_unsupported() {
    let mut settings = RendererSettings::default().without_registered_attribs();
    settings.register_texture_attrib(TextureAttrib::BaseColor);

    let requested = FeatureFlags::BASE_COLOR_MAP | FeatureFlags::NORMAL_MAP;
    let normalized = requested.normalize(&settings);

    assert!(normalized.contains(FeatureFlags::BASE_COLOR_MAP));
    assert!(!normalized.contains(FeatureFlags::NORMAL_MAP));
}

#[test]
fn equal_normalized_sets_from_different_requests() {
    let settings = RendererSettings::default();
    // An orphan sheen map normalizes to the same set as no sheen at all.
    let a = (FeatureFlags::NORMAL_MAP | FeatureFlags::SHEEN_COLOR_MAP).normalize(&settings);
    let b = FeatureFlags::NORMAL_MAP.normalize(&settings);
    assert_eq!(a, b);
}

// ============================================================================
// Macro derivation
// ============================================================================

#[test]
fn equal_flags_produce_equal_macro_sets() {
    let settings = RendererSettings::default();
    for flags in sample_flag_sets() {
        let normalized = flags.normalize(&settings);
        let a = ShaderDefines::from_variant(&settings, normalized, AlphaMode::Opaque, DebugView::None);
        let b = ShaderDefines::from_variant(&settings, normalized, AlphaMode::Opaque, DebugView::None);
        assert_eq!(a, b);
        assert_eq!(a.compute_hash(), b.compute_hash());
    }
}

#[test]
fn texture_map_bits_emit_their_defines() {
    let settings = RendererSettings::default();
    let flags = (FeatureFlags::NORMAL_MAP
        | FeatureFlags::CLEARCOAT
        | FeatureFlags::CLEARCOAT_MAP)
        .normalize(&settings);
    let defines = ShaderDefines::from_variant(&settings, flags, AlphaMode::Opaque, DebugView::None);

    assert!(defines.contains("USE_NORMAL_MAP"));
    assert!(defines.contains("ENABLE_CLEARCOAT"));
    assert!(defines.contains("USE_CLEARCOAT_MAP"));
    assert!(!defines.contains("USE_BASE_COLOR_MAP"));
}

#[test]
fn debug_view_and_skinning_parameterize_macros() {
    let settings = RendererSettings::default();
    let flags = FeatureFlags::SKINNING.normalize(&settings);
    let defines =
        ShaderDefines::from_variant(&settings, flags, AlphaMode::Opaque, DebugView::Normals);

    assert_eq!(defines.get("DEBUG_VIEW"), Some("2"));
    assert_eq!(defines.get("MAX_JOINT_COUNT"), Some("64"));
}

// ============================================================================
// Canonical attribute order
// ============================================================================

#[test]
fn texture_attribs_iterate_in_canonical_order() {
    let flags = FeatureFlags::EMISSIVE_MAP | FeatureFlags::BASE_COLOR_MAP | FeatureFlags::NORMAL_MAP;
    let attribs: Vec<TextureAttrib> = flags.texture_attribs().collect();
    assert_eq!(
        attribs,
        vec![
            TextureAttrib::BaseColor,
            TextureAttrib::Normal,
            TextureAttrib::Emissive
        ]
    );
}

#[test]
fn texture_attrib_count_matches_iteration() {
    for flags in sample_flag_sets() {
        assert_eq!(flags.texture_attrib_count(), flags.texture_attribs().count());
    }
}
