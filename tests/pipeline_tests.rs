//! Pipeline Cache Tests
//!
//! Tests for:
//! - Dedup guarantee: equal normalized keys resolve to one pipeline with
//!   exactly one factory invocation
//! - Mask/opaque aliasing of a single compiled pipeline
//! - create_if_missing=false having no side effects
//! - No negative caching after a failed compile
//! - Fixed-function partitioning
//! - Vertex layout generation
//!
//! The cache is generic over the pipeline type, so these run against a
//! counting factory with no GPU device.

use prism::error::RenderError;
use prism::features::FeatureFlags;
use prism::model::AlphaMode;
use prism::pipeline::{FixedFunctionKey, PipelineCache, VariantKey, generate_vertex_layout};
use prism::pipeline::vertex::stream_names;
use prism::settings::{DebugView, RendererSettings};

fn key(flags: FeatureFlags, alpha_mode: AlphaMode) -> VariantKey {
    VariantKey {
        flags,
        alpha_mode,
        double_sided: false,
        debug_view: DebugView::None,
        user_data: 0,
    }
}

// ============================================================================
// Dedup & normalization
// ============================================================================

#[test]
fn equal_normalized_variants_share_one_pipeline() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();
    let mut compiles = 0u32;

    // F1 carries an orphan sheen-map bit that normalization clears; F2 is
    // the already-normal form. Both must land on one compiled pipeline.
    let f1 = key(
        FeatureFlags::NORMAL_MAP | FeatureFlags::SHEEN_COLOR_MAP,
        AlphaMode::Opaque,
    );
    let f2 = key(FeatureFlags::NORMAL_MAP, AlphaMode::Opaque);

    let id1 = cache
        .get_or_create(&settings, &fixed, &f1, true, |_| {
            compiles += 1;
            Ok(compiles)
        })
        .unwrap()
        .unwrap();
    let id2 = cache
        .get_or_create(&settings, &fixed, &f2, true, |_| {
            compiles += 1;
            Ok(compiles)
        })
        .unwrap()
        .unwrap();

    assert_eq!(id1, id2);
    assert_eq!(compiles, 1, "exactly one compilation across both calls");
    assert_eq!(cache.pipeline_count(), 1);
}

#[test]
fn distinct_variants_get_distinct_pipelines() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();

    let a = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::NORMAL_MAP, AlphaMode::Opaque),
            true,
            |_| Ok(1),
        )
        .unwrap();
    let b = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Opaque),
            true,
            |_| Ok(2),
        )
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(cache.pipeline_count(), 2);
}

#[test]
fn double_sided_is_a_distinct_variant() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();

    let single = key(FeatureFlags::empty(), AlphaMode::Opaque);
    let double = VariantKey {
        double_sided: true,
        ..single
    };

    let a = cache
        .get_or_create(&settings, &fixed, &single, true, |_| Ok(1))
        .unwrap();
    let b = cache
        .get_or_create(&settings, &fixed, &double, true, |_| Ok(2))
        .unwrap();

    assert_ne!(a, b, "cull-back and cull-none are two pipelines");
}

// ============================================================================
// Alpha-mode aliasing
// ============================================================================

#[test]
fn mask_and_opaque_alias_one_pipeline() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();
    let mut compiles = 0u32;

    let mask_id = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Mask),
            true,
            |_| {
                compiles += 1;
                Ok(compiles)
            },
        )
        .unwrap();
    let opaque_id = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Opaque),
            true,
            |_| {
                compiles += 1;
                Ok(compiles)
            },
        )
        .unwrap();

    assert_eq!(mask_id, opaque_id);
    assert_eq!(compiles, 1);

    let blend_id = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Blend),
            true,
            |_| {
                compiles += 1;
                Ok(compiles)
            },
        )
        .unwrap();
    assert_ne!(blend_id, opaque_id, "blend has its own fixed-function state");
}

// ============================================================================
// Miss behavior
// ============================================================================

#[test]
fn lookup_without_create_has_no_side_effects() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();

    let miss = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Opaque),
            false,
            |_| Ok(1),
        )
        .unwrap();
    assert_eq!(miss, None);
    assert_eq!(cache.pipeline_count(), 0);

    // After a real create, the passive lookup hits.
    cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Opaque),
            true,
            |_| Ok(1),
        )
        .unwrap();
    let hit = cache
        .get_or_create(
            &settings,
            &fixed,
            &key(FeatureFlags::empty(), AlphaMode::Opaque),
            false,
            |_| Ok(99),
        )
        .unwrap();
    assert!(hit.is_some());
    assert_eq!(cache.pipeline_count(), 1);
}

#[test]
fn failed_compilation_is_not_negatively_cached() {
    let settings = RendererSettings::default();
    let fixed = FixedFunctionKey::scene(&settings);
    let mut cache: PipelineCache<u32> = PipelineCache::new();
    let variant = key(FeatureFlags::empty(), AlphaMode::Opaque);

    let result = cache.get_or_create(&settings, &fixed, &variant, true, |_| {
        Err(RenderError::ShaderGeneration {
            template: "scene/pbr".into(),
            message: "synthetic failure".into(),
        })
    });
    assert!(result.is_err());
    assert_eq!(cache.pipeline_count(), 0);

    // Retry compiles and succeeds.
    let id = cache
        .get_or_create(&settings, &fixed, &variant, true, |_| Ok(5))
        .unwrap();
    assert!(id.is_some());
    assert_eq!(cache.pipeline_count(), 1);
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn wireframe_partition_is_separate() {
    let settings = RendererSettings::default();
    let mut cache: PipelineCache<u32> = PipelineCache::new();
    let variant = key(FeatureFlags::empty(), AlphaMode::Opaque);

    let scene_id = cache
        .get_or_create(
            &settings,
            &FixedFunctionKey::scene(&settings),
            &variant,
            true,
            |_| Ok(1),
        )
        .unwrap();
    let wire_id = cache
        .get_or_create(
            &settings,
            &FixedFunctionKey::wireframe(&settings),
            &variant,
            true,
            |_| Ok(2),
        )
        .unwrap();

    assert_ne!(scene_id, wire_id);
}

// ============================================================================
// Vertex layout generation
// ============================================================================

#[test]
fn vertex_layout_tracks_flags() {
    let minimal = generate_vertex_layout(FeatureFlags::empty());
    assert_eq!(minimal.buffers.len(), 3); // position, normal, uv0

    let skinned = generate_vertex_layout(FeatureFlags::SKINNING | FeatureFlags::NORMAL_MAP);
    // + tangent, joints, weights
    assert_eq!(skinned.buffers.len(), 6);
    assert!(skinned.vertex_input_code.contains("tangent"));
    assert!(skinned.varyings_code.contains("world_tangent"));
}

#[test]
fn stream_names_match_buffer_slots() {
    for flags in [
        FeatureFlags::empty(),
        FeatureFlags::SKINNING,
        FeatureFlags::VERTEX_COLORS | FeatureFlags::TEXCOORD1,
        FeatureFlags::all(),
    ] {
        let layout = generate_vertex_layout(flags);
        let names = stream_names(flags);
        assert_eq!(layout.buffers.len(), names.len());
    }
}

#[test]
fn motion_vectors_extend_varyings_only() {
    let layout = generate_vertex_layout(FeatureFlags::MOTION_VECTORS);
    assert_eq!(layout.buffers.len(), 3, "no extra vertex stream");
    assert!(layout.varyings_code.contains("prev_clip_position"));
}
