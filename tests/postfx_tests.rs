//! PostFX Technique Graph Tests
//!
//! Tests for:
//! - RenderTechnique readiness state machine (async compile polling, SRB
//!   invalidation on upstream changes)
//! - Mip-chain pass plan: level k reads level k-1 of the same frame on both
//!   capability paths
//! - Deterministic kernel / rotation-noise generation
//! - PostFX macro derivation

use prism::defines::ShaderDefines;
use prism::features::FeatureFlags;
use prism::pipeline::PipelineId;
use prism::postfx::ssao::{MipPassIo, MipSource, PREFILTER_MIP_COUNT, mip_pass_plan};
use prism::postfx::{
    PsoState, RenderTechnique, TechniqueId, generate_rotation_noise, generate_sample_kernel,
};

fn technique(id: TechniqueId) -> RenderTechnique {
    RenderTechnique::new(id, FeatureFlags::empty(), wgpu::TextureFormat::R8Unorm)
}

// ============================================================================
// Readiness state machine
// ============================================================================

#[test]
fn technique_starts_unready() {
    let t = technique(TechniqueId::ComputeOcclusion);
    assert_eq!(t.state(), PsoState::Uninitialized);
    assert!(!t.is_ready());
}

#[test]
fn async_compile_is_a_two_poll_path() {
    let mut t = technique(TechniqueId::PrefilterDepth);

    // Poll 1: compile requested, nothing usable yet.
    t.begin_async_compile();
    assert_eq!(t.state(), PsoState::PsoCompiling);
    assert!(!t.is_ready(), "compiling technique must report not-ready");

    // Poll 2: compile landed.
    t.pso_ready(PipelineId(0));
    assert_eq!(t.state(), PsoState::PsoReady);
    assert!(!t.is_ready(), "PSO alone is not enough; SRB still missing");

    t.srb_ready(Vec::new(), 1);
    assert!(t.is_ready());
}

#[test]
fn sync_compile_skips_the_compiling_state() {
    let mut t = technique(TechniqueId::TemporalAccumulate);
    t.pso_ready(PipelineId(2));
    assert_eq!(t.state(), PsoState::PsoReady);
}

#[test]
fn srb_invalidation_preserves_the_pipeline() {
    let mut t = technique(TechniqueId::SpatialReconstruct);
    t.pso_ready(PipelineId(7));
    t.srb_ready(Vec::new(), 10);
    assert!(t.is_ready());

    // Resize: upstream texture generations moved.
    t.check_srb(11);
    assert_eq!(t.state(), PsoState::PsoReady);
    assert_eq!(t.pipeline, Some(PipelineId(7)), "PSO survives SRB loss");

    t.srb_ready(Vec::new(), 11);
    assert!(t.is_ready());

    // Matching stamp: nothing happens.
    t.check_srb(11);
    assert!(t.is_ready());
}

#[test]
fn technique_templates_are_distinct() {
    let ids = [
        TechniqueId::PrefilterDepth,
        TechniqueId::ComputeOcclusion,
        TechniqueId::TemporalAccumulate,
        TechniqueId::SpatialReconstruct,
    ];
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            assert_ne!(a.template(), b.template());
        }
    }
}

// ============================================================================
// Mip-chain convolution plan
// ============================================================================

#[test]
fn subresource_view_plan_reads_previous_level() {
    let plan = mip_pass_plan(PREFILTER_MIP_COUNT, true);
    assert_eq!(plan.len(), PREFILTER_MIP_COUNT as usize);

    assert_eq!(
        plan[0],
        MipPassIo {
            input: MipSource::ExternalDepth,
            output_mip: 0,
            copy_to_scratch: false,
        }
    );
    for k in 1..PREFILTER_MIP_COUNT {
        let pass = plan[k as usize];
        assert_eq!(pass.input, MipSource::Mip(k - 1), "level {k} must read level {}", k - 1);
        assert_eq!(pass.output_mip, k);
        assert!(!pass.copy_to_scratch);
    }
}

#[test]
fn copy_fallback_plan_stages_through_scratch() {
    let plan = mip_pass_plan(PREFILTER_MIP_COUNT, false);

    for k in 1..PREFILTER_MIP_COUNT as usize {
        assert_eq!(plan[k].input, MipSource::Scratch);
        // The producing pass copied its output out before this pass runs.
        assert!(
            plan[k - 1].copy_to_scratch,
            "level {} output must be staged for level {k}",
            k - 1
        );
    }
    // The last level feeds nobody.
    assert!(!plan[PREFILTER_MIP_COUNT as usize - 1].copy_to_scratch);
}

#[test]
fn single_level_plan_has_no_copies() {
    let plan = mip_pass_plan(1, false);
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].input, MipSource::ExternalDepth);
    assert!(!plan[0].copy_to_scratch);
}

// ============================================================================
// Noise / kernel generation
// ============================================================================

#[test]
fn kernel_is_deterministic_across_calls() {
    assert_eq!(generate_sample_kernel(16), generate_sample_kernel(16));
    assert_eq!(generate_sample_kernel(64).len(), 64);
}

#[test]
fn kernel_samples_lie_in_the_unit_upper_hemisphere() {
    for sample in generate_sample_kernel(64) {
        assert!(sample.z >= 0.0, "sample below the surface plane");
        assert!(sample.truncate().length() <= 1.0 + 1e-4);
        assert_eq!(sample.w, 0.0);
    }
}

#[test]
fn rotation_noise_is_deterministic_and_unit_encoded() {
    let noise = generate_rotation_noise();
    assert_eq!(noise, generate_rotation_noise());

    for texel in &noise {
        // XY encode a unit vector in [0, 255]; Z unused; alpha opaque.
        let x = f32::from(texel[0]) / 255.0 * 2.0 - 1.0;
        let y = f32::from(texel[1]) / 255.0 * 2.0 - 1.0;
        let len = (x * x + y * y).sqrt();
        assert!((len - 1.0).abs() < 0.02, "rotation vector not unit: {len}");
        assert_eq!(texel[3], 255);
    }
}

// ============================================================================
// PostFX macro derivation
// ============================================================================

#[test]
fn postfx_defines_follow_variant_bits() {
    let defines = ShaderDefines::from_postfx(
        FeatureFlags::HALF_RESOLUTION | FeatureFlags::HALF_PRECISION_DEPTH,
    );
    assert!(defines.contains("HALF_RESOLUTION"));
    assert!(defines.contains("HALF_PRECISION_DEPTH"));
    assert!(!defines.contains("UNIFORM_WEIGHTING"));

    assert!(ShaderDefines::from_postfx(FeatureFlags::empty()).is_empty());
}
