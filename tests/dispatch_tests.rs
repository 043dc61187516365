//! Render-List Sorter Tests
//!
//! Tests for:
//! - Bucket dispatch order: opaque strictly before mask strictly before
//!   blend, regardless of push order
//! - State-key sorting inside the opaque bucket
//! - Back-to-front ordering of the blend bucket
//! - AlphaModeMask filtering

use slotmap::SlotMap;

use prism::dispatch::{AlphaModeMask, RenderCommand, RenderKey, RenderQueues};
use prism::binding::SrbKey;
use prism::features::FeatureFlags;
use prism::model::AlphaMode;
use prism::pipeline::PipelineId;

fn srb() -> SrbKey {
    let mut keys: SlotMap<SrbKey, ()> = SlotMap::with_key();
    keys.insert(())
}

fn cmd(pipeline: u16, material: u32, depth: f32) -> RenderCommand {
    RenderCommand {
        pipeline_id: PipelineId(u32::from(pipeline)),
        srb: srb(),
        material_index: material,
        primitive_index: 0,
        flags: FeatureFlags::empty(),
        attrib_offset: 0,
        joint_offset: 0,
        sort_key: RenderKey::new(pipeline, material, depth),
    }
}

// ============================================================================
// Bucket ordering
// ============================================================================

#[test]
fn opaque_before_mask_before_blend() {
    // Push in the worst possible traversal order.
    let mut queues = RenderQueues::default();
    queues.push(AlphaMode::Blend, cmd(30, 0, 1.0));
    queues.push(AlphaMode::Mask, cmd(20, 0, 1.0));
    queues.push(AlphaMode::Opaque, cmd(10, 0, 1.0));
    queues.push(AlphaMode::Blend, cmd(31, 0, 2.0));
    queues.push(AlphaMode::Opaque, cmd(11, 0, 2.0));
    queues.push(AlphaMode::Mask, cmd(21, 0, 2.0));
    queues.sort();

    let buckets: Vec<u32> = queues
        .iter_in_order()
        .map(|c| c.pipeline_id.0 / 10)
        .collect();
    assert_eq!(buckets, vec![1, 1, 2, 2, 3, 3]);
}

#[test]
fn bucket_counts_are_preserved() {
    let mut queues = RenderQueues::default();
    for i in 0..5 {
        queues.push(AlphaMode::Opaque, cmd(1, i, 0.0));
    }
    for i in 0..3 {
        queues.push(AlphaMode::Mask, cmd(2, i, 0.0));
    }
    for i in 0..2 {
        queues.push(AlphaMode::Blend, cmd(3, i, 0.0));
    }

    assert_eq!(queues.opaque.len(), 5);
    assert_eq!(queues.mask.len(), 3);
    assert_eq!(queues.blend.len(), 2);
    assert_eq!(queues.len(), 10);
}

// ============================================================================
// Sorting inside buckets
// ============================================================================

#[test]
fn opaque_sorts_by_pipeline_then_material() {
    let mut queues = RenderQueues::default();
    queues.push(AlphaMode::Opaque, cmd(2, 9, 1.0));
    queues.push(AlphaMode::Opaque, cmd(1, 5, 1.0));
    queues.push(AlphaMode::Opaque, cmd(2, 3, 1.0));
    queues.push(AlphaMode::Opaque, cmd(1, 5, 9.0));
    queues.sort();

    let order: Vec<(u32, u32)> = queues
        .opaque
        .iter()
        .map(|c| (c.pipeline_id.0, c.material_index))
        .collect();
    assert_eq!(order, vec![(1, 5), (1, 5), (2, 3), (2, 9)]);
}

#[test]
fn blend_sorts_back_to_front() {
    let mut queues = RenderQueues::default();
    queues.push(AlphaMode::Blend, cmd(1, 0, 2.5));
    queues.push(AlphaMode::Blend, cmd(1, 0, 10.0));
    queues.push(AlphaMode::Blend, cmd(1, 0, 0.5));
    queues.sort();

    // Farthest first: descending sort keys (depth dominates within equal
    // pipeline/material bits).
    let keys: Vec<RenderKey> = queues.blend.iter().map(|c| c.sort_key).collect();
    assert!(keys.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn clear_resets_all_buckets() {
    let mut queues = RenderQueues::default();
    queues.push(AlphaMode::Opaque, cmd(1, 0, 0.0));
    queues.push(AlphaMode::Blend, cmd(2, 0, 0.0));
    queues.clear();
    assert!(queues.is_empty());
}

// ============================================================================
// Alpha-mode mask
// ============================================================================

#[test]
fn alpha_mode_mask_selects_buckets() {
    let mask = AlphaModeMask::OPAQUE | AlphaModeMask::MASK;
    assert!(mask.contains_mode(AlphaMode::Opaque));
    assert!(mask.contains_mode(AlphaMode::Mask));
    assert!(!mask.contains_mode(AlphaMode::Blend));

    assert!(AlphaModeMask::default().contains_mode(AlphaMode::Blend));
}

// ============================================================================
// Sort-key packing
// ============================================================================

#[test]
fn render_key_orders_pipeline_over_material_over_depth() {
    let low_pipeline = RenderKey::new(1, 999, 100.0);
    let high_pipeline = RenderKey::new(2, 0, 0.0);
    assert!(low_pipeline < high_pipeline);

    let low_material = RenderKey::new(1, 1, 100.0);
    let high_material = RenderKey::new(1, 2, 0.0);
    assert!(low_material < high_material);

    let near = RenderKey::new(1, 1, 1.0);
    let far = RenderKey::new(1, 1, 50.0);
    assert!(near < far);
}

#[test]
fn render_key_clamps_negative_depth() {
    let negative = RenderKey::new(1, 1, -5.0);
    let zero = RenderKey::new(1, 1, 0.0);
    assert!(negative <= zero);
}
