//! Render Techniques
//!
//! One technique = one GPU pass: a pipeline (lazily created, keyed by
//! technique id + feature flags + output format), its resource bindings,
//! and a readiness state machine:
//!
//! ```text
//! Uninitialized → PsoCompiling → PsoReady → (SRB build) → SrbReady
//! ```
//!
//! A technique is usable only in `SrbReady`. With asynchronous pipeline
//! creation requested, the first prepare poll moves to `PsoCompiling` and
//! returns; the actual compile lands on a later poll, so the render thread
//! never blocks on compilation. The SRB side re-enters `PsoReady` whenever
//! an upstream resource identity changes (resize) without touching the
//! compiled pipeline.

use rustc_hash::FxHashMap;

use crate::features::FeatureFlags;
use crate::pipeline::{PipelineId, TechniqueKey, fx_hash_key};

/// Identity of one PostFX pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechniqueId {
    /// Hierarchical depth prefilter (mip-chain convolution).
    PrefilterDepth,
    /// Screen-space occlusion estimation.
    ComputeOcclusion,
    /// Temporal accumulation against the history buffer.
    TemporalAccumulate,
    /// Spatial reconstruction / denoise.
    SpatialReconstruct,
}

impl TechniqueId {
    /// Template carrying this technique's entry points.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::PrefilterDepth => "passes/depth_prefilter",
            Self::ComputeOcclusion => "passes/ssao",
            Self::TemporalAccumulate => "passes/temporal",
            Self::SpatialReconstruct => "passes/spatial",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PrefilterDepth => "Depth Prefilter",
            Self::ComputeOcclusion => "Occlusion",
            Self::TemporalAccumulate => "Temporal Accumulation",
            Self::SpatialReconstruct => "Spatial Reconstruction",
        }
    }
}

/// Readiness of one technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PsoState {
    #[default]
    Uninitialized,
    /// Asynchronous creation requested, compile not yet performed.
    PsoCompiling,
    /// Pipeline exists, bindings not built (or invalidated).
    PsoReady,
    /// Fully usable.
    SrbReady,
}

/// One technique instance: pipeline handle + bind groups + readiness.
///
/// The state machine itself is device-free; pipeline and bind-group
/// creation are driven from outside so readiness semantics are testable in
/// isolation.
pub struct RenderTechnique {
    pub id: TechniqueId,
    pub flags: FeatureFlags,
    pub output_format: wgpu::TextureFormat,
    pub pipeline: Option<PipelineId>,
    /// One bind group per pass invocation (mip-chain techniques hold one
    /// per level).
    pub bind_groups: Vec<wgpu::BindGroup>,
    state: PsoState,
    /// Stamp of the upstream resource identities the SRBs were built
    /// against; a mismatch invalidates them without recompiling the PSO.
    srb_stamp: u64,
}

impl RenderTechnique {
    #[must_use]
    pub fn new(id: TechniqueId, flags: FeatureFlags, output_format: wgpu::TextureFormat) -> Self {
        Self {
            id,
            flags,
            output_format,
            pipeline: None,
            bind_groups: Vec::new(),
            state: PsoState::Uninitialized,
            srb_stamp: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> PsoState {
        self.state
    }

    /// Usable for drawing this frame.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == PsoState::SrbReady
    }

    /// First poll under async creation: defer the compile.
    pub fn begin_async_compile(&mut self) {
        debug_assert_eq!(self.state, PsoState::Uninitialized);
        self.state = PsoState::PsoCompiling;
    }

    /// Compile finished (or ran synchronously).
    pub fn pso_ready(&mut self, pipeline: PipelineId) {
        self.pipeline = Some(pipeline);
        self.state = PsoState::PsoReady;
    }

    /// Bindings built against the given upstream stamp.
    pub fn srb_ready(&mut self, bind_groups: Vec<wgpu::BindGroup>, stamp: u64) {
        debug_assert!(self.pipeline.is_some());
        self.bind_groups = bind_groups;
        self.srb_stamp = stamp;
        self.state = PsoState::SrbReady;
    }

    /// Invalidates the SRBs when upstream identities moved; the compiled
    /// pipeline is kept.
    pub fn check_srb(&mut self, stamp: u64) {
        if self.state == PsoState::SrbReady && self.srb_stamp != stamp {
            self.bind_groups.clear();
            self.state = PsoState::PsoReady;
        }
    }
}

// ─── Technique pipeline cache ────────────────────────────────────────────────

/// Fullscreen-pass pipeline cache shared by all PostFX effects.
///
/// Keyed by [`TechniqueKey`] (final-source hash + output configuration);
/// one compiled pipeline per distinct key, never evicted.
pub struct TechniqueCache {
    pipelines: Vec<wgpu::RenderPipeline>,
    lookup: FxHashMap<u64, PipelineId>,
}

impl Default for TechniqueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TechniqueCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipelines: Vec::with_capacity(8),
            lookup: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: PipelineId) -> &wgpu::RenderPipeline {
        &self.pipelines[id.index()]
    }

    /// Looks up or creates the fullscreen pipeline for `key`.
    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        shader_module: &wgpu::ShaderModule,
        pipeline_layout: &wgpu::PipelineLayout,
        key: &TechniqueKey,
        label: &str,
    ) -> PipelineId {
        let hash = fx_hash_key(key);
        if let Some(&id) = self.lookup.get(&hash) {
            return id;
        }

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = key
            .color_targets
            .iter()
            .map(|ct| {
                Some(wgpu::ColorTargetState {
                    format: ct.format,
                    blend: ct.blend.map(|bk| wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: bk.color.src_factor,
                            dst_factor: bk.color.dst_factor,
                            operation: bk.color.operation,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: bk.alpha.src_factor,
                            dst_factor: bk.alpha.dst_factor,
                            operation: bk.alpha.operation,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::from_bits_truncate(ct.write_mask),
                })
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader_module,
                entry_point: Some("fs_main"),
                targets: &color_targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let id = PipelineId(self.pipelines.len() as u32);
        self.pipelines.push(pipeline);
        self.lookup.insert(hash, id);
        id
    }

    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn technique() -> RenderTechnique {
        RenderTechnique::new(
            TechniqueId::ComputeOcclusion,
            FeatureFlags::empty(),
            wgpu::TextureFormat::R8Unorm,
        )
    }

    #[test]
    fn readiness_walks_the_state_machine() {
        let mut t = technique();
        assert_eq!(t.state(), PsoState::Uninitialized);
        assert!(!t.is_ready());

        t.begin_async_compile();
        assert_eq!(t.state(), PsoState::PsoCompiling);
        assert!(!t.is_ready());

        t.pso_ready(PipelineId(0));
        assert_eq!(t.state(), PsoState::PsoReady);
        assert!(!t.is_ready());

        t.srb_ready(Vec::new(), 42);
        assert!(t.is_ready());
    }

    #[test]
    fn srb_invalidation_keeps_pso() {
        let mut t = technique();
        t.pso_ready(PipelineId(3));
        t.srb_ready(Vec::new(), 1);
        assert!(t.is_ready());

        // Upstream texture rebuilt (resize): SRB drops, PSO stays.
        t.check_srb(2);
        assert_eq!(t.state(), PsoState::PsoReady);
        assert_eq!(t.pipeline, Some(PipelineId(3)));

        // Same stamp: no-op.
        t.srb_ready(Vec::new(), 2);
        t.check_srb(2);
        assert!(t.is_ready());
    }
}
