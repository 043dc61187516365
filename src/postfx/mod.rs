//! PostFX Render-Technique Graph
//!
//! Named GPU passes chained into a small data-flow graph (depth prefilter →
//! occlusion → temporal accumulation → spatial reconstruction), with
//! per-pass readiness tracking for asynchronous pipeline compilation and a
//! device-capability-driven path choice for mip-chain reads.

pub mod noise;
pub mod ssao;
pub mod technique;

pub use noise::{generate_rotation_noise, generate_sample_kernel};
pub use ssao::{Ssao, SsaoExecuteAttribs, SsaoSettings};
pub use technique::{PsoState, RenderTechnique, TechniqueCache, TechniqueId};

use crate::pipeline::ShaderManager;

// ─── Device capabilities ─────────────────────────────────────────────────────

/// Capability answers the technique graph branches on. Queried once at
/// construction; a technique picks its path when it is created, never per
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    /// Backend can bind an individual mip level as a shader input.
    pub subresource_views: bool,
    /// Backend can copy individual subresources between textures.
    pub subresource_copies: bool,
}

impl DeviceCaps {
    /// Derives the capability set from the adapter's downlevel report.
    #[must_use]
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let downlevel = adapter.get_downlevel_capabilities();
        Self {
            subresource_views: downlevel.is_webgpu_compliant(),
            subresource_copies: true,
        }
    }

    /// A fully capable device (native backends).
    #[must_use]
    pub fn assume_full() -> Self {
        Self {
            subresource_views: true,
            subresource_copies: true,
        }
    }
}

// ─── Shared context ──────────────────────────────────────────────────────────

/// State shared by every PostFX effect: the fullscreen pipeline cache, the
/// shader-module cache, common samplers, and the capability answers.
pub struct PostFxContext {
    pub caps: DeviceCaps,
    pub shader_manager: ShaderManager,
    pub technique_cache: TechniqueCache,
    pub linear_sampler: wgpu::Sampler,
    pub point_sampler: wgpu::Sampler,
    /// Request deferred pipeline creation; effects poll readiness and
    /// publish placeholder output until compiled.
    pub async_pipelines: bool,
}

impl PostFxContext {
    #[must_use]
    pub fn new(device: &wgpu::Device, caps: DeviceCaps, async_pipelines: bool) -> Self {
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("PostFX Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let point_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("PostFX Point Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            caps,
            shader_manager: ShaderManager::new(),
            technique_cache: TechniqueCache::new(),
            linear_sampler,
            point_sampler,
            async_pipelines,
        }
    }
}
