//! Screen-Space Ambient Occlusion
//!
//! A four-technique effect graph:
//!
//! ```text
//!  SceneDepth ──► PrefilterDepth (mip chain) ──► ComputeOcclusion ──► TemporalAccumulate ──► SpatialReconstruct
//!                      │                              ▲   ▲                  ▲  │                    │
//!                      └── mip k reads mip k-1 ───────┘   │                  │  └──► history copy    └──► OcclusionResolved
//!                                               BlueNoise ┘     OcclusionHistory / DepthHistory
//! ```
//!
//! Every technique carries its own readiness state; `execute` aggregates
//! readiness across all of them and, while any pipeline is still compiling,
//! publishes a cleared neutral output instead of running the dependent
//! passes. The mip-chain read path (per-mip subresource views vs. explicit
//! copies through a scratch texture) is chosen once from the device
//! capabilities when the technique is created.

use glam::{Vec2, Vec4};
use smallvec::smallvec;

use super::noise::{NOISE_SIZE, generate_rotation_noise, generate_sample_kernel};
use super::technique::{PsoState, RenderTechnique, TechniqueId};
use super::{DeviceCaps, PostFxContext};
use crate::defines::ShaderDefines;
use crate::error::Result;
use crate::features::FeatureFlags;
use crate::pipeline::{ColorTargetKey, PipelineId, TechniqueKey, fx_hash_key};
use crate::pipeline::shader_gen::ShaderCompilationOptions;
use crate::resources::{ResourceId, ResourceTable, TableTextureDesc};

/// Mip levels of the prefiltered depth pyramid.
pub const PREFILTER_MIP_COUNT: u32 = 5;

const OCCLUSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Clear color of the placeholder output (fully unoccluded).
pub const PLACEHOLDER_CLEAR: wgpu::Color = wgpu::Color {
    r: 1.0,
    g: 1.0,
    b: 1.0,
    a: 1.0,
};

// ─── Settings & uniforms ─────────────────────────────────────────────────────

/// User-facing SSAO configuration.
#[derive(Debug, Clone)]
pub struct SsaoSettings {
    /// Sampling radius in view-space units. Typical range 0.1–2.0.
    pub radius: f32,
    /// Depth bias preventing self-occlusion. Typical range 0.01–0.05.
    pub bias: f32,
    /// Occlusion exponent; higher is darker. Typical range 1.0–3.0.
    pub intensity: f32,
    /// Hemisphere samples per pixel, clamped to 1..=64.
    pub sample_count: u32,
    /// History blend factor for the temporal accumulator (0 = no history).
    pub temporal_alpha: f32,
    /// Variant bits: HALF_RESOLUTION, HALF_PRECISION_DEPTH,
    /// UNIFORM_WEIGHTING.
    pub flags: FeatureFlags,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
            sample_count: 32,
            temporal_alpha: 0.9,
            flags: FeatureFlags::empty(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SsaoUniforms {
    samples: [Vec4; 64],
    radius: f32,
    bias: f32,
    intensity: f32,
    sample_count: u32,
    noise_scale: Vec2,
    inv_resolution: Vec2,
    temporal_alpha: f32,
    frame_index: u32,
    _pad: [u32; 2],
}

// ─── Execute attribs ─────────────────────────────────────────────────────────

/// Per-frame inputs handed to [`Ssao::execute`].
///
/// The views must stay stable between resizes; the effect rebuilds its
/// bindings when `width`/`height` change, not per frame.
pub struct SsaoExecuteAttribs<'a> {
    pub depth: &'a wgpu::TextureView,
    pub normal: &'a wgpu::TextureView,
    pub motion: Option<&'a wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
    pub frame_index: u32,
}

// ─── Mip pass plan ───────────────────────────────────────────────────────────

/// Input source of one prefilter pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipSource {
    /// The external scene depth buffer (level 0 only).
    ExternalDepth,
    /// A single-mip view of the pyramid (subresource-view path).
    Mip(u32),
    /// The scratch copy of the previous level (no-subresource-view path).
    Scratch,
}

/// One prefilter pass: read `input`, write pyramid mip `output_mip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipPassIo {
    pub input: MipSource,
    pub output_mip: u32,
    /// Copy pyramid mip `output_mip` into the scratch texture afterwards
    /// (feeds the next level on the no-subresource-view path).
    pub copy_to_scratch: bool,
}

/// Builds the mip-chain convolution plan. Level `k > 0` always consumes
/// level `k-1`'s output of the same frame — either directly through a
/// subresource view or through the scratch copy made right after `k-1` was
/// written.
#[must_use]
pub fn mip_pass_plan(mip_count: u32, subresource_views: bool) -> Vec<MipPassIo> {
    (0..mip_count)
        .map(|k| MipPassIo {
            input: if k == 0 {
                MipSource::ExternalDepth
            } else if subresource_views {
                MipSource::Mip(k - 1)
            } else {
                MipSource::Scratch
            },
            output_mip: k,
            copy_to_scratch: !subresource_views && k + 1 < mip_count,
        })
        .collect()
}

// ─── The effect ──────────────────────────────────────────────────────────────

/// The SSAO effect instance.
pub struct Ssao {
    pub settings: SsaoSettings,

    // Bind group layouts, one per technique signature (created once).
    linearize_layout: wgpu::BindGroupLayout,
    downsample_layout: wgpu::BindGroupLayout,
    occlusion_layout: wgpu::BindGroupLayout,
    temporal_layout: wgpu::BindGroupLayout,
    spatial_layout: wgpu::BindGroupLayout,

    uniforms_buffer: wgpu::Buffer,
    kernel: Vec<Vec4>,

    /// Depth-linearize pipeline (prefilter level 0); compiled together with
    /// the downsample pipeline under the PrefilterDepth readiness state.
    linearize_pipeline: Option<PipelineId>,
    techniques: rustc_hash::FxHashMap<(TechniqueId, u64, wgpu::TextureFormat), RenderTechnique>,

    /// Render-target views of the pyramid mips, rebuilt with the SRBs.
    target_mip_views: Vec<wgpu::TextureView>,
    /// 1×1 zero-motion fallback when the host provides no motion vectors.
    zero_motion: wgpu::TextureView,
    noise_uploaded_generation: u64,
}

impl Ssao {
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let uniforms_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSAO Uniforms"),
            size: size_of::<SsaoUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let tex = |binding, filterable, dim| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: dim,
                multisampled: false,
            },
            count: None,
        };
        let depth_tex = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler = |binding, ty| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(ty),
            count: None,
        };
        let uniforms = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        use wgpu::SamplerBindingType::{Filtering, NonFiltering};
        use wgpu::TextureViewDimension::D2;

        let linearize_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Linearize Layout"),
            entries: &[depth_tex(0), sampler(1, NonFiltering)],
        });

        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Downsample Layout"),
            entries: &[tex(0, false, D2), sampler(1, NonFiltering)],
        });

        let occlusion_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Occlusion Layout"),
            entries: &[
                tex(0, false, D2), // prefiltered depth pyramid
                tex(1, true, D2),  // scene normals
                tex(2, false, D2), // rotation noise
                sampler(3, Filtering),
                sampler(4, NonFiltering),
                uniforms(5),
            ],
        });

        let temporal_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Temporal Layout"),
            entries: &[
                tex(0, true, D2),  // raw occlusion
                tex(1, true, D2),  // occlusion history
                tex(2, false, D2), // depth history (previous frame)
                tex(3, false, D2), // current prefiltered depth
                tex(4, true, D2),  // motion vectors
                sampler(5, Filtering),
                uniforms(6),
            ],
        });

        let spatial_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Spatial Layout"),
            entries: &[
                tex(0, true, D2),  // accumulated occlusion
                tex(1, false, D2), // prefiltered depth
                tex(2, true, D2),  // scene normals
                sampler(3, Filtering),
                uniforms(4),
            ],
        });

        let zero_motion = upload_1x1(device, queue, "SSAO Zero Motion", [0, 0, 0, 0]);

        Self {
            settings: SsaoSettings::default(),
            linearize_layout,
            downsample_layout,
            occlusion_layout,
            temporal_layout,
            spatial_layout,
            uniforms_buffer,
            kernel: generate_sample_kernel(32),
            linearize_pipeline: None,
            techniques: rustc_hash::FxHashMap::default(),
            target_mip_views: Vec::new(),
            zero_motion,
            noise_uploaded_generation: 0,
        }
    }

    /// Changes the sample count; the kernel regenerates on the next frame.
    pub fn set_sample_count(&mut self, count: u32) {
        let count = count.clamp(1, 64);
        if self.settings.sample_count != count {
            self.settings.sample_count = count;
            self.kernel = generate_sample_kernel(count);
        }
    }

    /// The published occlusion output, `None` before the first `execute`.
    #[must_use]
    pub fn output<'a>(&self, table: &'a ResourceTable) -> Option<&'a wgpu::TextureView> {
        table.get(ResourceId::OcclusionResolved).map(|e| &e.view)
    }

    fn depth_format(&self) -> wgpu::TextureFormat {
        if self.settings.flags.contains(FeatureFlags::HALF_PRECISION_DEPTH) {
            wgpu::TextureFormat::R16Float
        } else {
            wgpu::TextureFormat::R32Float
        }
    }

    fn technique_key(&self, id: TechniqueId) -> (TechniqueId, u64, wgpu::TextureFormat) {
        let format = match id {
            TechniqueId::PrefilterDepth => self.depth_format(),
            _ => OCCLUSION_FORMAT,
        };
        (id, self.settings.flags.bits(), format)
    }

    const ALL_TECHNIQUES: [TechniqueId; 4] = [
        TechniqueId::PrefilterDepth,
        TechniqueId::ComputeOcclusion,
        TechniqueId::TemporalAccumulate,
        TechniqueId::SpatialReconstruct,
    ];

    /// All techniques of the current variant are usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.linearize_pipeline.is_some()
            && Self::ALL_TECHNIQUES.iter().all(|id| {
                self.techniques
                    .get(&self.technique_key(*id))
                    .is_some_and(RenderTechnique::is_ready)
            })
    }

    // =========================================================================
    // Prepare: PSOs + SRBs
    // =========================================================================

    /// `PrepareShadersAndPso`: polls every technique toward readiness.
    ///
    /// Under `ctx.async_pipelines` the first poll of a technique only marks
    /// it compiling; the compile itself lands on the next poll, so a frame
    /// is never blocked on shader compilation.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ctx: &mut PostFxContext,
        table: &mut ResourceTable,
        attribs: &SsaoExecuteAttribs<'_>,
    ) -> Result<()> {
        self.ensure_textures(device, queue, table, attribs);
        self.ensure_pipelines(device, ctx)?;

        let stamp = self.srb_stamp(table, &ctx.caps, attribs);
        for id in Self::ALL_TECHNIQUES {
            let key = self.technique_key(id);
            if let Some(tech) = self.techniques.get_mut(&key) {
                tech.check_srb(stamp);
            }
        }
        self.build_srbs(device, ctx, table, attribs, stamp);
        Ok(())
    }

    fn ensure_pipelines(&mut self, device: &wgpu::Device, ctx: &mut PostFxContext) -> Result<()> {
        for id in Self::ALL_TECHNIQUES {
            let key = self.technique_key(id);
            let (_, _, format) = key;
            let flags = self.settings.flags;
            let tech = self
                .techniques
                .entry(key)
                .or_insert_with(|| RenderTechnique::new(id, flags, format));

            match tech.state() {
                PsoState::Uninitialized if ctx.async_pipelines => {
                    tech.begin_async_compile();
                }
                PsoState::Uninitialized | PsoState::PsoCompiling => {
                    let pipeline = compile_technique(device, ctx, id, flags, format, false)?;
                    if id == TechniqueId::PrefilterDepth {
                        self.linearize_pipeline =
                            Some(compile_technique(device, ctx, id, flags, format, true)?);
                    }
                    tech.pso_ready(pipeline);
                }
                PsoState::PsoReady | PsoState::SrbReady => {}
            }
        }
        Ok(())
    }

    fn srb_stamp(
        &self,
        table: &ResourceTable,
        caps: &DeviceCaps,
        attribs: &SsaoExecuteAttribs<'_>,
    ) -> u64 {
        fx_hash_key(&(
            table.generation(ResourceId::PrefilteredDepth),
            table.generation(ResourceId::DepthHistory),
            table.generation(ResourceId::OcclusionRaw),
            table.generation(ResourceId::OcclusionAccumulated),
            table.generation(ResourceId::OcclusionHistory),
            table.generation(ResourceId::BlueNoise),
            caps.subresource_views,
            attribs.width,
            attribs.height,
        ))
    }

    fn ensure_textures(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        table: &mut ResourceTable,
        attribs: &SsaoExecuteAttribs<'_>,
    ) {
        let (w, h) = (attribs.width.max(1), attribs.height.max(1));
        let depth_format = self.depth_format();
        let half = self.settings.flags.contains(FeatureFlags::HALF_RESOLUTION);
        let (ow, oh) = if half { (w / 2, h / 2) } else { (w, h) };

        let render_read = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;

        table.get_or_create(
            device,
            ResourceId::PrefilteredDepth,
            &TableTextureDesc {
                width: w,
                height: h,
                format: depth_format,
                mip_level_count: PREFILTER_MIP_COUNT,
                usage: render_read | wgpu::TextureUsages::COPY_SRC,
                label: "SSAO Prefiltered Depth",
            },
        );
        table.get_or_create(
            device,
            ResourceId::ConvolutionScratch,
            &TableTextureDesc {
                width: w,
                height: h,
                format: depth_format,
                mip_level_count: 1,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                label: "SSAO Convolution Scratch",
            },
        );
        table.get_or_create(
            device,
            ResourceId::DepthHistory,
            &TableTextureDesc {
                width: w,
                height: h,
                format: depth_format,
                mip_level_count: 1,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                label: "SSAO Depth History",
            },
        );
        table.get_or_create(
            device,
            ResourceId::OcclusionRaw,
            &TableTextureDesc {
                width: ow.max(1),
                height: oh.max(1),
                format: OCCLUSION_FORMAT,
                mip_level_count: 1,
                usage: render_read,
                label: "SSAO Raw",
            },
        );
        table.get_or_create(
            device,
            ResourceId::OcclusionAccumulated,
            &TableTextureDesc {
                width: w,
                height: h,
                format: OCCLUSION_FORMAT,
                mip_level_count: 1,
                usage: render_read | wgpu::TextureUsages::COPY_SRC,
                label: "SSAO Accumulated",
            },
        );
        table.get_or_create(
            device,
            ResourceId::OcclusionHistory,
            &TableTextureDesc {
                width: w,
                height: h,
                format: OCCLUSION_FORMAT,
                mip_level_count: 1,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                label: "SSAO History",
            },
        );
        table.get_or_create(
            device,
            ResourceId::OcclusionResolved,
            &TableTextureDesc {
                width: w,
                height: h,
                format: OCCLUSION_FORMAT,
                mip_level_count: 1,
                usage: render_read,
                label: "SSAO Resolved",
            },
        );

        let noise = table.get_or_create(
            device,
            ResourceId::BlueNoise,
            &TableTextureDesc {
                width: NOISE_SIZE,
                height: NOISE_SIZE,
                format: wgpu::TextureFormat::Rgba8Unorm,
                mip_level_count: 1,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                label: "SSAO Rotation Noise",
            },
        );

        // Upload the noise tile once per texture incarnation.
        if noise.generation != self.noise_uploaded_generation {
            let data = generate_rotation_noise();
            let flat: Vec<u8> = data.iter().flat_map(|p| p.iter().copied()).collect();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &noise.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &flat,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * NOISE_SIZE),
                    rows_per_image: Some(NOISE_SIZE),
                },
                wgpu::Extent3d {
                    width: NOISE_SIZE,
                    height: NOISE_SIZE,
                    depth_or_array_layers: 1,
                },
            );
            self.noise_uploaded_generation = noise.generation;
        }
    }

    fn build_srbs(
        &mut self,
        device: &wgpu::Device,
        ctx: &PostFxContext,
        table: &ResourceTable,
        attribs: &SsaoExecuteAttribs<'_>,
        stamp: u64,
    ) {
        let needs_build = Self::ALL_TECHNIQUES.iter().any(|id| {
            self.techniques
                .get(&self.technique_key(*id))
                .is_some_and(|t| t.state() == PsoState::PsoReady)
        });
        if !needs_build {
            return;
        }

        let prefiltered = table.get(ResourceId::PrefilteredDepth).expect("ensured");
        let scratch = table.get(ResourceId::ConvolutionScratch).expect("ensured");
        let depth_history = table.get(ResourceId::DepthHistory).expect("ensured");
        let raw = table.get(ResourceId::OcclusionRaw).expect("ensured");
        let accumulated = table.get(ResourceId::OcclusionAccumulated).expect("ensured");
        let history = table.get(ResourceId::OcclusionHistory).expect("ensured");
        let noise = table.get(ResourceId::BlueNoise).expect("ensured");

        // Per-mip views of the pyramid: render targets and single-level
        // shader inputs (the latter only on the subresource-view path).
        self.target_mip_views = (0..PREFILTER_MIP_COUNT)
            .map(|k| {
                prefiltered.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("SSAO Pyramid Mip Target"),
                    base_mip_level: k,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let plan = mip_pass_plan(PREFILTER_MIP_COUNT, ctx.caps.subresource_views);

        // --- PrefilterDepth bind groups (one per pass of the plan) ---
        let prefilter_bgs: Vec<wgpu::BindGroup> = plan
            .iter()
            .map(|pass| {
                // The mip views double as inputs; a level is never read and
                // written in the same pass.
                let (layout, input): (&wgpu::BindGroupLayout, wgpu::BindingResource) =
                    match pass.input {
                        MipSource::ExternalDepth => (
                            &self.linearize_layout,
                            wgpu::BindingResource::TextureView(attribs.depth),
                        ),
                        MipSource::Mip(k) => (
                            &self.downsample_layout,
                            wgpu::BindingResource::TextureView(
                                &self.target_mip_views[k as usize],
                            ),
                        ),
                        MipSource::Scratch => (
                            &self.downsample_layout,
                            wgpu::BindingResource::TextureView(&scratch.view),
                        ),
                    };

                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("SSAO Prefilter BindGroup"),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: input,
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&ctx.point_sampler),
                        },
                    ],
                })
            })
            .collect();

        let key = self.technique_key(TechniqueId::PrefilterDepth);
        if let Some(tech) = self.techniques.get_mut(&key)
            && tech.state() == PsoState::PsoReady
        {
            tech.srb_ready(prefilter_bgs, stamp);
        }

        // --- ComputeOcclusion ---
        let occlusion_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Occlusion BindGroup"),
            layout: &self.occlusion_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&prefiltered.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(attribs.normal),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&ctx.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&ctx.point_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.uniforms_buffer.as_entire_binding(),
                },
            ],
        });
        let key = self.technique_key(TechniqueId::ComputeOcclusion);
        if let Some(tech) = self.techniques.get_mut(&key)
            && tech.state() == PsoState::PsoReady
        {
            tech.srb_ready(vec![occlusion_bg], stamp);
        }

        // --- TemporalAccumulate ---
        let motion = attribs.motion.unwrap_or(&self.zero_motion);
        let temporal_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Temporal BindGroup"),
            layout: &self.temporal_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&raw.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&history.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&depth_history.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&prefiltered.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(motion),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&ctx.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: self.uniforms_buffer.as_entire_binding(),
                },
            ],
        });
        let key = self.technique_key(TechniqueId::TemporalAccumulate);
        if let Some(tech) = self.techniques.get_mut(&key)
            && tech.state() == PsoState::PsoReady
        {
            tech.srb_ready(vec![temporal_bg], stamp);
        }

        // --- SpatialReconstruct ---
        let spatial_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Spatial BindGroup"),
            layout: &self.spatial_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&accumulated.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&prefiltered.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(attribs.normal),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&ctx.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniforms_buffer.as_entire_binding(),
                },
            ],
        });
        let key = self.technique_key(TechniqueId::SpatialReconstruct);
        if let Some(tech) = self.techniques.get_mut(&key)
            && tech.state() == PsoState::PsoReady
        {
            tech.srb_ready(vec![spatial_bg], stamp);
        }
    }

    // =========================================================================
    // Execute
    // =========================================================================

    /// Runs the effect for one frame.
    ///
    /// While any technique is still compiling, the output texture is
    /// cleared to [`PLACEHOLDER_CLEAR`] and no pass is drawn.
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &mut PostFxContext,
        table: &mut ResourceTable,
        attribs: &SsaoExecuteAttribs<'_>,
    ) -> Result<()> {
        self.prepare(device, queue, ctx, table, attribs)?;

        if !self.is_ready() {
            self.execute_placeholder(encoder, table);
            return Ok(());
        }

        self.upload_uniforms(queue, attribs);

        let plan = mip_pass_plan(PREFILTER_MIP_COUNT, ctx.caps.subresource_views);
        let prefiltered = table.get(ResourceId::PrefilteredDepth).expect("ensured");
        let scratch = table.get(ResourceId::ConvolutionScratch).expect("ensured");

        // --- Depth prefilter mip chain ---
        {
            let tech = &self.techniques[&self.technique_key(TechniqueId::PrefilterDepth)];
            for pass_io in &plan {
                let pipeline_id = if pass_io.input == MipSource::ExternalDepth {
                    self.linearize_pipeline.expect("ready implies compiled")
                } else {
                    tech.pipeline.expect("ready implies compiled")
                };
                let pipeline = ctx.technique_cache.get(pipeline_id);
                let target = &self.target_mip_views[pass_io.output_mip as usize];

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("SSAO Depth Prefilter"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    ..Default::default()
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &tech.bind_groups[pass_io.output_mip as usize], &[]);
                pass.draw(0..3, 0..1); // fullscreen triangle
                drop(pass);

                if pass_io.copy_to_scratch {
                    let mip = pass_io.output_mip;
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: &prefiltered.texture,
                            mip_level: mip,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: &scratch.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: (attribs.width >> mip).max(1),
                            height: (attribs.height >> mip).max(1),
                            depth_or_array_layers: 1,
                        },
                    );
                }
            }
        }

        // --- Occlusion / temporal / spatial fullscreen passes ---
        self.fullscreen_pass(
            encoder,
            ctx,
            table,
            TechniqueId::ComputeOcclusion,
            ResourceId::OcclusionRaw,
        );
        self.fullscreen_pass(
            encoder,
            ctx,
            table,
            TechniqueId::TemporalAccumulate,
            ResourceId::OcclusionAccumulated,
        );
        self.fullscreen_pass(
            encoder,
            ctx,
            table,
            TechniqueId::SpatialReconstruct,
            ResourceId::OcclusionResolved,
        );

        // --- History updates for the next frame ---
        let accumulated = table.get(ResourceId::OcclusionAccumulated).expect("ensured");
        let history = table.get(ResourceId::OcclusionHistory).expect("ensured");
        let depth_history = table.get(ResourceId::DepthHistory).expect("ensured");

        let full_extent = wgpu::Extent3d {
            width: attribs.width,
            height: attribs.height,
            depth_or_array_layers: 1,
        };
        fn copy_info(texture: &wgpu::Texture) -> wgpu::TexelCopyTextureInfo<'_> {
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            }
        }

        encoder.copy_texture_to_texture(
            copy_info(&accumulated.texture),
            copy_info(&history.texture),
            full_extent,
        );
        encoder.copy_texture_to_texture(
            copy_info(&prefiltered.texture),
            copy_info(&depth_history.texture),
            full_extent,
        );

        Ok(())
    }

    fn fullscreen_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        ctx: &PostFxContext,
        table: &ResourceTable,
        id: TechniqueId,
        output: ResourceId,
    ) {
        let tech = &self.techniques[&self.technique_key(id)];
        let pipeline = ctx
            .technique_cache
            .get(tech.pipeline.expect("ready implies compiled"));
        let target = table.get(output).expect("ensured");

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(tech.id.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &tech.bind_groups[0], &[]);
        pass.draw(0..3, 0..1); // fullscreen triangle
    }

    fn execute_placeholder(&self, encoder: &mut wgpu::CommandEncoder, table: &ResourceTable) {
        let Some(resolved) = table.get(ResourceId::OcclusionResolved) else {
            return;
        };
        log::debug!("SSAO pipelines still compiling; publishing placeholder output");
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SSAO Placeholder"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &resolved.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(PLACEHOLDER_CLEAR),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        // No draw: the clear *is* the placeholder.
    }

    fn upload_uniforms(&self, queue: &wgpu::Queue, attribs: &SsaoExecuteAttribs<'_>) {
        let mut samples = [Vec4::ZERO; 64];
        for (slot, sample) in samples.iter_mut().zip(self.kernel.iter()) {
            *slot = *sample;
        }

        let uniforms = SsaoUniforms {
            samples,
            radius: self.settings.radius.max(0.01),
            bias: self.settings.bias.max(0.0),
            intensity: self.settings.intensity.max(0.0),
            sample_count: self.settings.sample_count,
            noise_scale: Vec2::new(
                attribs.width as f32 / NOISE_SIZE as f32,
                attribs.height as f32 / NOISE_SIZE as f32,
            ),
            inv_resolution: Vec2::new(
                1.0 / attribs.width.max(1) as f32,
                1.0 / attribs.height.max(1) as f32,
            ),
            temporal_alpha: self.settings.temporal_alpha.clamp(0.0, 1.0),
            frame_index: attribs.frame_index,
            _pad: [0; 2],
        };
        queue.write_buffer(&self.uniforms_buffer, 0, bytemuck::bytes_of(&uniforms));
    }
}

// ─── Technique compilation ───────────────────────────────────────────────────

fn compile_technique(
    device: &wgpu::Device,
    ctx: &mut PostFxContext,
    id: TechniqueId,
    flags: FeatureFlags,
    output_format: wgpu::TextureFormat,
    depth_input: bool,
) -> Result<PipelineId> {
    let mut options = ShaderCompilationOptions::new();
    let mut defines = ShaderDefines::from_postfx(flags);
    defines.set("MIP_LEVELS", &PREFILTER_MIP_COUNT.to_string());
    if depth_input {
        defines.set("DEPTH_INPUT", "1");
    }
    if ctx.caps.subresource_views {
        defines.set("SUBRESOURCE_VIEWS", "1");
    }
    for (k, v) in defines.iter_strings() {
        options.add_define(k, v);
    }

    let binding_code = technique_binding_wgsl(id, depth_input);
    let (module, shader_hash) = ctx.shader_manager.get_or_compile_template(
        device,
        id.template(),
        &options,
        "",
        "",
        &binding_code,
    )?;

    // The technique's single bind group layout mirrors its binding code.
    // Layout objects live on the Ssao instance; rebuild a matching
    // transient layout here for the pipeline layout. Identical descriptors
    // produce compatible layouts in wgpu.
    let layout_entries = technique_layout_entries(id, depth_input);
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(id.label()),
        entries: &layout_entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(id.label()),
        bind_group_layouts: &[Some(&bind_group_layout)],
        immediate_size: 0,
    });

    let key = TechniqueKey {
        shader_hash,
        color_targets: smallvec![ColorTargetKey {
            format: output_format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL.bits(),
        }],
        depth_format: None,
    };

    Ok(ctx
        .technique_cache
        .get_or_create(device, module, &pipeline_layout, &key, id.label()))
}

fn technique_binding_wgsl(id: TechniqueId, depth_input: bool) -> String {
    let uniforms_struct = concat!(
        "struct SsaoUniforms {\n",
        "    samples: array<vec4<f32>, 64>,\n",
        "    radius: f32,\n",
        "    bias: f32,\n",
        "    intensity: f32,\n",
        "    sample_count: u32,\n",
        "    noise_scale: vec2<f32>,\n",
        "    inv_resolution: vec2<f32>,\n",
        "    temporal_alpha: f32,\n",
        "    frame_index: u32,\n",
        "    _pad: vec2<u32>,\n",
        "};\n",
    );

    match id {
        TechniqueId::PrefilterDepth => {
            if depth_input {
                "@group(0) @binding(0) var src_depth: texture_depth_2d;\n\
                 @group(0) @binding(1) var src_samp: sampler;\n"
                    .to_string()
            } else {
                "@group(0) @binding(0) var src_level: texture_2d<f32>;\n\
                 @group(0) @binding(1) var src_samp: sampler;\n"
                    .to_string()
            }
        }
        TechniqueId::ComputeOcclusion => format!(
            "{uniforms_struct}\
             @group(0) @binding(0) var depth_pyramid: texture_2d<f32>;\n\
             @group(0) @binding(1) var scene_normal: texture_2d<f32>;\n\
             @group(0) @binding(2) var rotation_noise: texture_2d<f32>;\n\
             @group(0) @binding(3) var linear_samp: sampler;\n\
             @group(0) @binding(4) var point_samp: sampler;\n\
             @group(0) @binding(5) var<uniform> params: SsaoUniforms;\n"
        ),
        TechniqueId::TemporalAccumulate => format!(
            "{uniforms_struct}\
             @group(0) @binding(0) var occlusion_raw: texture_2d<f32>;\n\
             @group(0) @binding(1) var occlusion_history: texture_2d<f32>;\n\
             @group(0) @binding(2) var depth_history: texture_2d<f32>;\n\
             @group(0) @binding(3) var depth_pyramid: texture_2d<f32>;\n\
             @group(0) @binding(4) var motion_vectors: texture_2d<f32>;\n\
             @group(0) @binding(5) var linear_samp: sampler;\n\
             @group(0) @binding(6) var<uniform> params: SsaoUniforms;\n"
        ),
        TechniqueId::SpatialReconstruct => format!(
            "{uniforms_struct}\
             @group(0) @binding(0) var occlusion_accumulated: texture_2d<f32>;\n\
             @group(0) @binding(1) var depth_pyramid: texture_2d<f32>;\n\
             @group(0) @binding(2) var scene_normal: texture_2d<f32>;\n\
             @group(0) @binding(3) var linear_samp: sampler;\n\
             @group(0) @binding(4) var<uniform> params: SsaoUniforms;\n"
        ),
    }
}

fn technique_layout_entries(id: TechniqueId, depth_input: bool) -> Vec<wgpu::BindGroupLayoutEntry> {
    let tex = |binding, filterable| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    let sampler = |binding, ty| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    };
    let uniforms = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    use wgpu::SamplerBindingType::{Filtering, NonFiltering};

    match id {
        TechniqueId::PrefilterDepth => {
            if depth_input {
                vec![
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    sampler(1, NonFiltering),
                ]
            } else {
                vec![tex(0, false), sampler(1, NonFiltering)]
            }
        }
        TechniqueId::ComputeOcclusion => vec![
            tex(0, false),
            tex(1, true),
            tex(2, false),
            sampler(3, Filtering),
            sampler(4, NonFiltering),
            uniforms(5),
        ],
        TechniqueId::TemporalAccumulate => vec![
            tex(0, true),
            tex(1, true),
            tex(2, false),
            tex(3, false),
            tex(4, true),
            sampler(5, Filtering),
            uniforms(6),
        ],
        TechniqueId::SpatialReconstruct => vec![
            tex(0, true),
            tex(1, false),
            tex(2, true),
            sampler(3, Filtering),
            uniforms(4),
        ],
    }
}

fn upload_1x1(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    pixel: [u8; 4],
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixel,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
