//! Render-List Sorter / Draw Dispatcher
//!
//! Per frame: collect visible primitives into alpha-mode buckets, sort each
//! bucket by state key to minimize pipeline/SRB switches, then dispatch the
//! buckets in fixed order — opaque, then mask, then blend. The blend bucket
//! is additionally depth-sorted back-to-front (the packed sort key inverts
//! for it), so transparency composites correctly.
//!
//! Bucket ordering is a correctness property; the state-key sort inside a
//! bucket is purely a performance property — redundant pipeline and
//! bind-group rebinding is elided against the previously bound state either
//! way.

use bitflags::bitflags;

use crate::attributes::{attribs_size, attribs_struct_wgsl, write_attribs};
use crate::binding::{
    FrameBinding, FrameUniforms, IblMaps, PrimitiveBinding, SrbKey, SrbManager,
};
use crate::error::Result;
use crate::features::FeatureFlags;
use crate::model::{AlphaMode, Model};
use crate::pipeline::{
    FixedFunctionKey, PipelineCache, PipelineId, ShaderBodyProvider, ShaderManager, VariantKey,
    build_scene_pipeline, vertex::stream_names,
};
use crate::resources::{DefaultTextures, DynamicBuffer};
use crate::settings::{DebugView, RendererSettings};

bitflags! {
    /// Which alpha-mode buckets a render invocation draws.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlphaModeMask: u8 {
        const OPAQUE = 1 << 0;
        const MASK   = 1 << 1;
        const BLEND  = 1 << 2;
    }
}

impl AlphaModeMask {
    #[must_use]
    pub fn contains_mode(self, mode: AlphaMode) -> bool {
        match mode {
            AlphaMode::Opaque => self.contains(Self::OPAQUE),
            AlphaMode::Mask => self.contains(Self::MASK),
            AlphaMode::Blend => self.contains(Self::BLEND),
        }
    }
}

impl Default for AlphaModeMask {
    fn default() -> Self {
        Self::all()
    }
}

// ─── Sort key ────────────────────────────────────────────────────────────────

/// Packed state sort key: pipeline (14 bits) | material (20 bits) |
/// depth (30 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderKey(u64);

impl RenderKey {
    #[must_use]
    pub fn new(pipeline_id: u16, material_index: u32, depth: f32) -> Self {
        let p_bits = u64::from(pipeline_id & 0x3FFF) << 50;
        let m_bits = u64::from(material_index & 0xF_FFFF) << 30;
        let d_u32 = if depth.is_sign_negative() {
            0
        } else {
            depth.to_bits() >> 2
        };
        let d_bits = u64::from(d_u32) & 0x3FFF_FFFF;
        Self(p_bits | m_bits | d_bits)
    }
}

// ─── Commands & queues ───────────────────────────────────────────────────────

/// One GPU-ready draw.
#[derive(Clone, Copy, Debug)]
pub struct RenderCommand {
    pub pipeline_id: PipelineId,
    pub srb: SrbKey,
    pub material_index: u32,
    pub primitive_index: u32,
    /// Normalized variant flags (selects vertex streams at dispatch).
    pub flags: FeatureFlags,
    pub attrib_offset: u32,
    pub joint_offset: u32,
    pub sort_key: RenderKey,
}

/// The three alpha-mode buckets. Ordering contract: iteration yields every
/// opaque command, then every mask command, then every blend command,
/// regardless of the order primitives were pushed.
#[derive(Default)]
pub struct RenderQueues {
    pub opaque: Vec<RenderCommand>,
    pub mask: Vec<RenderCommand>,
    pub blend: Vec<RenderCommand>,
}

impl RenderQueues {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.mask.clear();
        self.blend.clear();
    }

    pub fn push(&mut self, mode: AlphaMode, cmd: RenderCommand) {
        match mode {
            AlphaMode::Opaque => self.opaque.push(cmd),
            AlphaMode::Mask => self.mask.push(cmd),
            AlphaMode::Blend => self.blend.push(cmd),
        }
    }

    /// Sorts each bucket: opaque and mask front-to-back by state key
    /// (early-Z plus minimal switches), blend back-to-front so blending
    /// composites in depth order.
    pub fn sort(&mut self) {
        self.opaque.sort_unstable_by(|a, b| a.sort_key.cmp(&b.sort_key));
        self.mask.sort_unstable_by(|a, b| a.sort_key.cmp(&b.sort_key));
        self.blend.sort_unstable_by(|a, b| b.sort_key.cmp(&a.sort_key));
    }

    /// Commands in dispatch order: opaque → mask → blend.
    pub fn iter_in_order(&self) -> impl Iterator<Item = &RenderCommand> {
        self.opaque
            .iter()
            .chain(self.mask.iter())
            .chain(self.blend.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.mask.len() + self.blend.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Render parameters ───────────────────────────────────────────────────────

/// Per-invocation render configuration.
pub struct RenderParams {
    /// Renderer-wide feature requests merged into every primitive's flags
    /// (only MOTION_VECTORS, IBL and UNSHADED are honored here; material
    /// and vertex bits come from the scene data).
    pub features: FeatureFlags,
    pub alpha_modes: AlphaModeMask,
    pub debug_view: DebugView,
    pub wireframe: bool,
    pub clear_color: wgpu::Color,
    pub frame: FrameUniforms,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            features: FeatureFlags::IBL,
            alpha_modes: AlphaModeMask::all(),
            debug_view: DebugView::None,
            wireframe: false,
            clear_color: wgpu::Color::BLACK,
            frame: FrameUniforms::default(),
        }
    }
}

const RENDER_WIDE_BITS: FeatureFlags = FeatureFlags::MOTION_VECTORS
    .union(FeatureFlags::IBL)
    .union(FeatureFlags::UNSHADED);

// ─── Renderer ────────────────────────────────────────────────────────────────

/// The scene renderer: owns every cache and binding object and drives the
/// per-frame state machine (`begin → collect → sort → dispatch → end`).
pub struct Renderer {
    pub settings: RendererSettings,
    pipeline_cache: PipelineCache,
    shader_manager: ShaderManager,
    pub srb_manager: SrbManager,
    frame_binding: FrameBinding,
    primitive_binding: PrimitiveBinding,
    attrib_buffer: DynamicBuffer,
    joint_buffer: DynamicBuffer,
    defaults: DefaultTextures,
    body_provider: Box<dyn ShaderBodyProvider>,
    queues: RenderQueues,
}

impl Renderer {
    /// Builds the renderer and its static bindings. Fatal on frame-binding
    /// failure: there is no degraded mode without group 0.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        settings: RendererSettings,
        body_provider: Box<dyn ShaderBodyProvider>,
        ibl: Option<IblMaps>,
    ) -> Result<Self> {
        crate::utils::interner::preload_common_macros();

        let frame_binding = FrameBinding::new(device, queue, ibl)?;
        let max_block = attribs_size(settings.supported_features, 0) as u64;
        let primitive_binding = PrimitiveBinding::new(device, max_block);

        Ok(Self {
            settings,
            pipeline_cache: PipelineCache::new(),
            shader_manager: ShaderManager::new(),
            srb_manager: SrbManager::new(device),
            frame_binding,
            primitive_binding,
            attrib_buffer: DynamicBuffer::new(
                device,
                "Primitive Attribs",
                wgpu::BufferUsages::UNIFORM,
            ),
            joint_buffer: DynamicBuffer::new(device, "Joint Matrices", wgpu::BufferUsages::STORAGE),
            defaults: DefaultTextures::new(device, queue),
            body_provider,
            queues: RenderQueues::default(),
        })
    }

    /// `CreateResourceBindings(model)`: one SRB per material.
    pub fn create_resource_bindings(
        &mut self,
        device: &wgpu::Device,
        model: &Model,
    ) -> Vec<Option<SrbKey>> {
        self.srb_manager
            .create_bindings_for_model(device, model, &self.settings, &self.defaults)
    }

    /// Number of live compiled pipelines (diagnostics).
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipeline_cache.pipeline_count()
    }

    /// Renders one model into `color_view` / `depth_view`.
    ///
    /// Recoverable per-draw conditions (missing material, dangling node
    /// index, absent SRB) log and skip that draw; the rest of the frame
    /// proceeds. Pipeline compilation failure for a variant aborts the
    /// frame with an error — nothing was submitted yet at that point.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        model: &Model,
        bindings: &[Option<SrbKey>],
        params: &RenderParams,
    ) -> Result<()> {
        self.build_queues(device, model, bindings, params)?;

        self.attrib_buffer.end_frame(device, queue);
        self.joint_buffer.end_frame(device, queue);
        self.primitive_binding
            .ensure(device, &self.attrib_buffer, &self.joint_buffer);
        self.frame_binding.update(queue, &params.frame);

        self.dispatch(encoder, color_view, depth_view, model, params);
        Ok(())
    }

    // ── Collect phase ────────────────────────────────────────────────────────

    fn build_queues(
        &mut self,
        device: &wgpu::Device,
        model: &Model,
        bindings: &[Option<SrbKey>],
        params: &RenderParams,
    ) -> Result<()> {
        self.queues.clear();
        self.attrib_buffer.begin_frame();
        self.joint_buffer.begin_frame();

        let fixed = if params.wireframe {
            FixedFunctionKey::wireframe(&self.settings)
        } else {
            FixedFunctionKey::scene(&self.settings)
        };

        let Self {
            settings,
            pipeline_cache,
            shader_manager,
            srb_manager,
            frame_binding,
            primitive_binding,
            attrib_buffer,
            joint_buffer,
            body_provider,
            queues,
            ..
        } = self;

        for (primitive_index, primitive) in model.primitives.iter().enumerate() {
            let Some(material) = model.material_of(primitive) else {
                log::warn!(
                    "primitive {primitive_index} references missing material {}",
                    primitive.material_index
                );
                continue;
            };
            if !params.alpha_modes.contains_mode(material.alpha_mode) {
                continue;
            }
            let Some(node) = model.node_of(primitive) else {
                log::warn!(
                    "primitive {primitive_index} references missing node {}",
                    primitive.node_index
                );
                continue;
            };
            let Some(&Some(srb)) = bindings.get(primitive.material_index) else {
                log::error!(
                    "no resource binding for material {}; skipping draw",
                    primitive.material_index
                );
                continue;
            };

            let request = material.feature_request()
                | primitive.vertex_features
                | (params.features & RENDER_WIDE_BITS);
            let variant = VariantKey {
                flags: request,
                alpha_mode: material.alpha_mode,
                double_sided: material.double_sided,
                debug_view: params.debug_view,
                user_data: 0,
            }
            .normalized(settings);

            // Resolve the pipeline. The factory only runs on a true miss.
            let material_layout = srb_manager.material_layout(
                device,
                variant.flags,
                settings.packed_texture_arrays,
            );
            let packed = settings.packed_texture_arrays;
            let pipeline_id = pipeline_cache
                .get_or_create(settings, &fixed, &variant, true, |key| {
                    let binding_code = format!(
                        "{}\n{}\n{}\n{}",
                        FrameBinding::binding_wgsl(),
                        SrbManager::material_binding_wgsl(key.flags, packed),
                        attribs_struct_wgsl(key.flags),
                        PrimitiveBinding::binding_wgsl(key.flags),
                    );
                    build_scene_pipeline(
                        device,
                        shader_manager,
                        body_provider.as_ref(),
                        settings,
                        &fixed,
                        key,
                        &binding_code,
                        &[
                            &frame_binding.layout,
                            &material_layout,
                            &primitive_binding.layout,
                        ],
                    )
                })?
                .expect("create_if_missing always yields an id");

            // Per-primitive attributes (discard-and-remap region).
            let size = attribs_size(variant.flags, 0);
            let (attrib_offset, dst) = attrib_buffer.push(size);
            write_attribs(
                dst,
                settings,
                variant.flags,
                node.global_transform,
                Some(node.prev_global_transform),
                node.joints.len() as u32,
                material,
                &[],
            )?;

            // Joint matrices, clamped to the reserved capacity.
            let joint_offset = if variant.flags.contains(FeatureFlags::SKINNING)
                && !node.joints.is_empty()
            {
                let count = (node.joints.len() as u32).min(settings.max_joint_count) as usize;
                let bytes = bytemuck::cast_slice(&node.joints[..count]);
                let (offset, dst) = joint_buffer.push(bytes.len());
                dst.copy_from_slice(bytes);
                offset
            } else {
                0
            };

            let depth = params
                .frame
                .camera_position
                .distance_squared(node.global_transform.w_axis.truncate());

            queues.push(
                material.alpha_mode,
                RenderCommand {
                    pipeline_id,
                    srb,
                    material_index: primitive.material_index as u32,
                    primitive_index: primitive_index as u32,
                    flags: variant.flags,
                    attrib_offset,
                    joint_offset,
                    sort_key: RenderKey::new(
                        pipeline_id.0 as u16,
                        primitive.material_index as u32,
                        depth,
                    ),
                },
            );
        }

        queues.sort();
        Ok(())
    }

    // ── Dispatch phase ───────────────────────────────────────────────────────

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        model: &Model,
        params: &RenderParams,
    ) {
        let Some(primitive_bind_group) = &self.primitive_binding.bind_group else {
            log::warn!("primitive bind group missing, skipping frame");
            return;
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(params.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    // Reverse Z: clear to the far plane.
                    load: wgpu::LoadOp::Clear(0.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        pass.set_bind_group(0, &self.frame_binding.bind_group, &[]);

        // Redundant-state elision: rebind only on change.
        let mut bound_pipeline: Option<PipelineId> = None;
        let mut bound_srb: Option<SrbKey> = None;

        for cmd in self.queues.iter_in_order() {
            if bound_pipeline != Some(cmd.pipeline_id) {
                pass.set_pipeline(self.pipeline_cache.get(cmd.pipeline_id));
                bound_pipeline = Some(cmd.pipeline_id);
                // A new pipeline may carry a new material layout.
                bound_srb = None;
            }

            if bound_srb != Some(cmd.srb) {
                let Some(binding) = self.srb_manager.get(cmd.srb) else {
                    log::error!("stale SRB for material {}; skipping draw", cmd.material_index);
                    continue;
                };
                pass.set_bind_group(1, &binding.bind_group, &[]);
                bound_srb = Some(cmd.srb);
            }

            pass.set_bind_group(
                2,
                primitive_bind_group,
                &[cmd.attrib_offset, cmd.joint_offset],
            );

            let primitive = &model.primitives[cmd.primitive_index as usize];
            let mut slot = 0u32;
            let mut streams_ok = true;
            for name in stream_names(cmd.flags) {
                match model.stream_buffer(name) {
                    Some(buffer) => {
                        pass.set_vertex_buffer(slot, buffer.slice(..));
                        slot += 1;
                    }
                    None => {
                        log::error!("model lacks vertex stream '{name}'; skipping draw");
                        streams_ok = false;
                        break;
                    }
                }
            }
            if !streams_ok {
                continue;
            }

            if primitive.index_count > 0 {
                let Some(index_buffer) = &model.index_buffer else {
                    log::error!("indexed primitive without index buffer; skipping draw");
                    continue;
                };
                pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(
                    primitive.first_index..primitive.first_index + primitive.index_count,
                    primitive.base_vertex,
                    0..1,
                );
            } else {
                pass.draw(0..primitive.vertex_count, 0..1);
            }
        }
    }
}
