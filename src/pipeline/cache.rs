//! Pipeline State Cache
//!
//! Central owner of all compiled render pipelines. Pipelines are stored in a
//! contiguous `Vec` and addressed through lightweight [`PipelineId`] handles.
//!
//! # Two-level keying
//!
//! Lookups are partitioned coarsely by [`FixedFunctionKey`] (one sub-cache
//! per distinct render-target configuration) and finely by the normalized
//! [`VariantKey`]. The guarantee: at most one compiled pipeline exists per
//! distinct `(fixed-function, normalized variant)` pair for the lifetime of
//! the cache. Entries are never evicted; the key space is bounded by the
//! feature combinations a scene actually exercises.
//!
//! # Alpha-mode aliasing
//!
//! Mask variants perform per-pixel discard against the alpha-cutoff
//! attribute instead of toggling fixed-function blend state, so a mask key
//! and its opaque twin intentionally resolve to the *same* pipeline object:
//! one compilation inserts both cache entries.
//!
//! # Testability
//!
//! The cache is generic over the stored pipeline type `P` and takes the
//! compile step as a factory closure, so the dedup/aliasing semantics are
//! exercised in tests with counting factories and no GPU device.

use rustc_hash::FxHashMap;

use super::key::{FixedFunctionKey, VariantKey};
use super::shader_gen::{ShaderBodyProvider, ShaderCompilationOptions};
use super::shader_manager::ShaderManager;
use super::vertex::generate_vertex_layout;
use crate::error::Result;
use crate::model::AlphaMode;
use crate::settings::RendererSettings;

// ─── Pipeline Id ─────────────────────────────────────────────────────────────

/// Index into the cache's pipeline storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u32);

impl PipelineId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ─── Pipeline Cache ──────────────────────────────────────────────────────────

/// Partitioned pipeline storage and deduplication cache.
pub struct PipelineCache<P = wgpu::RenderPipeline> {
    pipelines: Vec<P>,
    partitions: FxHashMap<FixedFunctionKey, FxHashMap<VariantKey, PipelineId>>,
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PipelineCache<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipelines: Vec::with_capacity(64),
            partitions: FxHashMap::default(),
        }
    }

    /// Retrieve a pipeline by handle. **Panics** if the id is invalid.
    #[inline]
    #[must_use]
    pub fn get(&self, id: PipelineId) -> &P {
        &self.pipelines[id.index()]
    }

    /// Number of live compiled pipelines (aliased entries count once).
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Clears everything (render-target format change).
    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.partitions.clear();
    }

    /// Looks up or creates the pipeline for `(fixed, key)`.
    ///
    /// The key is normalized against `settings` before the lookup, so flag
    /// sets that normalize equal share one entry. With
    /// `create_if_missing = false` a miss returns `Ok(None)` and has no side
    /// effects — the hot path uses this to assert cache consistency.
    ///
    /// On a creating miss, `factory` runs exactly once; its failure
    /// propagates and **no entry is inserted**, so a later call retries
    /// compilation (no negative caching).
    pub fn get_or_create(
        &mut self,
        settings: &RendererSettings,
        fixed: &FixedFunctionKey,
        key: &VariantKey,
        create_if_missing: bool,
        factory: impl FnOnce(&VariantKey) -> Result<P>,
    ) -> Result<Option<PipelineId>> {
        let key = key.normalized(settings);

        if let Some(partition) = self.partitions.get(fixed)
            && let Some(&id) = partition.get(&key)
        {
            return Ok(Some(id));
        }

        if !create_if_missing {
            return Ok(None);
        }

        let pipeline = factory(&key)?;
        let id = PipelineId(self.pipelines.len() as u32);
        self.pipelines.push(pipeline);

        let partition = self.partitions.entry(*fixed).or_default();
        partition.insert(key, id);

        // Mask shares the opaque pipeline (per-pixel discard, identical
        // fixed-function state): insert the twin entry up front.
        match key.alpha_mode {
            AlphaMode::Opaque => {
                partition.insert(
                    VariantKey {
                        alpha_mode: AlphaMode::Mask,
                        ..key
                    },
                    id,
                );
            }
            AlphaMode::Mask => {
                partition.insert(
                    VariantKey {
                        alpha_mode: AlphaMode::Opaque,
                        ..key
                    },
                    id,
                );
            }
            AlphaMode::Blend => {}
        }

        Ok(Some(id))
    }
}

// ─── Scene pipeline factory ──────────────────────────────────────────────────

/// Builds the full `wgpu` pipeline for one scene variant.
///
/// Synthesizes shader source from the variant key (vertex-input struct text,
/// varyings text, fragment-output struct from the body provider, macro
/// block), compiles both stages through the shared module cache, and derives
/// blend / cull / depth state from the key.
pub fn build_scene_pipeline(
    device: &wgpu::Device,
    shader_manager: &mut ShaderManager,
    body_provider: &dyn ShaderBodyProvider,
    settings: &RendererSettings,
    fixed: &FixedFunctionKey,
    key: &VariantKey,
    binding_code: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> Result<wgpu::RenderPipeline> {
    let layout_gen = generate_vertex_layout(key.flags);
    let options = ShaderCompilationOptions::for_variant(settings, key);

    let binding_code = format!(
        "{}\n{}",
        binding_code,
        body_provider.fragment_output_code(key)
    );

    let (shader_module, _code_hash) = shader_manager.get_or_compile_template(
        device,
        body_provider.template_name(key),
        &options,
        &layout_gen.vertex_input_code,
        &layout_gen.varyings_code,
        &binding_code,
    )?;

    let bind_group_layouts: Vec<Option<&wgpu::BindGroupLayout>> =
        bind_group_layouts.iter().map(|l| Some(*l)).collect();
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Scene Pipeline Layout"),
        bind_group_layouts: &bind_group_layouts,
        immediate_size: 0,
    });

    let vertex_buffers_layout: Vec<_> = layout_gen.buffers.iter().map(|l| l.as_wgpu()).collect();

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Scene Render Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader_module,
            entry_point: Some("vs_main"),
            buffers: &vertex_buffers_layout,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader_module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: fixed.color_format,
                blend: key.blend_state(),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: fixed.topology,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.cull_mode(),
            polygon_mode: fixed.polygon_mode,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: fixed.depth_format,
            depth_write_enabled: Some(key.depth_write()),
            depth_compare: Some(wgpu::CompareFunction::GreaterEqual),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: fixed.sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
        cache: None,
    });

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureFlags;

    fn test_key(flags: FeatureFlags, alpha_mode: AlphaMode) -> VariantKey {
        VariantKey {
            flags,
            alpha_mode,
            ..VariantKey::default()
        }
    }

    #[test]
    fn miss_without_create_has_no_side_effects() {
        let settings = RendererSettings::default();
        let fixed = FixedFunctionKey::scene(&settings);
        let mut cache: PipelineCache<u32> = PipelineCache::new();

        let result = cache
            .get_or_create(
                &settings,
                &fixed,
                &test_key(FeatureFlags::empty(), AlphaMode::Opaque),
                false,
                |_| Ok(0),
            )
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(cache.pipeline_count(), 0);
    }

    #[test]
    fn equal_normalized_keys_compile_once() {
        let settings = RendererSettings::default();
        let fixed = FixedFunctionKey::scene(&settings);
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let mut compiles = 0;

        // SHEEN_COLOR_MAP without SHEEN normalizes away, so both keys are
        // the minimal variant.
        let a = test_key(FeatureFlags::SHEEN_COLOR_MAP, AlphaMode::Opaque);
        let b = test_key(FeatureFlags::empty(), AlphaMode::Opaque);

        let id_a = cache
            .get_or_create(&settings, &fixed, &a, true, |_| {
                compiles += 1;
                Ok(compiles)
            })
            .unwrap();
        let id_b = cache
            .get_or_create(&settings, &fixed, &b, true, |_| {
                compiles += 1;
                Ok(compiles)
            })
            .unwrap();

        assert_eq!(id_a, id_b);
        assert_eq!(compiles, 1);
        assert_eq!(cache.pipeline_count(), 1);
    }

    #[test]
    fn failed_factory_is_retried() {
        let settings = RendererSettings::default();
        let fixed = FixedFunctionKey::scene(&settings);
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let key = test_key(FeatureFlags::empty(), AlphaMode::Opaque);

        let err = cache.get_or_create(&settings, &fixed, &key, true, |_| {
            Err(crate::error::RenderError::UnsupportedVariant("boom".into()))
        });
        assert!(err.is_err());
        assert_eq!(cache.pipeline_count(), 0);

        // No negative caching: the next call compiles.
        let id = cache
            .get_or_create(&settings, &fixed, &key, true, |_| Ok(7))
            .unwrap();
        assert!(id.is_some());
        assert_eq!(cache.pipeline_count(), 1);
    }

    #[test]
    fn mask_aliases_opaque_pipeline() {
        let settings = RendererSettings::default();
        let fixed = FixedFunctionKey::scene(&settings);
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let mut compiles = 0;

        let opaque = cache
            .get_or_create(
                &settings,
                &fixed,
                &test_key(FeatureFlags::empty(), AlphaMode::Opaque),
                true,
                |_| {
                    compiles += 1;
                    Ok(1)
                },
            )
            .unwrap();
        let mask = cache
            .get_or_create(
                &settings,
                &fixed,
                &test_key(FeatureFlags::empty(), AlphaMode::Mask),
                true,
                |_| {
                    compiles += 1;
                    Ok(2)
                },
            )
            .unwrap();

        assert_eq!(opaque, mask);
        assert_eq!(compiles, 1);

        // Blend is its own pipeline.
        let blend = cache
            .get_or_create(
                &settings,
                &fixed,
                &test_key(FeatureFlags::empty(), AlphaMode::Blend),
                true,
                |_| {
                    compiles += 1;
                    Ok(3)
                },
            )
            .unwrap();
        assert_ne!(blend, opaque);
        assert_eq!(compiles, 2);
    }

    #[test]
    fn distinct_fixed_function_partitions_do_not_share() {
        let settings = RendererSettings::default();
        let scene = FixedFunctionKey::scene(&settings);
        let wire = FixedFunctionKey::wireframe(&settings);
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let key = test_key(FeatureFlags::empty(), AlphaMode::Opaque);

        let a = cache
            .get_or_create(&settings, &scene, &key, true, |_| Ok(1))
            .unwrap();
        let b = cache
            .get_or_create(&settings, &wire, &key, true, |_| Ok(2))
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.pipeline_count(), 2);
    }
}
