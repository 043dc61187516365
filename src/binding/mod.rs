//! Shader Resource Binding (SRB) Management
//!
//! Builds and maintains the mapping from named shader slots to concrete GPU
//! resource views, split across three bind groups:
//!
//! | Group | Content                               | Scope                    |
//! |-------|---------------------------------------|--------------------------|
//! | 0     | Frame constants, IBL maps, BRDF LUT   | static (render-wide)     |
//! | 1     | Material textures                     | mutable (per material)   |
//! | 2     | Primitive attributes (dynamic offset) | dynamic (per draw)       |
//!
//! Two material paths exist: one binding instance per material (model
//! rendering), or one shared instance over a streamed texture atlas
//! re-resolved whenever the streamer's version counter changes
//! (invalidate-and-rebuild, never incremental). The atlas path is also the
//! packed texture-array mode for binding-slot-starved targets: all textures
//! live in one indexed array resource and per-attribute indices come from
//! the settings registry, assigned once and never reused.

pub mod frame;
pub mod views;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::error::{RenderError, Result};
use crate::features::FeatureFlags;
use crate::model::Model;
use crate::resources::DefaultTextures;
use crate::resources::dynamic_buffer::DynamicBuffer;
use crate::settings::RendererSettings;

pub use frame::{FrameBinding, FrameUniforms, IblMaps};
pub use views::ViewCache;

slotmap::new_key_type! {
    /// Handle to one material binding instance.
    pub struct SrbKey;
}

/// A per-material binding instance (group 1).
pub struct MaterialBinding {
    pub bind_group: wgpu::BindGroup,
    pub layout: Arc<wgpu::BindGroupLayout>,
    /// The normalized map-bit set the signature was built for.
    pub flags: FeatureFlags,
}

/// Streamed-atlas texture source for the shared cache binding.
///
/// The manager compares `version()` against the last resolved value; any
/// change invalidates the whole binding and it is rebuilt from scratch.
pub trait TextureStreamer {
    fn version(&self) -> u64;
    fn array_view(&self) -> &wgpu::TextureView;
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Owner of all binding instances and the layout / view caches.
pub struct SrbManager {
    layout_cache: FxHashMap<u64, Arc<wgpu::BindGroupLayout>>,
    view_cache: ViewCache,
    material_bindings: SlotMap<SrbKey, MaterialBinding>,
    material_sampler: wgpu::Sampler,
    /// (resolved streamer version, slot) of the shared atlas SRB.
    cache_binding: Option<(u64, SrbKey)>,
}

impl SrbManager {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        Self {
            layout_cache: FxHashMap::default(),
            view_cache: ViewCache::new(),
            material_bindings: SlotMap::with_key(),
            material_sampler,
            cache_binding: None,
        }
    }

    // ── Layouts ──────────────────────────────────────────────────────────────

    /// Layout for a material signature: one `texture_2d` per set map bit in
    /// canonical order plus the shared sampler — or, in packed mode, one
    /// `texture_2d_array` plus the sampler regardless of flags.
    ///
    /// Layouts are cached by (map bits, mode); materials with equal texture
    /// sets share one layout object.
    pub fn material_layout(
        &mut self,
        device: &wgpu::Device,
        flags: FeatureFlags,
        packed: bool,
    ) -> Arc<wgpu::BindGroupLayout> {
        let map_bits = flags & FeatureFlags::all_map_bits();
        let cache_key =
            crate::pipeline::fx_hash_key(&(map_bits.bits(), packed));

        if let Some(layout) = self.layout_cache.get(&cache_key) {
            return layout.clone();
        }

        let mut entries = Vec::new();
        let mut binding = 0u32;

        if packed {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2Array,
                    multisampled: false,
                },
                count: None,
            });
            binding += 1;
        } else {
            for _attrib in flags.texture_attribs() {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
                binding += 1;
            }
        }

        // Shared sampler, always last.
        entries.push(wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let layout = Arc::new(
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Material Binding Layout"),
                entries: &entries,
            }),
        );
        self.layout_cache.insert(cache_key, layout.clone());
        layout
    }

    /// WGSL declarations for group 1 matching [`material_layout`].
    #[must_use]
    pub fn material_binding_wgsl(flags: FeatureFlags, packed: bool) -> String {
        let mut code = String::from("// --- Material bindings (group 1) ---\n");
        let mut binding = 0u32;

        if packed {
            code.push_str(
                "@group(1) @binding(0) var material_tex_array: texture_2d_array<f32>;\n",
            );
            binding = 1;
        } else {
            for attrib in flags.texture_attribs() {
                code.push_str(&format!(
                    "@group(1) @binding({binding}) var {}_tex: texture_2d<f32>;\n",
                    attrib.name()
                ));
                binding += 1;
            }
        }
        code.push_str(&format!(
            "@group(1) @binding({binding}) var material_samp: sampler;\n"
        ));
        code
    }

    // ── Per-material bindings (model path) ───────────────────────────────────

    /// Allocates a binding instance for one material.
    ///
    /// Each texture slot of the (normalized) flag set resolves to the
    /// material's texture view; a missing or dangling texture degrades to
    /// the matching default (flat normal for normal slots, etc.) instead of
    /// leaving the slot unbound.
    pub fn create_material_binding(
        &mut self,
        device: &wgpu::Device,
        model: &Model,
        material_index: usize,
        flags: FeatureFlags,
        defaults: &DefaultTextures,
    ) -> Result<SrbKey> {
        let material = model.materials.get(material_index).ok_or_else(|| {
            RenderError::SignatureCreation(format!("material index {material_index} out of range"))
        })?;

        let layout = self.material_layout(device, flags, false);

        // Warm the view cache first; the collection pass below only takes
        // shared borrows.
        for attrib in flags.texture_attribs() {
            if let Some(binding) = material.texture(attrib) {
                self.view_cache
                    .get_or_create(model, binding.source, wgpu::TextureViewDimension::D2);
            }
        }

        let mut resolved: Vec<&wgpu::TextureView> = Vec::new();
        for attrib in flags.texture_attribs() {
            let view = material
                .texture(attrib)
                .and_then(|binding| self.view_cache.get(binding.source, wgpu::TextureViewDimension::D2));
            match view {
                Some(view) => resolved.push(view),
                None => {
                    log::debug!(
                        "material '{}': no {} texture, using default",
                        material.name,
                        attrib.name()
                    );
                    resolved.push(defaults.for_attrib(attrib));
                }
            }
        }

        let mut entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: resolved.len() as u32,
            resource: wgpu::BindingResource::Sampler(&self.material_sampler),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Material BindGroup '{}'", material.name)),
            layout: &layout,
            entries: &entries,
        });

        Ok(self.material_bindings.insert(MaterialBinding {
            bind_group,
            layout,
            flags,
        }))
    }

    /// `CreateResourceBindings(model)`: one SRB per material, in material
    /// order. A failed material logs and yields `None` in its slot; the
    /// dispatcher skips draws referencing it.
    pub fn create_bindings_for_model(
        &mut self,
        device: &wgpu::Device,
        model: &Model,
        settings: &RendererSettings,
        defaults: &DefaultTextures,
    ) -> Vec<Option<SrbKey>> {
        (0..model.materials.len())
            .map(|index| {
                let flags = model.materials[index].feature_request().normalize(settings);
                match self.create_material_binding(device, model, index, flags, defaults) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        log::error!("material binding {index} failed: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    #[must_use]
    pub fn get(&self, key: SrbKey) -> Option<&MaterialBinding> {
        self.material_bindings.get(key)
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.material_bindings.len()
    }

    // ── Shared cache binding (streamed-atlas path) ───────────────────────────

    /// Returns the shared binding over the streamer's texture array,
    /// rebuilding it wholesale when the streamer's version counter moved.
    ///
    /// The returned key is stable across rebuilds, so a host in packed mode
    /// can hand the dispatcher `vec![Some(key); material_count]` once and
    /// keep rendering through atlas updates.
    pub fn cache_binding(
        &mut self,
        device: &wgpu::Device,
        streamer: &dyn TextureStreamer,
        flags: FeatureFlags,
    ) -> SrbKey {
        let version = streamer.version();
        if let Some((resolved_version, key)) = self.cache_binding
            && resolved_version == version
        {
            return key;
        }

        log::debug!("cache binding: re-resolving (atlas version {version})");
        let layout = self.material_layout(device, flags, true);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cache BindGroup"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(streamer.array_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                },
            ],
        });

        let binding = MaterialBinding {
            bind_group,
            layout,
            flags,
        };
        let key = match self.cache_binding {
            Some((_, key)) => {
                self.material_bindings[key] = binding;
                key
            }
            None => self.material_bindings.insert(binding),
        };
        self.cache_binding = Some((version, key));
        key
    }

    /// Drops cached views and bindings that reference a model being
    /// unloaded.
    pub fn clear_model_state(&mut self) {
        self.view_cache.clear();
        self.material_bindings.clear();
    }
}

// ─── Primitive binding (group 2, dynamic scope) ──────────────────────────────

/// The dynamic-offset binding over the per-frame attribute and joint
/// buffers.
///
/// One binding serves every variant: the bound attribute range is the
/// maximum block size and each draw supplies its two dynamic offsets
/// (attributes, joints). Must be re-created whenever either dynamic buffer
/// reallocates (generation change) — [`ensure`](Self::ensure) does that
/// check every frame.
pub struct PrimitiveBinding {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: Option<wgpu::BindGroup>,
    bound_generations: (u64, u64),
    max_block_size: u64,
}

impl PrimitiveBinding {
    #[must_use]
    pub fn new(device: &wgpu::Device, max_block_size: u64) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Primitive Binding Layout"),
            entries: &[
                // Binding 0: per-primitive attributes
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Binding 1: joint matrices (read by skinned variants only)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        Self {
            layout,
            bind_group: None,
            bound_generations: (0, 0),
            max_block_size,
        }
    }

    /// Rebinds when either buffer was reallocated.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        attribs: &DynamicBuffer,
        joints: &DynamicBuffer,
    ) {
        let generations = (attribs.generation(), joints.generation());
        if self.bind_group.is_some() && self.bound_generations == generations {
            return;
        }

        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Primitive BindGroup"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: attribs.buffer(),
                        offset: 0,
                        size: std::num::NonZeroU64::new(self.max_block_size),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: joints.buffer(),
                        offset: 0,
                        size: None,
                    }),
                },
            ],
        }));
        self.bound_generations = generations;
    }

    /// WGSL declarations for group 2; the `PrimitiveAttribs` struct itself
    /// comes from the attribute schema.
    #[must_use]
    pub fn binding_wgsl(flags: crate::features::FeatureFlags) -> String {
        let mut code =
            String::from("@group(2) @binding(0) var<uniform> primitive: PrimitiveAttribs;\n");
        if flags.contains(crate::features::FeatureFlags::SKINNING) {
            code.push_str(
                "@group(2) @binding(1) var<storage, read> joint_matrices: array<mat4x4<f32>>;\n",
            );
        }
        code
    }
}
