//! Resource Handle Table
//!
//! Keyed lookup of GPU textures by logical identifier. Entries are created
//! lazily and rebuilt in place when their descriptor changes (window resize,
//! feature-flag change); every rebuild bumps the entry's generation counter.
//!
//! Consumers must treat a handle as valid for **one frame only**: re-fetch
//! from the table instead of caching the view across a frame boundary, and
//! compare generations when a cached derived object (bind group) depends on
//! the entry.

use rustc_hash::FxHashMap;

/// Logical identity of a table-owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// Prefiltered depth mip chain (PostFX input pyramid).
    PrefilteredDepth,
    /// Previous-frame depth, reprojected.
    DepthHistory,
    /// Raw per-pixel occlusion before accumulation.
    OcclusionRaw,
    /// Temporal occlusion history.
    OcclusionHistory,
    /// Temporally accumulated occlusion (input to spatial reconstruction).
    OcclusionAccumulated,
    /// Final resolved occlusion (the effect's published output).
    OcclusionResolved,
    /// Intermediate whole-texture copy target for devices without
    /// per-mip subresource views.
    ConvolutionScratch,
    /// Tiled rotation noise for the occlusion kernel.
    BlueNoise,
    /// Caller-defined slot.
    User(u32),
}

/// Texture shape a table entry is allocated with. A changed descriptor
/// triggers reallocation and a generation bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableTextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub usage: wgpu::TextureUsages,
    pub label: &'static str,
}

/// One live table entry.
pub struct TableEntry {
    pub texture: wgpu::Texture,
    /// Full-texture default view.
    pub view: wgpu::TextureView,
    pub desc: TableTextureDesc,
    /// Bumped on every reallocation.
    pub generation: u64,
}

/// The handle table. Owned by the renderer instance; passed explicitly to
/// whoever needs a handle (no ambient state).
#[derive(Default)]
pub struct ResourceTable {
    entries: FxHashMap<ResourceId, TableEntry>,
}

impl ResourceTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Returns the entry for `id`, (re)allocating when absent or when the
    /// descriptor changed. The generation counter survives reallocation and
    /// increments with it.
    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        id: ResourceId,
        desc: &TableTextureDesc,
    ) -> &TableEntry {
        let needs_create = match self.entries.get(&id) {
            Some(entry) => entry.desc != *desc,
            None => true,
        };

        if needs_create {
            let prev_generation = self.entries.get(&id).map_or(0, |e| e.generation);
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: desc.mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: desc.format,
                usage: desc.usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            if prev_generation > 0 {
                log::debug!("resource table: rebuilt '{}' (gen {})", desc.label, prev_generation + 1);
            }
            self.entries.insert(
                id,
                TableEntry {
                    texture,
                    view,
                    desc: *desc,
                    generation: prev_generation + 1,
                },
            );
        }

        self.entries.get(&id).expect("entry just ensured")
    }

    /// Fetches an existing entry without allocation.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&TableEntry> {
        self.entries.get(&id)
    }

    /// Current generation of `id` (0 = never allocated).
    #[must_use]
    pub fn generation(&self, id: ResourceId) -> u64 {
        self.entries.get(&id).map_or(0, |e| e.generation)
    }

    /// Drops an entry (its GPU resource is released when the last view
    /// handle goes away).
    pub fn remove(&mut self, id: ResourceId) {
        self.entries.remove(&id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
