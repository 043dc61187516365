//! Reinterpreted View Cache
//!
//! Shader signatures sometimes expect array views (packed texture-array
//! mode, streamed atlases) while the loader hands over plain 2D textures.
//! Creating a `TextureView` is not free and views are compared by identity
//! in bind-group caches, so reinterpretation happens lazily and is cached
//! per `(source texture, dimension)` — never two view objects for the same
//! reinterpretation.

use rustc_hash::FxHashMap;

use crate::model::Model;

#[derive(Default)]
pub struct ViewCache {
    views: FxHashMap<(usize, wgpu::TextureViewDimension), wgpu::TextureView>,
}

impl ViewCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            views: FxHashMap::default(),
        }
    }

    /// Returns the cached view of `model.textures[source]` with the given
    /// dimension, creating it on first request.
    ///
    /// Returns `None` for a dangling source index (a loader bug; the caller
    /// falls back to a default texture).
    pub fn get_or_create(
        &mut self,
        model: &Model,
        source: usize,
        dimension: wgpu::TextureViewDimension,
    ) -> Option<&wgpu::TextureView> {
        if source >= model.textures.len() {
            return None;
        }

        Some(
            self.views
                .entry((source, dimension))
                .or_insert_with(|| {
                    let texture_source = &model.textures[source];
                    texture_source
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor {
                            label: Some(&format!("{} ({dimension:?})", texture_source.label)),
                            dimension: Some(dimension),
                            ..Default::default()
                        })
                }),
        )
    }

    /// Immutable lookup of an already-created view.
    #[must_use]
    pub fn get(
        &self,
        source: usize,
        dimension: wgpu::TextureViewDimension,
    ) -> Option<&wgpu::TextureView> {
        self.views.get(&(source, dimension))
    }

    /// Drops all cached views (model unload).
    pub fn clear(&mut self) {
        self.views.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
