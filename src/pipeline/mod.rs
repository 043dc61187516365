//! Pipeline-state permutation management: cache keys, the partitioned PSO
//! cache, shader source generation, and the shared shader-module cache.

pub mod cache;
pub mod key;
pub mod shader_gen;
pub mod shader_manager;
pub mod vertex;

pub use cache::{PipelineCache, PipelineId, build_scene_pipeline};
pub use key::{
    BlendStateKey, ColorTargetKey, FixedFunctionKey, TechniqueKey, VariantKey, fx_hash_key,
};
pub use shader_gen::{
    PbrBodyProvider, ShaderBodyProvider, ShaderCompilationOptions, ShaderGenerator,
    UnshadedBodyProvider,
};
pub use shader_manager::ShaderManager;
pub use vertex::{GeneratedVertexLayout, generate_vertex_layout};
