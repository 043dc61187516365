//! GPU resource ownership: the logical handle table, default textures, and
//! the per-frame dynamic attribute buffer.

pub mod defaults;
pub mod dynamic_buffer;
pub mod table;

pub use defaults::{DefaultKind, DefaultTextures};
pub use dynamic_buffer::DynamicBuffer;
pub use table::{ResourceId, ResourceTable, TableTextureDesc};
