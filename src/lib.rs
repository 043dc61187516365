#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod attributes;
pub mod binding;
pub mod defines;
pub mod dispatch;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod postfx;
pub mod resources;
pub mod settings;
pub mod utils;

pub use defines::ShaderDefines;
pub use dispatch::Renderer;
pub use error::{RenderError, Result};
pub use features::{FeatureFlags, TextureAttrib};
pub use model::{AlphaMode, Material, Model, Node, Primitive};
pub use pipeline::{PipelineCache, VariantKey};
pub use postfx::{PostFxContext, Ssao};
pub use settings::{DebugView, RendererSettings};
