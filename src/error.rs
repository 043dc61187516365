//! Error Types
//!
//! The main error type [`RenderError`] covers the failure modes of the
//! rendering core:
//! - Fatal initialization errors (shader compilation, signature creation)
//! - Resource binding and lookup failures
//! - Attribute-buffer layout violations
//!
//! All public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, RenderError>`.
//!
//! Recoverable per-draw conditions (missing material binding, invalid
//! primitive index) are *not* errors at this level — the dispatcher logs
//! them and skips the draw, per the degradation policy.

use thiserror::Error;

/// The main error type of the rendering core.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Pipeline & Shader Errors
    // ========================================================================
    /// Shader template rendering failed (missing template, bad syntax,
    /// undefined macro reference).
    #[error("Shader generation failed for template '{template}': {message}")]
    ShaderGeneration {
        /// Template name that failed to render.
        template: String,
        /// Underlying template-engine message.
        message: String,
    },

    /// Pipeline creation was requested for a variant the renderer settings
    /// do not support.
    #[error("Unsupported pipeline variant: {0}")]
    UnsupportedVariant(String),

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// Binding signature creation failed.
    #[error("Failed to create binding signature: {0}")]
    SignatureCreation(String),

    /// A texture attribute was requested without a registered attribute index.
    #[error("Texture attribute '{0}' has no registered index")]
    UnregisteredAttribute(&'static str),

    /// The frame-global binding could not be built. Rendering for the frame
    /// must be skipped.
    #[error("Frame binding creation failed: {0}")]
    FrameBinding(String),

    // ========================================================================
    // Attribute Buffer Errors
    // ========================================================================
    /// The per-primitive attribute writer would exceed the destination
    /// capacity. Always checked, never silently corrupting.
    #[error("Attribute write overflow: need {required} bytes, capacity {capacity}")]
    AttributeOverflow {
        /// Bytes the write would produce.
        required: usize,
        /// Destination capacity in bytes.
        capacity: usize,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A resource-table entry was requested before it was created.
    #[error("Resource '{0}' is not resident")]
    ResourceNotResident(&'static str),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
