//! Global string interner.
//!
//! Converts shader macro names and values into integer [`Symbol`]s so that
//! macro sets compare and hash as integer slices. This is the foundation of
//! the variant-key system: two macro sets built in different orders intern
//! to the same symbols and hash identically.

use std::sync::OnceLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: OnceLock<ThreadedRodeo> = OnceLock::new();

/// A compact integer identifier for an interned string.
pub type Symbol = Spur;

fn interner() -> &'static ThreadedRodeo {
    INTERNER.get_or_init(ThreadedRodeo::new)
}

/// Interns a string, returning its [`Symbol`].
///
/// Returns the existing symbol when the string is already resident.
#[inline]
pub fn intern(s: &str) -> Symbol {
    interner().get_or_intern(s)
}

/// Looks up the [`Symbol`] of an already-interned string without allocating.
#[inline]
#[must_use]
pub fn get(s: &str) -> Option<Symbol> {
    interner().get(s)
}

/// Resolves a [`Symbol`] back to its string.
///
/// # Panics
/// Panics if the symbol did not come from this interner.
#[inline]
#[must_use]
pub fn resolve(sym: Symbol) -> &'static str {
    interner().resolve(&sym)
}

/// Pre-interns the macro names the hot path emits every frame.
///
/// Called once at renderer construction so per-draw macro building never
/// takes the interner's insert path.
pub fn preload_common_macros() {
    let common = [
        // Base material maps
        "USE_BASE_COLOR_MAP",
        "USE_NORMAL_MAP",
        "USE_METALLIC_ROUGHNESS_MAP",
        "USE_OCCLUSION_MAP",
        "USE_EMISSIVE_MAP",
        // Extension toggles
        "ENABLE_CLEARCOAT",
        "ENABLE_SHEEN",
        "ENABLE_ANISOTROPY",
        "ENABLE_IRIDESCENCE",
        "ENABLE_TRANSMISSION",
        "ENABLE_VOLUME",
        // Extension maps
        "USE_CLEARCOAT_MAP",
        "USE_CLEARCOAT_ROUGHNESS_MAP",
        "USE_CLEARCOAT_NORMAL_MAP",
        "USE_SHEEN_COLOR_MAP",
        "USE_SHEEN_ROUGHNESS_MAP",
        "USE_ANISOTROPY_MAP",
        "USE_IRIDESCENCE_MAP",
        "USE_IRIDESCENCE_THICKNESS_MAP",
        "USE_TRANSMISSION_MAP",
        "USE_THICKNESS_MAP",
        // Lighting / vertex
        "USE_IBL",
        "ENABLE_SKINNING",
        "ENABLE_MOTION_VECTORS",
        "USE_VERTEX_COLORS",
        "USE_TEXCOORD1",
        "UNSHADED",
        // Pipeline
        "ALPHA_MODE",
        "ALPHA_MODE_OPAQUE",
        "ALPHA_MODE_MASK",
        "ALPHA_MODE_BLEND",
        "DEBUG_VIEW",
        "MAX_JOINT_COUNT",
        "PACKED_TEXTURE_ARRAY",
        // PostFX
        "HALF_RESOLUTION",
        "HALF_PRECISION_DEPTH",
        "UNIFORM_WEIGHTING",
        // Common values
        "0",
        "1",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("hello");
        let s2 = intern("hello");
        let s3 = intern("world");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "hello");
        assert_eq!(resolve(s3), "world");
    }

    #[test]
    fn test_get() {
        let _ = intern("existing");

        assert!(get("existing").is_some());
        assert!(get("this_string_is_never_interned").is_none());
    }
}
