//! Shader Code Generator
//!
//! Renders the final WGSL source for one variant: macro defines plus the
//! injected struct sources (vertex input, varyings, bindings / primitive
//! attributes) flow into a template picked by the active
//! [`ShaderBodyProvider`].

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use minijinja::Error;
use serde::Serialize;

use super::key::VariantKey;
use super::shader_manager::get_env;
use crate::defines::ShaderDefines;
use crate::settings::{DebugView, RendererSettings};

/// Shader compilation options: the full macro set for one variant.
#[derive(Debug, Clone, Default)]
pub struct ShaderCompilationOptions {
    pub(crate) defines: ShaderDefines,
}

impl ShaderCompilationOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: ShaderDefines::new(),
        }
    }

    /// Builds options for a scene variant key.
    #[must_use]
    pub fn for_variant(settings: &RendererSettings, key: &VariantKey) -> Self {
        Self {
            defines: ShaderDefines::from_variant(
                settings,
                key.flags,
                key.alpha_mode,
                key.debug_view,
            ),
        }
    }

    #[inline]
    #[must_use]
    pub fn defines(&self) -> &ShaderDefines {
        &self.defines
    }

    pub fn add_define(&mut self, key: &str, value: &str) {
        self.defines.set(key, value);
    }

    /// Hash of the macro set (used inside pipeline cache keys).
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        self.defines.compute_hash()
    }

    fn to_template_map(&self) -> BTreeMap<String, String> {
        self.defines.to_map()
    }
}

impl Hash for ShaderCompilationOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl PartialEq for ShaderCompilationOptions {
    fn eq(&self, other: &Self) -> bool {
        self.defines == other.defines
    }
}

impl Eq for ShaderCompilationOptions {}

#[derive(Serialize)]
struct ShaderContext<'a> {
    #[serde(flatten)]
    defines: BTreeMap<String, String>,
    vertex_input_code: &'a str,
    varyings_code: &'a str,
    binding_code: &'a str,
}

pub struct ShaderGenerator;

impl ShaderGenerator {
    /// Renders the template to final WGSL.
    ///
    /// Errors (template missing, syntax, strict-undefined) propagate to the
    /// caller; the pipeline cache converts them into a fatal initialization
    /// error for the variant without inserting a cache entry.
    pub fn generate_shader(
        vertex_input_code: &str,
        varyings_code: &str,
        binding_code: &str,
        template_name: &str,
        options: &ShaderCompilationOptions,
    ) -> Result<String, Error> {
        let env = get_env();

        let ctx = ShaderContext {
            defines: options.to_template_map(),
            vertex_input_code,
            varyings_code,
            binding_code,
        };

        let template = env.get_template(template_name)?;
        let source = template.render(&ctx)?;

        Ok(format!("// === Auto-generated Unified Shader ===\n{source}"))
    }
}

// ─── Shader Body Provider ────────────────────────────────────────────────────

/// Variant-specific shader customization point.
///
/// Each renderer flavor supplies the fragment-stage identity: which template
/// carries its main function and what the fragment output struct looks like.
/// Injected at renderer construction; replaces ad-hoc per-call-site source
/// overrides.
pub trait ShaderBodyProvider {
    /// Template (under `src/pipeline/shaders/`) holding the entry points.
    fn template_name(&self, key: &VariantKey) -> &'static str;

    /// WGSL source of the fragment output struct for this variant.
    fn fragment_output_code(&self, key: &VariantKey) -> String;
}

/// The standard PBR shading body.
pub struct PbrBodyProvider;

impl ShaderBodyProvider for PbrBodyProvider {
    fn template_name(&self, key: &VariantKey) -> &'static str {
        if key.debug_view != DebugView::None {
            "scene/debug"
        } else {
            "scene/pbr"
        }
    }

    fn fragment_output_code(&self, key: &VariantKey) -> String {
        let mut fields = vec!["    @location(0) color: vec4<f32>,".to_string()];
        if key
            .flags
            .contains(crate::features::FeatureFlags::MOTION_VECTORS)
        {
            fields.push("    @location(1) motion: vec2<f32>,".to_string());
        }
        format!("struct FragmentOutput {{\n{}\n}};", fields.join("\n"))
    }
}

/// Flat-color body for wireframe / unshaded rendering.
pub struct UnshadedBodyProvider;

impl ShaderBodyProvider for UnshadedBodyProvider {
    fn template_name(&self, _key: &VariantKey) -> &'static str {
        "scene/unshaded"
    }

    fn fragment_output_code(&self, _key: &VariantKey) -> String {
        "struct FragmentOutput {\n    @location(0) color: vec4<f32>,\n};".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureFlags;

    #[test]
    fn pbr_provider_switches_on_debug_view() {
        let provider = PbrBodyProvider;
        let mut key = VariantKey::default();
        assert_eq!(provider.template_name(&key), "scene/pbr");
        key.debug_view = DebugView::Normals;
        assert_eq!(provider.template_name(&key), "scene/debug");
    }

    #[test]
    fn fragment_output_grows_with_motion_vectors() {
        let provider = PbrBodyProvider;
        let key = VariantKey {
            flags: FeatureFlags::MOTION_VECTORS,
            ..VariantKey::default()
        };
        let code = provider.fragment_output_code(&key);
        assert!(code.contains("motion"));
        assert!(
            !provider
                .fragment_output_code(&VariantKey::default())
                .contains("motion")
        );
    }
}
