//! Shader Template Manager
//!
//! Renders WGSL templates through minijinja and owns the centralized
//! `ShaderModule` cache shared by every pipeline-creation path.
//!
//! ## Two compilation modes
//!
//! | Method | Use case | Source |
//! |--------|----------|--------|
//! | [`ShaderManager::get_or_compile_template`] | Scene / PostFX shaders | minijinja template |
//! | [`ShaderManager::get_or_compile_raw`]      | Utility shaders        | raw WGSL string    |
//!
//! Template failure propagates as [`RenderError::ShaderGeneration`]; nothing
//! is cached on failure, so a later call retries compilation.

use std::borrow::Cow;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use super::shader_gen::{ShaderCompilationOptions, ShaderGenerator};
use crate::error::{RenderError, Result};

pub static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/pipeline/shaders"]
struct ShaderAssets;

pub fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure Jinja2 syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

        env.set_loader(shader_loader);

        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let path = std::path::Path::new("src/pipeline/shaders").join(filename.as_ref());
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(source) => return Ok(Some(source)),
                Err(e) => {
                    return Err(Error::new(
                        ErrorKind::TemplateNotFound,
                        format!("Failed to read file: {e}"),
                    ));
                }
            }
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

// ─── ShaderManager ────────────────────────────────────────────────────────────

/// Centralized shader module cache.
///
/// Deduplicates compiled `wgpu::ShaderModule`s by hashing the **final** WGSL
/// source with xxh3-128. Because mask and opaque variants, or cull-back and
/// cull-none pipelines, render identical source, module reuse falls out of
/// this hash for free.
pub struct ShaderManager {
    /// xxh3-128 of final WGSL → compiled module.
    module_cache: FxHashMap<u128, wgpu::ShaderModule>,
}

impl Default for ShaderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            module_cache: FxHashMap::default(),
        }
    }

    /// Compile a shader from a template (or return the cached module).
    ///
    /// Returns `(module_ref, source_hash)`.
    pub fn get_or_compile_template(
        &mut self,
        device: &wgpu::Device,
        template_name: &str,
        options: &ShaderCompilationOptions,
        vertex_input_code: &str,
        varyings_code: &str,
        binding_code: &str,
    ) -> Result<(&wgpu::ShaderModule, u128)> {
        let source = ShaderGenerator::generate_shader(
            vertex_input_code,
            varyings_code,
            binding_code,
            template_name,
            options,
        )
        .map_err(|e| RenderError::ShaderGeneration {
            template: template_name.to_string(),
            message: e.to_string(),
        })?;

        let hash = xxh3_128(source.as_bytes());

        let module = self.module_cache.entry(hash).or_insert_with(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Shader Module {template_name}")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });

        Ok((module, hash))
    }

    /// Compile a raw WGSL string (or return the cached module).
    ///
    /// Returns `(module_ref, source_hash)`.
    pub fn get_or_compile_raw(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        source: &str,
    ) -> (&wgpu::ShaderModule, u128) {
        let hash = xxh3_128(source.as_bytes());

        let module = self.module_cache.entry(hash).or_insert_with(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });

        (module, hash)
    }

    /// Number of cached shader modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.module_cache.len()
    }
}
