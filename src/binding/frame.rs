//! Frame-Global Binding (group 0, static scope)
//!
//! Render-wide resources bound once per signature and shared by every scene
//! pipeline: the per-frame constant buffer, the IBL maps (irradiance +
//! prefiltered environment), and the BRDF lookup table. These are *static*
//! binding variables — bound before first use, immutable afterwards. The
//! per-frame buffer contents change, the binding does not.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::error::Result;

/// Per-frame constants, uploaded once per frame via discard-and-remap.
///
/// Layout mirror of the WGSL `FrameUniforms` struct in
/// `chunks/frame_bindings.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: Mat4,
    pub prev_view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub camera_position: Vec3,
    pub time: f32,
    pub exposure: f32,
    pub ibl_intensity: f32,
    pub screen_size: Vec2,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            prev_view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            camera_position: Vec3::ZERO,
            time: 0.0,
            exposure: 1.0,
            ibl_intensity: 1.0,
            screen_size: Vec2::ONE,
        }
    }
}

/// Externally-provided image-based-lighting maps.
pub struct IblMaps {
    pub irradiance: wgpu::TextureView,
    pub prefiltered_env: wgpu::TextureView,
    pub brdf_lut: wgpu::TextureView,
}

/// The frame-global binding instance.
pub struct FrameBinding {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    buffer: wgpu::Buffer,
}

impl FrameBinding {
    /// Builds the signature and binds the static resources.
    ///
    /// When the host supplies no IBL maps, neutral 1×1 stand-ins keep the
    /// signature satisfied (the variant system clears the IBL bit anyway).
    /// Failure here is fatal for rendering — there is no frame without the
    /// frame binding.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        ibl: Option<IblMaps>,
    ) -> Result<Self> {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniforms"),
            size: size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&buffer, 0, bytemuck::bytes_of(&FrameUniforms::default()));

        let ibl = match ibl {
            Some(ibl) => ibl,
            None => neutral_ibl(device, queue),
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Binding Layout"),
            entries: &[
                // Binding 0: FrameUniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Binding 1: Irradiance cube
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                // Binding 2: Prefiltered environment cube
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                // Binding 3: BRDF LUT
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Binding 4: Shared linear sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BindGroup"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&ibl.irradiance),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&ibl.prefiltered_env),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&ibl.brdf_lut),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Ok(Self {
            layout,
            bind_group,
            buffer,
        })
    }

    /// Uploads this frame's constants. Full overwrite every frame.
    pub fn update(&self, queue: &wgpu::Queue, uniforms: &FrameUniforms) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// WGSL declarations for group 0.
    #[must_use]
    pub fn binding_wgsl() -> &'static str {
        concat!(
            "struct FrameUniforms {\n",
            "    view_proj: mat4x4<f32>,\n",
            "    prev_view_proj: mat4x4<f32>,\n",
            "    inv_view_proj: mat4x4<f32>,\n",
            "    camera_position: vec3<f32>,\n",
            "    time: f32,\n",
            "    exposure: f32,\n",
            "    ibl_intensity: f32,\n",
            "    screen_size: vec2<f32>,\n",
            "};\n",
            "@group(0) @binding(0) var<uniform> frame: FrameUniforms;\n",
            "@group(0) @binding(1) var irradiance_map: texture_cube<f32>;\n",
            "@group(0) @binding(2) var prefiltered_env_map: texture_cube<f32>;\n",
            "@group(0) @binding(3) var brdf_lut: texture_2d<f32>;\n",
            "@group(0) @binding(4) var frame_samp: sampler;\n",
        )
    }
}

/// 1×1 neutral IBL stand-ins for hosts that pass no environment.
fn neutral_ibl(device: &wgpu::Device, queue: &wgpu::Queue) -> IblMaps {
    let cube = |label: &str| {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let black = [0u8; 4 * 6];
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &black,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
        );
        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        })
    };

    let lut_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Neutral BRDF LUT"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &lut_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255, 0, 0, 255],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );

    IblMaps {
        irradiance: cube("Neutral Irradiance"),
        prefiltered_env: cube("Neutral Prefiltered Env"),
        brdf_lut: lut_texture.create_view(&wgpu::TextureViewDescriptor::default()),
    }
}
