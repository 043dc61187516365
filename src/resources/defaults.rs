//! Default Textures
//!
//! A small set of precomputed 1×1 fallback textures the binding manager
//! substitutes when a material omits a texture its flag set samples:
//! white (multiplicative neutral), black (emissive fallback), flat normal
//! (+Z), and a flat physical descriptor (full roughness / full metallic,
//! scaled down by the material factors).

use crate::features::TextureAttrib;

/// Which fallback a texture slot degrades to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKind {
    White,
    Black,
    FlatNormal,
    PhysicalDesc,
}

impl DefaultKind {
    /// The fallback class for one texture attribute. Normal-type slots must
    /// never degrade to a color default — a white "normal" bends every
    /// surface toward +X+Y.
    #[must_use]
    pub fn for_attrib(attrib: TextureAttrib) -> Self {
        match attrib {
            TextureAttrib::Normal | TextureAttrib::ClearcoatNormal => Self::FlatNormal,
            TextureAttrib::MetallicRoughness => Self::PhysicalDesc,
            TextureAttrib::Emissive => Self::Black,
            _ => Self::White,
        }
    }
}

/// The precomputed fallback set. Built once at renderer construction.
pub struct DefaultTextures {
    pub white: wgpu::TextureView,
    pub black: wgpu::TextureView,
    pub flat_normal: wgpu::TextureView,
    pub physical_desc: wgpu::TextureView,
}

impl DefaultTextures {
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            white: upload_1x1(device, queue, "Default White", [255, 255, 255, 255]),
            black: upload_1x1(device, queue, "Default Black", [0, 0, 0, 255]),
            flat_normal: upload_1x1(device, queue, "Default Flat Normal", [128, 128, 255, 255]),
            physical_desc: upload_1x1(
                device,
                queue,
                "Default Physical Desc",
                // G = roughness 1.0, B = metallic 1.0 — factors do the rest.
                [255, 255, 255, 255],
            ),
        }
    }

    /// The fallback view for one texture attribute.
    #[must_use]
    pub fn for_attrib(&self, attrib: TextureAttrib) -> &wgpu::TextureView {
        match DefaultKind::for_attrib(attrib) {
            DefaultKind::White => &self.white,
            DefaultKind::Black => &self.black,
            DefaultKind::FlatNormal => &self.flat_normal,
            DefaultKind::PhysicalDesc => &self.physical_desc,
        }
    }
}


fn upload_1x1(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    pixel: [u8; 4],
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
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
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &pixel,
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

    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
