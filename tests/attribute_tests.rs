//! Per-Primitive Attribute Writer Tests
//!
//! Tests for:
//! - attribs_size / write_attribs round-trip equality for every flag shape
//! - Fixed block order and deterministic output
//! - Always-on overflow checking
//! - Joint-count clamping
//! - Generated WGSL struct mirroring the written layout

use glam::{Mat4, Vec3};

use prism::attributes::{TEXTURE_ATTRIB_DESC_SIZE, attribs_size, attribs_struct_wgsl, write_attribs};
use prism::error::RenderError;
use prism::features::{FeatureFlags, TextureAttrib};
use prism::model::{Material, Sheen, TextureBinding};
use prism::settings::RendererSettings;

fn write_into_sized_buffer(
    settings: &RendererSettings,
    flags: FeatureFlags,
    material: &Material,
    custom: &[u8],
) -> (usize, Vec<u8>) {
    let size = attribs_size(flags, custom.len());
    let mut buffer = vec![0u8; size];
    let written = write_attribs(
        &mut buffer,
        settings,
        flags,
        Mat4::IDENTITY,
        Some(Mat4::IDENTITY),
        0,
        material,
        custom,
    )
    .expect("pre-sized write must succeed");
    (written, buffer)
}

// ============================================================================
// Size / write round-trip
// ============================================================================

#[test]
fn size_query_matches_write_minimal() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let (written, buffer) =
        write_into_sized_buffer(&settings, FeatureFlags::empty(), &material, &[]);
    assert_eq!(written, buffer.len());
}

#[test]
fn size_query_matches_write_all_features() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let flags = FeatureFlags::all().normalize(&settings);
    let (written, buffer) = write_into_sized_buffer(&settings, flags, &material, &[]);
    assert_eq!(written, buffer.len());
}

#[test]
fn size_query_matches_write_motion_vectors_only() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let flags = FeatureFlags::MOTION_VECTORS;
    let (written, buffer) = write_into_sized_buffer(&settings, flags, &material, &[]);
    assert_eq!(written, buffer.len());

    // Motion vectors add exactly the previous-transform block.
    let minimal = attribs_size(FeatureFlags::empty(), 0);
    assert_eq!(written, minimal + size_of::<Mat4>());
}

#[test]
fn size_query_matches_write_per_extension() {
    let settings = RendererSettings::default();
    let material = Material::default();
    for extension in [
        FeatureFlags::CLEARCOAT,
        FeatureFlags::SHEEN,
        FeatureFlags::ANISOTROPY,
        FeatureFlags::IRIDESCENCE,
        FeatureFlags::TRANSMISSION,
        FeatureFlags::VOLUME,
    ] {
        let (written, buffer) = write_into_sized_buffer(&settings, extension, &material, &[]);
        assert_eq!(written, buffer.len(), "mismatch for {extension:?}");
    }
}

#[test]
fn texture_descriptors_add_one_entry_per_map_bit() {
    let settings = RendererSettings::default();
    let base = attribs_size(FeatureFlags::empty(), 0);
    let one = attribs_size(FeatureFlags::BASE_COLOR_MAP, 0);
    let two = attribs_size(FeatureFlags::BASE_COLOR_MAP | FeatureFlags::NORMAL_MAP, 0);

    assert_eq!(one - base, TEXTURE_ATTRIB_DESC_SIZE);
    assert_eq!(two - one, TEXTURE_ATTRIB_DESC_SIZE);

    let material = Material::default();
    let (written, buffer) = write_into_sized_buffer(
        &settings,
        FeatureFlags::BASE_COLOR_MAP | FeatureFlags::NORMAL_MAP,
        &material,
        &[],
    );
    assert_eq!(written, buffer.len());
}

#[test]
fn custom_data_is_appended_verbatim() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let custom = [0xAB_u8; 24];
    let (written, buffer) =
        write_into_sized_buffer(&settings, FeatureFlags::empty(), &material, &custom);
    assert_eq!(written, buffer.len());
    assert_eq!(&buffer[written - custom.len()..], &custom);
}

// ============================================================================
// Determinism & ordering
// ============================================================================

#[test]
fn identical_inputs_write_identical_bytes() {
    let settings = RendererSettings::default();
    let mut material = Material::default();
    material.sheen = Some(Sheen {
        color_factor: Vec3::new(0.9, 0.5, 0.1),
        roughness_factor: 0.4,
    });
    material.set_texture(TextureAttrib::BaseColor, TextureBinding::default());
    let flags = (FeatureFlags::SHEEN | FeatureFlags::BASE_COLOR_MAP).normalize(&settings);

    let (_, a) = write_into_sized_buffer(&settings, flags, &material, &[]);
    let (_, b) = write_into_sized_buffer(&settings, flags, &material, &[]);
    assert_eq!(a, b);
}

#[test]
fn node_block_leads_with_transform_then_joint_count() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

    let size = attribs_size(FeatureFlags::empty(), 0);
    let mut buffer = vec![0u8; size];
    write_attribs(
        &mut buffer,
        &settings,
        FeatureFlags::empty(),
        transform,
        None,
        7,
        &material,
        &[],
    )
    .unwrap();

    let matrix: &[f32] = bytemuck::cast_slice(&buffer[0..64]);
    assert_eq!(matrix, transform.to_cols_array().as_slice());
    let joint_count = u32::from_le_bytes(buffer[64..68].try_into().unwrap());
    assert_eq!(joint_count, 7);
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn overflow_is_a_checked_error() {
    let settings = RendererSettings::default();
    let material = Material::default();
    let mut tiny = vec![0u8; 16];

    let result = write_attribs(
        &mut tiny,
        &settings,
        FeatureFlags::empty(),
        Mat4::IDENTITY,
        None,
        0,
        &material,
        &[],
    );

    match result {
        Err(RenderError::AttributeOverflow { required, capacity }) => {
            assert_eq!(capacity, 16);
            assert!(required > capacity);
        }
        other => panic!("expected AttributeOverflow, got {other:?}"),
    }
}

#[test]
fn joint_count_clamps_to_reserved_capacity() {
    let settings = RendererSettings::default();
    let material = Material::default();

    let size = attribs_size(FeatureFlags::empty(), 0);
    let mut buffer = vec![0u8; size];
    write_attribs(
        &mut buffer,
        &settings,
        FeatureFlags::empty(),
        Mat4::IDENTITY,
        None,
        settings.max_joint_count + 100,
        &material,
        &[],
    )
    .unwrap();

    let joint_count = u32::from_le_bytes(buffer[64..68].try_into().unwrap());
    assert_eq!(joint_count, settings.max_joint_count);
}

// ============================================================================
// Shader-side struct generation
// ============================================================================

#[test]
fn wgsl_struct_gates_blocks_on_flags() {
    let minimal = attribs_struct_wgsl(FeatureFlags::empty());
    assert!(minimal.contains("node_matrix"));
    assert!(minimal.contains("base_color_factor"));
    assert!(!minimal.contains("prev_node_matrix"));
    assert!(!minimal.contains("sheen_color_factor"));
    assert!(!minimal.contains("tex_attribs"));

    let full = attribs_struct_wgsl(
        FeatureFlags::MOTION_VECTORS | FeatureFlags::SHEEN | FeatureFlags::BASE_COLOR_MAP,
    );
    assert!(full.contains("prev_node_matrix"));
    assert!(full.contains("sheen_color_factor"));
    assert!(full.contains("tex_attribs: array<TextureAttribDesc, 1>"));
}

#[test]
fn wgsl_tex_attrib_count_matches_flags() {
    let flags = FeatureFlags::BASE_COLOR_MAP
        | FeatureFlags::NORMAL_MAP
        | FeatureFlags::EMISSIVE_MAP;
    let code = attribs_struct_wgsl(flags);
    assert!(code.contains("array<TextureAttribDesc, 3>"));
}
