//! Kernel & Noise Generation
//!
//! Deterministic (fixed-seed) generation of the occlusion sample kernel and
//! the tiled rotation-noise texture. Determinism matters: the temporal
//! accumulator assumes the kernel is identical across frames and sessions,
//! only the per-pixel rotation decorrelates samples.

use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Side length of the tiled rotation-noise texture.
pub const NOISE_SIZE: u32 = 16;

/// Generates a hemisphere sample kernel with importance-weighted
/// distribution.
///
/// Samples concentrate near the origin via a quadratic fall-off curve;
/// nearby occlusion contributes most, so it gets the sample density.
#[must_use]
pub fn generate_sample_kernel(samples: u32) -> Vec<Vec4> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut kernel = Vec::with_capacity(samples as usize);

    for i in 0..samples {
        // Random direction in the upper hemisphere (Z > 0)
        let mut sample = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.01..1.0),
        )
        .normalize();

        // Random magnitude within the hemisphere volume
        sample *= rng.random_range(0.0..1.0f32);

        // Quadratic scale: concentrate samples near the origin
        let scale = i as f32 / samples as f32;
        let scale = lerp(0.1, 1.0, scale * scale);
        sample *= scale;

        kernel.push(Vec4::new(sample.x, sample.y, sample.z, 0.0));
    }
    kernel
}

/// Generates the `NOISE_SIZE`² rotation-noise texture (RGBA8 pixels).
///
/// Each pixel encodes a random 2D rotation vector in XY (Z = 0), chosen by
/// best-candidate sampling against the already-placed neighbors so adjacent
/// texels diverge — a cheap blue-noise approximation that breaks the
/// banding a plain white-noise tile leaves behind.
///
/// The texture should use `Repeat` addressing and `Nearest` filtering.
#[must_use]
pub fn generate_rotation_noise() -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(12345);
    let count = (NOISE_SIZE * NOISE_SIZE) as usize;
    let mut angles: Vec<f32> = Vec::with_capacity(count);

    for i in 0..count {
        // Best-candidate: pick the angle farthest (in angle space) from the
        // immediate left and top neighbors.
        let left = (i % NOISE_SIZE as usize > 0).then(|| angles[i - 1]);
        let top = (i >= NOISE_SIZE as usize).then(|| angles[i - NOISE_SIZE as usize]);

        let mut best = 0.0f32;
        let mut best_dist = -1.0f32;
        for _ in 0..4 {
            let candidate = rng.random_range(0.0..std::f32::consts::TAU);
            let dist = [left, top]
                .iter()
                .flatten()
                .map(|n| angular_distance(candidate, *n))
                .fold(f32::MAX, f32::min);
            if dist > best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        angles.push(best);
    }

    angles
        .iter()
        .map(|a| {
            let (sin, cos) = a.sin_cos();
            [
                ((cos * 0.5 + 0.5) * 255.0) as u8,
                ((sin * 0.5 + 0.5) * 255.0) as u8,
                0,
                255,
            ]
        })
        .collect()
}

fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % std::f32::consts::TAU;
    d.min(std::f32::consts::TAU - d)
}

fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a + f * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_deterministic() {
        let a = generate_sample_kernel(32);
        let b = generate_sample_kernel(32);
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }

    #[test]
    fn kernel_stays_in_upper_hemisphere() {
        for sample in generate_sample_kernel(64) {
            assert!(sample.z >= 0.0);
            assert!(sample.truncate().length() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn noise_tile_is_full_and_deterministic() {
        let a = generate_rotation_noise();
        assert_eq!(a.len(), (NOISE_SIZE * NOISE_SIZE) as usize);
        assert_eq!(a, generate_rotation_noise());
    }
}
