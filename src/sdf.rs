//! Closed-form distance functions and synthetic training data.

use rand::Rng;

use crate::io::PointCloud;
use crate::render::Vec3;

/// Signed distance to a sphere of `radius` at the origin.
#[inline]
pub fn sphere(p: Vec3, radius: f32) -> f32 {
    p.length() - radius
}

/// Signed distance to the axis-aligned cube `[-1, 1]^3`.
#[inline]
pub fn unit_cube(p: Vec3) -> f32 {
    let d = p.abs() - Vec3::new(1.0, 1.0, 1.0);
    d.max_component().min(0.0) + d.max_scalar(0.0).length()
}

/// `n` points uniform in `[-extent, extent]^3` labelled with their distance
/// to a sphere of `radius`.
pub fn sample_sphere_points<R: Rng>(n: usize, radius: f32, extent: f32, rng: &mut R) -> PointCloud {
    let mut points = Vec::with_capacity(3 * n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let p = Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        );
        points.extend_from_slice(&p.to_array());
        labels.push(sphere(p, radius));
    }
    PointCloud { points, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_unit_cube_distances() {
        assert_eq!(unit_cube(Vec3::new(2.0, 0.0, 0.0)), 1.0);
        assert_eq!(unit_cube(Vec3::ZERO), -1.0);
        assert_eq!(unit_cube(Vec3::new(0.0, 0.5, 0.0)), -0.5);
        let corner = unit_cube(Vec3::new(2.0, 2.0, 1.0));
        assert!((corner - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_sign() {
        assert!(sphere(Vec3::ZERO, 0.5) < 0.0);
        assert_eq!(sphere(Vec3::new(0.0, 0.0, 0.5), 0.5), 0.0);
        assert!(sphere(Vec3::new(1.0, 0.0, 0.0), 0.5) > 0.0);
    }

    #[test]
    fn test_samples_are_labelled() {
        let mut rng = StdRng::seed_from_u64(3);
        let cloud = sample_sphere_points(50, 0.5, 1.0, &mut rng);
        assert_eq!(cloud.len(), 50);
        for i in 0..cloud.len() {
            let p = Vec3::from(cloud.point(i));
            assert!(p.abs().max_component() <= 1.0);
            assert_eq!(cloud.labels[i], sphere(p, 0.5));
        }
    }
}
