//! Sphere tracing of a trained network, clipped to the unit cube.
//!
//! The scene distance is `max(network(p), unit_cube(p))`. Every sample is a
//! batch-1 forward, so [`RayMarcher::render_parallel`] gives each rayon worker
//! its own batch-1 copy of the network.

mod camera;
mod math;

use std::time::Instant;

use rayon::prelude::*;

pub use camera::{Camera, Light};
pub use math::Vec3;

use crate::backend::SirenBackend;
use crate::error::{SirenError, SirenResult};
use crate::network::SirenNetwork;
use crate::sdf::unit_cube;

/// Rendered image, one packed RGBA `u32` per pixel, row 0 at the top.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Frame {
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Bytes in `r, g, b, a` order.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
    }
}

/// Packs a `[0, 1]` colour as `r | g << 8 | b << 16 | a << 24`.
pub fn pack_rgba(r: f32, g: f32, b: f32, a: f32) -> u32 {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u32;
    channel(r) | (channel(g) << 8) | (channel(b) << 16) | (channel(a) << 24)
}

/// Sphere tracer settings.
#[derive(Clone, Copy, Debug)]
pub struct RayMarcher {
    pub camera: Camera,
    pub light: Light,
    pub max_iterations: usize,
    /// Rays whose distance exceeds this are misses.
    pub max_distance: f32,
    /// Distances at or below this are hits.
    pub hit_distance: f32,
    /// Forward-difference step for normals.
    pub normal_epsilon: f32,
}

impl RayMarcher {
    pub fn new(camera: Camera, light: Light) -> Self {
        Self {
            camera,
            light,
            max_iterations: 100,
            max_distance: 100.0,
            hit_distance: 1e-4,
            normal_epsilon: 1e-4,
        }
    }

    /// `max(network(p), unit_cube(p))`.
    pub fn scene_distance(net: &mut dyn SirenBackend, p: Vec3) -> SirenResult<f32> {
        let mut dist = [0.0f32];
        net.forward(&mut dist, &p.to_array(), 1)?;
        Ok(dist[0].max(unit_cube(p)))
    }

    fn estimate_normal(&self, net: &mut dyn SirenBackend, p: Vec3) -> SirenResult<Vec3> {
        let eps = self.normal_epsilon;
        let d = Self::scene_distance(net, p)?;
        Ok(Vec3::new(
            Self::scene_distance(net, Vec3::new(p.x + eps, p.y, p.z))? - d,
            Self::scene_distance(net, Vec3::new(p.x, p.y + eps, p.z))? - d,
            Self::scene_distance(net, Vec3::new(p.x, p.y, p.z + eps))? - d,
        )
        .normalize())
    }

    /// Marches one ray and returns its packed colour (0 on a miss).
    pub fn march(&self, net: &mut dyn SirenBackend, origin: Vec3, dir: Vec3) -> SirenResult<u32> {
        let mut pos = origin;
        for _ in 0..self.max_iterations {
            let dist = Self::scene_distance(net, pos)?;
            if dist > self.max_distance {
                break;
            }
            let next = pos + dir * dist;
            if dist <= self.hit_distance {
                let to_light = (self.light.direction - next).normalize();
                let normal = self.estimate_normal(net, next)?;
                let shade = 0.1f32.max(to_light.dot(normal)) * self.light.intensity;
                return Ok(pack_rgba(shade, shade, shade, 1.0));
            }
            pos = next;
        }
        Ok(0)
    }

    fn check_network(layout: &crate::layout::BufferLayout) -> SirenResult<()> {
        if layout.input_dim() != 3 || layout.output_dim() != 1 {
            return Err(SirenError::shape_mismatch(
                &[3, 1],
                &[layout.input_dim(), layout.output_dim()],
            ));
        }
        Ok(())
    }

    fn render_row(
        &self,
        net: &mut dyn SirenBackend,
        y: u32,
        width: u32,
        height: u32,
        row: &mut [u32],
    ) -> SirenResult<()> {
        for (x, pixel) in row.iter_mut().enumerate() {
            let (origin, dir) = self.camera.ray(x as u32, y, width, height);
            *pixel = self.march(net, origin, dir)?;
        }
        Ok(())
    }

    /// Renders on the calling thread through any backend.
    pub fn render(&self, net: &mut dyn SirenBackend, width: u32, height: u32) -> SirenResult<Frame> {
        Self::check_network(net.layout())?;
        let start = Instant::now();
        let mut pixels = vec![0u32; width as usize * height as usize];
        if width > 0 {
            for (y, row) in pixels.chunks_mut(width as usize).enumerate() {
                self.render_row(net, y as u32, width, height, row)?;
            }
        }
        log::info!(
            "Rendered {width}x{height} on {} in {:.3}s",
            net.name(),
            start.elapsed().as_secs_f64()
        );
        Ok(Frame { width, height, pixels })
    }

    /// Renders rows in parallel, one batch-1 network copy per worker.
    pub fn render_parallel(&self, network: &SirenNetwork, width: u32, height: u32) -> SirenResult<Frame> {
        Self::check_network(network.layout())?;
        let start = Instant::now();
        let template = network.with_batch_capacity(1)?;
        let mut pixels = vec![0u32; width as usize * height as usize];
        if width > 0 {
            pixels
                .par_chunks_mut(width as usize)
                .enumerate()
                .try_for_each_init(
                    || template.clone(),
                    |net, (y, row)| self.render_row(net, y as u32, width, height, row),
                )?;
        }
        log::info!(
            "Rendered {width}x{height} on {} threads in {:.3}s",
            rayon::current_num_threads(),
            start.elapsed().as_secs_f64()
        );
        Ok(Frame { width, height, pixels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SirenConfig;

    fn cube_camera() -> Camera {
        Camera {
            position: Vec3::new(0.0, 0.0, -3.0),
            target: Vec3::ZERO,
            up: Vec3::new(0.0, 1.0, 0.0),
            field_of_view: 90.0,
            z_near: 0.1,
            z_far: 100.0,
        }
    }

    /// Network that outputs -1 everywhere, so the scene is the clipping cube.
    fn constant_network() -> SirenNetwork {
        let mut net = SirenNetwork::new(SirenConfig::sdf(0, 4, 4).with_seed(0)).unwrap();
        let mut weights = vec![0.0; net.param_count()];
        *weights.last_mut().unwrap() = -1.0;
        net.set_weights(&weights).unwrap();
        net
    }

    #[test]
    fn test_pack_rgba() {
        assert_eq!(pack_rgba(1.0, 0.0, 0.0, 1.0), 0xFF00_00FF);
        assert_eq!(pack_rgba(0.0, 1.0, 0.0, 0.0), 0x0000_FF00);
        assert_eq!(pack_rgba(2.0, -1.0, 0.0, 0.0), 0x0000_00FF);
    }

    #[test]
    fn test_cube_face_lit_and_corner_missed() {
        let light = Light {
            direction: Vec3::new(0.0, 0.0, -10.0),
            intensity: 1.0,
        };
        let marcher = RayMarcher::new(cube_camera(), light);
        let mut net = constant_network();
        let frame = marcher.render(&mut net, 3, 3).unwrap();
        // normal and light both face the camera: full intensity, opaque
        let center = frame.pixel(1, 1);
        assert_eq!(center >> 24, 255);
        assert!((center & 0xFF) >= 254);
        assert_eq!(frame.pixel(0, 0), 0);
        assert_eq!(frame.to_rgba8().len(), 36);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let light = Light {
            direction: Vec3::new(2.0, 3.0, -4.0),
            intensity: 0.9,
        };
        let marcher = RayMarcher::new(cube_camera(), light);
        let mut net = SirenNetwork::new(SirenConfig::sdf(1, 8, 4).with_seed(11)).unwrap();
        let sequential = marcher.render(&mut net, 8, 6).unwrap();
        let parallel = marcher.render_parallel(&net, 8, 6).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_rejects_non_sdf_network() {
        let marcher = RayMarcher::new(
            cube_camera(),
            Light {
                direction: Vec3::ZERO,
                intensity: 1.0,
            },
        );
        let mut config = SirenConfig::sdf(0, 4, 1);
        config.output_dim = 2;
        let mut net = SirenNetwork::new(config).unwrap();
        assert!(matches!(
            marcher.render(&mut net, 2, 2),
            Err(SirenError::ShapeMismatch { .. })
        ));
    }
}
