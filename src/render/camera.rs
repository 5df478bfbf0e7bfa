//! Pinhole camera and point light, loaded from `key = value` files.
//!
//! ```text
//! camera_position = 0, 0, -3
//! target = 0, 0, 0
//! up = 0, 1, 0
//! field_of_view  = 90
//! z_near  = 0.1
//! z_far  = 100
//! ```

use std::path::Path;
use std::str::FromStr;

use super::math::Vec3;
use crate::config::{ConfigError, KeyValues};
use crate::error::SirenResult;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn load<P: AsRef<Path>>(path: P) -> SirenResult<Self> {
        Ok(std::fs::read_to_string(path)?.parse()?)
    }

    /// World-space ray through the centre of pixel `(x, y)`, row 0 at the top.
    ///
    /// Returns `(origin, unit direction)`.
    pub fn ray(&self, x: u32, y: u32, width: u32, height: u32) -> (Vec3, Vec3) {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);

        let half_height = (self.field_of_view.to_radians() * 0.5).tan();
        let half_width = half_height * width as f32 / height as f32;
        let ndc_x = 2.0 * ((x as f32 + 0.5) / width as f32) - 1.0;
        let ndc_y = 1.0 - 2.0 * ((y as f32 + 0.5) / height as f32);

        let dir = forward + right * (ndc_x * half_width) + up * (ndc_y * half_height);
        (self.position, dir.normalize())
    }
}

impl FromStr for Camera {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let kv = KeyValues::parse(text)?;
        let camera = Self {
            position: kv.vec3("camera_position")?.into(),
            target: kv.vec3("target")?.into(),
            up: kv.vec3("up")?.into(),
            field_of_view: kv.f32("field_of_view")?,
            z_near: kv.f32("z_near")?,
            z_far: kv.f32("z_far")?,
        };
        if !(camera.field_of_view > 0.0 && camera.field_of_view < 180.0) {
            return Err(ConfigError::InvalidValue {
                key: "field_of_view".to_string(),
                value: camera.field_of_view.to_string(),
            });
        }
        if camera.target == camera.position {
            return Err(ConfigError::InvalidValue {
                key: "target".to_string(),
                value: "equal to camera_position".to_string(),
            });
        }
        Ok(camera)
    }
}

/// Light position used for diffuse shading, and its intensity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub direction: Vec3,
    pub intensity: f32,
}

impl Light {
    pub fn load<P: AsRef<Path>>(path: P) -> SirenResult<Self> {
        Ok(std::fs::read_to_string(path)?.parse()?)
    }
}

impl FromStr for Light {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let kv = KeyValues::parse(text)?;
        Ok(Self {
            direction: kv.vec3("light_direction")?.into(),
            intensity: kv.f32("intensity")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA: &str = "camera_position = 0, 0, -3\ntarget = 0, 0, 0\nup = 0, 1, 0\n\
                          field_of_view  = 90\nz_near  = 0.1\nz_far  = 100\n";

    #[test]
    fn test_parse_camera_and_light() {
        let cam: Camera = CAMERA.parse().unwrap();
        assert_eq!(cam.position, Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(cam.field_of_view, 90.0);
        assert_eq!(cam.z_far, 100.0);

        let light: Light = "light_direction = 1, 2, 3\nintensity  = 0.8".parse().unwrap();
        assert_eq!(light.direction, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(light.intensity, 0.8);
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let cam: Camera = CAMERA.parse().unwrap();
        let (origin, dir) = cam.ray(1, 1, 3, 3);
        assert_eq!(origin, cam.position);
        assert_eq!(dir, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_top_row_looks_up() {
        let cam: Camera = CAMERA.parse().unwrap();
        let (_, top) = cam.ray(1, 0, 3, 3);
        let (_, bottom) = cam.ray(1, 2, 3, 3);
        assert!(top.y > 0.0);
        assert!(bottom.y < 0.0);
    }

    #[test]
    fn test_rejects_degenerate_camera() {
        let text = CAMERA.replace("target = 0, 0, 0", "target = 0, 0, -3");
        assert!(text.parse::<Camera>().is_err());
    }
}
