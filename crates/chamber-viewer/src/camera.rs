// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera math and controls.

use glam::{Mat4, Quat, Vec2, Vec3};
use std::f32::consts::PI;

pub const MAX_PITCH: f32 = PI * 0.5 - 0.01;

/// Projection mode: perspective for 3D viewers, orthographic for the 2D
/// projection viewers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    Orthographic,
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub pos: Vec3,
    pub orientation: Quat,
    pub pitch: f32,
    pub fov_y: f32,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pos: Vec3::new(0.0, 0.0, 300.0),
            orientation: Quat::IDENTITY,
            pitch: 0.0,
            fov_y: 60f32.to_radians(),
            projection: Projection::Perspective,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Camera {
    fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.orientation * -Vec3::Z;
        let right = self.orientation * Vec3::X;
        let up = self.orientation * Vec3::Y;
        (forward, right, up)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let (f, _, u) = self.basis();
        let view = Mat4::look_to_rh(self.pos, f, u);
        let proj = match self.projection {
            Projection::Perspective => {
                Mat4::perspective_rh(self.fov_y, aspect.max(0.1), self.near, self.far)
            }
            Projection::Orthographic => {
                // frame height matched to what the perspective camera would
                // see at the current distance
                let half_h = self.pos.length().max(1.0) * (self.fov_y * 0.5).tan();
                let half_w = half_h * aspect.max(0.1);
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        };
        proj * view
    }

    /// World-space ray through a normalized device coordinate.
    pub fn pick_ray(&self, ndc: Vec2, aspect: f32) -> (Vec3, Vec3) {
        let (f, r, u) = self.basis();
        match self.projection {
            Projection::Perspective => {
                let t = (self.fov_y * 0.5).tan();
                let dir = (f + r * (ndc.x * t * aspect.max(0.1)) + u * (ndc.y * t)).normalize();
                (self.pos, dir)
            }
            Projection::Orthographic => {
                let half_h = self.pos.length().max(1.0) * (self.fov_y * 0.5).tan();
                let origin = self.pos + r * (ndc.x * half_h * aspect.max(0.1)) + u * (ndc.y * half_h);
                (origin, f)
            }
        }
    }

    pub fn zoom_fov(&mut self, scale: f32) {
        self.fov_y = (self.fov_y * scale).clamp(15f32.to_radians(), 120f32.to_radians());
    }

    pub fn move_relative(&mut self, delta: Vec3) {
        let (f, r, u) = self.basis();
        self.pos += f * delta.z + r * delta.x + u * delta.y;
    }

    pub fn rotate_by_mouse(&mut self, delta: Vec2) {
        let sensitivity = 0.0025;
        let yaw_delta = delta.x * sensitivity;
        let pitch_delta = -delta.y * sensitivity;

        let yaw_q = Quat::from_axis_angle(Vec3::Y, yaw_delta);
        self.orientation = yaw_q * self.orientation;

        let new_pitch = (self.pitch + pitch_delta).clamp(-MAX_PITCH, MAX_PITCH);
        let applied = new_pitch - self.pitch;
        if applied.abs() > 1e-6 {
            let right = self.orientation * Vec3::X;
            let pitch_q = Quat::from_axis_angle(right, applied);
            self.orientation = pitch_q * self.orientation;
            self.pitch = new_pitch;
        }
        self.orientation = self.orientation.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pick_ray_through_center_is_forward() {
        let cam = Camera::default();
        let (origin, dir) = cam.pick_ray(Vec2::ZERO, 1.5);
        assert_relative_eq!(origin.z, 300.0);
        assert_relative_eq!(dir.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn ortho_ray_offsets_origin_not_direction() {
        let cam = Camera {
            projection: Projection::Orthographic,
            ..Camera::default()
        };
        let (o1, d1) = cam.pick_ray(Vec2::ZERO, 1.0);
        let (o2, d2) = cam.pick_ray(Vec2::new(0.5, 0.0), 1.0);
        assert_relative_eq!(d1.dot(d2), 1.0, epsilon = 1e-6);
        assert!((o2 - o1).length() > 1.0);
    }

    #[test]
    fn pitch_clamps() {
        let mut cam = Camera::default();
        cam.rotate_by_mouse(Vec2::new(0.0, -10_000.0));
        assert!(cam.pitch <= MAX_PITCH);
    }
}
