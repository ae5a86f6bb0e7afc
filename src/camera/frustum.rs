use bytemuck::{Pod, Zeroable};
use cgmath::{Matrix, Matrix4, Vector4};

use crate::bounds::{Aabb, BoundingSphere};

/// Six normalized planes (xyz = inward normal, w = distance)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [[f32; 4]; 6],
}

impl Frustum {
    /// Gribb/Hartmann extraction from a column-major view-projection matrix
    pub fn from_view_projection(view_proj: &Matrix4<f32>) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let raw: [Vector4<f32>; 6] = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 + r2, // near
            r3 - r2, // far
        ];

        let mut planes = [[0.0; 4]; 6];
        for (plane, v) in planes.iter_mut().zip(raw.iter()) {
            let length = (v.x * v.x + v.y * v.y + v.z * v.z).sqrt();
            *plane = if length > 0.0 {
                [v.x / length, v.y / length, v.z / length, v.w / length]
            } else {
                [v.x, v.y, v.z, v.w]
            };
        }

        Self { planes }
    }

    /// Conservative box test: false only if the box is fully outside a plane
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }

        self.planes.iter().all(|p| {
            // Corner furthest along the plane normal
            let x = if p[0] >= 0.0 { aabb.max.x } else { aabb.min.x };
            let y = if p[1] >= 0.0 { aabb.max.y } else { aabb.min.y };
            let z = if p[2] >= 0.0 { aabb.max.z } else { aabb.min.z };
            p[0] * x + p[1] * y + p[2] * z + p[3] >= 0.0
        })
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let c = sphere.center;
        self.planes
            .iter()
            .all(|p| p[0] * c.x + p[1] * c.y + p[2] * c.z + p[3] >= -sphere.radius)
    }
}

/// Camera data for the culling shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CullingCamera {
    pub frustum_planes: [[f32; 4]; 6],
    pub position: [f32; 3],
    /// Number of cull records dispatched this frame
    pub instance_count: u32,
    pub _padding: [u32; 4],
}

impl CullingCamera {
    pub fn new(frustum: &Frustum, position: [f32; 3], instance_count: u32) -> Self {
        Self {
            frustum_planes: frustum.planes,
            position,
            instance_count,
            _padding: [0; 4],
        }
    }
}
