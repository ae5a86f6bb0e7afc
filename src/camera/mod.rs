/// Camera Module
///
/// Camera snapshots carried in the render state and the frustum derived
/// from them for CPU and GPU culling.

pub mod data_camera;
pub mod frustum;

pub use data_camera::{
    build_frustum, build_projection_matrix, build_view_matrix, build_view_projection,
    calculate_forward_vector, camera_position, init_camera, CameraData,
};
pub use frustum::{CullingCamera, Frustum};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use cgmath::{Point3, Vector3};

    fn unit_box_at(x: f32, y: f32, z: f32) -> Aabb {
        Aabb::from_center_extent(Point3::new(x, y, z), Vector3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = init_camera(800, 600);
        let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);
        assert!(forward.x.abs() < 1e-5);
        assert!((forward.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_frustum_rejects_boxes_behind_and_beyond() {
        let camera = init_camera(800, 600);
        let frustum = build_frustum(&camera);

        assert!(frustum.intersects_aabb(&unit_box_at(0.0, 0.0, -10.0)));
        assert!(!frustum.intersects_aabb(&unit_box_at(0.0, 0.0, 10.0)));
        assert!(!frustum.intersects_aabb(&unit_box_at(0.0, 0.0, -5000.0)));
        assert!(!frustum.intersects_aabb(&unit_box_at(500.0, 0.0, -10.0)));
        assert!(!frustum.intersects_aabb(&Aabb::EMPTY));
    }

    #[test]
    fn test_sphere_straddling_plane_is_kept() {
        let camera = init_camera(800, 600);
        let frustum = build_frustum(&camera);
        let sphere = unit_box_at(0.0, 0.0, 0.5).bounding_sphere();
        assert!(frustum.intersects_sphere(&sphere));
    }
}
