/// Data-oriented camera snapshot
///
/// Pure data plus free functions. The simulation writes a `CameraData` into
/// each published render state; the render thread derives matrices and the
/// culling frustum from it.

use cgmath::{perspective, InnerSpace, Matrix4, Point3, Rad, Vector3};

use super::frustum::Frustum;

/// Camera data as a plain value
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraData {
    pub position: [f32; 3],
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub aspect_ratio: f32,
    pub fovy_radians: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        init_camera(1280, 720)
    }
}

/// Initialize camera data looking down -Z from the origin
pub fn init_camera(width: u32, height: u32) -> CameraData {
    CameraData {
        position: [0.0, 0.0, 0.0],
        yaw_radians: -std::f32::consts::FRAC_PI_2, // -90 degrees
        pitch_radians: 0.0,
        aspect_ratio: width as f32 / height.max(1) as f32,
        fovy_radians: std::f32::consts::FRAC_PI_4, // 45 degrees
        znear: 0.1,
        zfar: 1000.0,
    }
}

pub fn camera_position(camera: &CameraData) -> Point3<f32> {
    Point3::new(camera.position[0], camera.position[1], camera.position[2])
}

/// Calculate forward vector from camera orientation
pub fn calculate_forward_vector(yaw_rad: f32, pitch_rad: f32) -> Vector3<f32> {
    let (sin_yaw, cos_yaw) = yaw_rad.sin_cos();
    let (sin_pitch, cos_pitch) = pitch_rad.sin_cos();

    Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
}

pub fn build_view_matrix(camera: &CameraData) -> Matrix4<f32> {
    let position = camera_position(camera);
    let forward = calculate_forward_vector(camera.yaw_radians, camera.pitch_radians);

    Matrix4::look_to_rh(position, forward, Vector3::unit_y())
}

pub fn build_projection_matrix(camera: &CameraData) -> Matrix4<f32> {
    perspective(
        Rad(camera.fovy_radians),
        camera.aspect_ratio,
        camera.znear,
        camera.zfar,
    )
}

pub fn build_view_projection(camera: &CameraData) -> Matrix4<f32> {
    build_projection_matrix(camera) * build_view_matrix(camera)
}

/// Culling frustum for this camera
pub fn build_frustum(camera: &CameraData) -> Frustum {
    Frustum::from_view_projection(&build_view_projection(camera))
}
