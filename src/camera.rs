//! Camera, projection and orbit-style mouse controls.

use cgmath::{InnerSpace, Rad};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug)]
pub struct Camera {
    pub position: cgmath::Point3<f32>,
    pub target: cgmath::Point3<f32>,
}

impl Camera {
    pub fn new<P: Into<cgmath::Point3<f32>>>(position: P, target: P) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
        }
    }

    pub fn calc_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::look_at_rh(self.position, self.target, cgmath::Vector3::unit_y())
    }
}

#[derive(Debug)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height as f32;
    }

    pub fn calc_matrix(&self) -> cgmath::Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: cgmath::Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (projection.calc_matrix() * camera.calc_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

/// Orbit controls: left-drag rotates around the target, the wheel zooms.
#[derive(Debug)]
pub struct OrbitController {
    target: cgmath::Point3<f32>,
    distance: f32,
    yaw: Rad<f32>,
    pitch: Rad<f32>,
    sensitivity: f32,
    rotating: bool,
    last_cursor: Option<PhysicalPosition<f64>>,
}

impl OrbitController {
    /// Derive the orbit state from an initial camera pose.
    pub fn from_camera(camera: &Camera, sensitivity: f32) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.magnitude();
        Self {
            target: camera.target,
            distance,
            yaw: Rad(offset.x.atan2(offset.z)),
            pitch: Rad((offset.y / distance).asin()),
            sensitivity,
            rotating: false,
            last_cursor: None,
        }
    }

    /// Feed a window event into the controller. Returns `true` when the
    /// camera pose changed and a redraw is needed.
    pub fn handle_window_events(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.rotating = *state == ElementState::Pressed;
                if !self.rotating {
                    self.last_cursor = None;
                }
                false
            }
            WindowEvent::CursorMoved { position, .. } => {
                if !self.rotating {
                    self.last_cursor = Some(*position);
                    return false;
                }
                let moved = match self.last_cursor {
                    Some(last) => self.rotate(
                        (position.x - last.x) as f32,
                        (position.y - last.y) as f32,
                    ),
                    None => false,
                };
                self.last_cursor = Some(*position);
                moved
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                };
                self.zoom(scroll)
            }
            _ => false,
        }
    }

    fn rotate(&mut self, dx: f32, dy: f32) -> bool {
        self.yaw -= Rad(dx * self.sensitivity);
        self.pitch += Rad(dy * self.sensitivity);
        // Stop just short of the poles so the view vector never lines up
        // with the up axis.
        let limit = Rad(std::f32::consts::FRAC_PI_2 - 0.01);
        if self.pitch > limit {
            self.pitch = limit;
        } else if self.pitch < -limit {
            self.pitch = -limit;
        }
        dx != 0.0 || dy != 0.0
    }

    fn zoom(&mut self, scroll: f32) -> bool {
        if scroll == 0.0 {
            return false;
        }
        self.distance = (self.distance - scroll * 0.5).clamp(1.0, 60.0);
        true
    }

    pub fn update_camera(&self, camera: &mut Camera) {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let offset = cgmath::Vector3::new(
            self.distance * cos_pitch * sin_yaw,
            self.distance * sin_pitch,
            self.distance * cos_pitch * cos_yaw,
        );
        camera.target = self.target;
        camera.position = self.target + offset;
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controller: OrbitController,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl CameraResources {
    pub fn new(device: &wgpu::Device, camera: Camera, controller: OrbitController) -> Self {
        let uniform = CameraUniform::new();

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("camera_bind_group_layout"),
            });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            camera,
            controller,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Sync the GPU uniform with the current camera pose.
    pub fn update(&mut self, queue: &wgpu::Queue, projection: &Projection) {
        self.controller.update_camera(&mut self.camera);
        self.uniform.update_view_proj(&self.camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_round_trips_initial_pose() {
        let mut camera = Camera::new((0.0, 4.0, 10.0), (0.0, 1.0, 0.0));
        let controller = OrbitController::from_camera(&camera, 0.005);
        let before = camera.position;
        controller.update_camera(&mut camera);
        assert!((camera.position.x - before.x).abs() < 1e-4);
        assert!((camera.position.y - before.y).abs() < 1e-4);
        assert!((camera.position.z - before.z).abs() < 1e-4);
    }

    #[test]
    fn zoom_clamps_distance() {
        let camera = Camera::new((0.0, 0.0, 2.0), (0.0, 0.0, 0.0));
        let mut controller = OrbitController::from_camera(&camera, 0.005);
        for _ in 0..100 {
            controller.zoom(1.0);
        }
        assert!(controller.distance >= 1.0);
        for _ in 0..200 {
            controller.zoom(-1.0);
        }
        assert!(controller.distance <= 60.0);
    }

    #[test]
    fn pitch_stays_clear_of_the_poles() {
        let camera = Camera::new((0.0, 4.0, 10.0), (0.0, 1.0, 0.0));
        let mut controller = OrbitController::from_camera(&camera, 0.005);
        for _ in 0..10_000 {
            controller.rotate(0.0, 10.0);
        }
        assert!(controller.pitch < Rad(std::f32::consts::FRAC_PI_2));
    }
}
