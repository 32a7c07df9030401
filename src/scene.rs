//! Scene graph for loaded assets.
//!
//! The graph is a tree of [`SceneNode`] trait objects: [`ContainerNode`]s
//! mirror glTF nodes and [`MeshNode`]s carry one glTF primitive each. The
//! variant resolver never type-cases on concrete nodes; it probes
//! capabilities instead ([`SceneNode::mesh_id`] / [`SceneNode::material_slot`]
//! return `None` for anything that is not a renderable mesh), so non-mesh
//! nodes are untouched by construction.

use std::ops::Mul;

use cgmath::One;
use wgpu::util::DeviceExt;

use crate::model::{self, DrawMesh, Material};

/// Stable identity of a mesh for the session lifetime, assigned at load.
pub type MeshId = u32;

/// Reference to a material slot in the store. `Copy`, so restoring a cached
/// default yields the identical reference rather than a copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub usize);

/// A local transform: position, rotation and scale.
#[derive(Clone, Debug)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> TransformRaw {
        TransformRaw {
            model: self.to_matrix().into(),
            normal: cgmath::Matrix3::from(self.rotation).into(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Transform {
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        Transform {
            position: self.position + (self.rotation * scaled_rhs_pos),
            rotation: self.rotation * rhs.rotation,
            scale: cgmath::Vector3::new(
                self.scale.x * rhs.scale.x,
                self.scale.y * rhs.scale.y,
                self.scale.z * rhs.scale.z,
            ),
        }
    }
}

/// The world transform as stored on the GPU.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
}

impl model::Vertex for TransformRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<TransformRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // mat4 model matrix, one vec4 per slot.
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // mat3 normal matrix, one vec3 per slot.
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

pub trait SceneNode {
    fn add_child(&mut self, child: Box<dyn SceneNode>);

    fn children(&self) -> &[Box<dyn SceneNode>];

    fn children_mut(&mut self) -> &mut [Box<dyn SceneNode>];

    /// Capability probe: only renderable meshes report an identity.
    fn mesh_id(&self) -> Option<MeshId> {
        None
    }

    /// The currently assigned material, for meshes.
    fn material(&self) -> Option<MaterialHandle> {
        None
    }

    /// Mutable access to the material slot, for meshes. One write through
    /// this slot is the atomic unit of a material substitution.
    fn material_slot(&mut self) -> Option<&mut MaterialHandle> {
        None
    }

    fn draw(
        &self,
        materials: &[Option<Material>],
        camera_bind_group: &wgpu::BindGroup,
        light_bind_group: &wgpu::BindGroup,
        render_pass: &mut wgpu::RenderPass<'_>,
    );
}

/// Visit every mesh in the graph, parents before children, siblings in
/// declaration order.
pub fn visit_meshes(node: &mut dyn SceneNode, visit: &mut dyn FnMut(MeshId, &mut MaterialHandle)) {
    if let Some(id) = node.mesh_id() {
        if let Some(slot) = node.material_slot() {
            visit(id, slot);
        }
    }
    for child in node.children_mut() {
        visit_meshes(child.as_mut(), visit);
    }
}

/// Locate the material slot of a specific mesh.
pub fn find_material_slot(node: &mut dyn SceneNode, id: MeshId) -> Option<&mut MaterialHandle> {
    if node.mesh_id() == Some(id) {
        return node.material_slot();
    }
    for child in node.children_mut() {
        if let Some(slot) = find_material_slot(child.as_mut(), id) {
            return Some(slot);
        }
    }
    None
}

/// A grouping node without renderable geometry of its own.
pub struct ContainerNode {
    pub children: Vec<Box<dyn SceneNode>>,
}

impl ContainerNode {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Collapse a single-child container to its child.
    pub fn into_single_child(mut self) -> Box<dyn SceneNode> {
        if self.children.len() == 1 {
            if let Some(child) = self.children.pop() {
                return child;
            }
        }
        Box::new(self)
    }
}

impl Default for ContainerNode {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneNode for ContainerNode {
    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn children(&self) -> &[Box<dyn SceneNode>] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut [Box<dyn SceneNode>] {
        &mut self.children
    }

    fn draw(
        &self,
        materials: &[Option<Material>],
        camera_bind_group: &wgpu::BindGroup,
        light_bind_group: &wgpu::BindGroup,
        render_pass: &mut wgpu::RenderPass<'_>,
    ) {
        for child in &self.children {
            child.draw(materials, camera_bind_group, light_bind_group, render_pass);
        }
    }
}

/// One renderable mesh primitive with a mutable material reference.
pub struct MeshNode {
    id: MeshId,
    mesh: model::Mesh,
    material: MaterialHandle,
    transform_buffer: wgpu::Buffer,
    children: Vec<Box<dyn SceneNode>>,
}

impl MeshNode {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        id: MeshId,
        vertices: &[model::ModelVertex],
        indices: &[u32],
        material: MaterialHandle,
        world: &Transform,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} vertex buffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} index buffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let transform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} transform buffer")),
            contents: bytemuck::cast_slice(&[world.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            id,
            mesh: model::Mesh {
                name: name.to_string(),
                vertex_buffer,
                index_buffer,
                num_elements: indices.len() as u32,
            },
            material,
            transform_buffer,
            children: Vec::new(),
        }
    }
}

impl SceneNode for MeshNode {
    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.children.push(child);
    }

    fn children(&self) -> &[Box<dyn SceneNode>] {
        &self.children
    }

    fn children_mut(&mut self) -> &mut [Box<dyn SceneNode>] {
        &mut self.children
    }

    fn mesh_id(&self) -> Option<MeshId> {
        Some(self.id)
    }

    fn material(&self) -> Option<MaterialHandle> {
        Some(self.material)
    }

    fn material_slot(&mut self) -> Option<&mut MaterialHandle> {
        Some(&mut self.material)
    }

    fn draw(
        &self,
        materials: &[Option<Material>],
        camera_bind_group: &wgpu::BindGroup,
        light_bind_group: &wgpu::BindGroup,
        render_pass: &mut wgpu::RenderPass<'_>,
    ) {
        match materials.get(self.material.0).and_then(Option::as_ref) {
            Some(material) => {
                render_pass.set_vertex_buffer(1, self.transform_buffer.slice(..));
                render_pass.draw_mesh(&self.mesh, material, camera_bind_group, light_bind_group);
            }
            // The slot is only written once its material is built, so this
            // can only happen for an asset whose default material failed.
            None => log::warn!("mesh {} references unbuilt material {}", self.id, self.material.0),
        }
        for child in &self.children {
            child.draw(materials, camera_bind_group, light_bind_group, render_pass);
        }
    }
}
