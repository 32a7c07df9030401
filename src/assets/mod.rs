//! Loading glTF assets with `KHR_materials_variants` metadata.
//!
//! [`load_scene`] fetches and parses one asset, builds the scene graph (one
//! [`MeshNode`] per glTF primitive), reads the root variant catalogue and the
//! per-primitive variant mappings into a [`VariantSelector`], and hands the
//! document off to a [`MaterialStore`] that builds GPU materials on demand.

use std::io::{BufReader, Cursor};

use serde::Deserialize;

use crate::error::AssetLoadError;
use crate::model::ModelVertex;
use crate::scene::{ContainerNode, MaterialHandle, MeshId, MeshNode, SceneNode, Transform};
use crate::variants::{
    MappingEntry, MeshVariantMapping, VariantCatalog, VariantSelector,
};

pub mod materials;

pub use materials::MaterialStore;

/// Name of the glTF extension this viewer is built around.
pub const VARIANTS_EXTENSION: &str = "KHR_materials_variants";

/// Root-level extension payload: the ordered variant catalogue.
#[derive(Debug, Deserialize)]
struct VariantList {
    variants: Vec<VariantDef>,
}

#[derive(Debug, Deserialize)]
struct VariantDef {
    name: String,
}

/// Per-primitive extension payload: material per set of variant indices.
#[derive(Debug, Deserialize)]
struct MappingList {
    mappings: Vec<MappingDef>,
}

#[derive(Debug, Deserialize)]
struct MappingDef {
    material: usize,
    variants: Vec<usize>,
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> reqwest::Url {
    let window = web_sys::window().unwrap();
    let location = window.location();
    let origin = location.origin().unwrap();
    let base = reqwest::Url::parse(&format!("{}/assets/", origin)).unwrap();
    base.join(file_name).unwrap()
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name);
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        std::fs::read(path)?
    };

    Ok(data)
}

/// Everything [`load_scene`] produces for one asset.
pub struct LoadedScene {
    pub root: Box<dyn SceneNode>,
    pub selector: VariantSelector,
    pub materials: MaterialStore,
}

pub async fn load_scene(
    file_name: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Result<LoadedScene, AssetLoadError> {
    let bytes = load_binary(file_name)
        .await
        .map_err(|cause| AssetLoadError::Fetch {
            path: file_name.to_string(),
            cause,
        })?;
    let gltf = gltf::Gltf::from_reader(BufReader::new(Cursor::new(bytes)))?;

    let buffer_data = read_buffer_data(&gltf).await?;

    let document = gltf.document;

    // The viewer is pointless without the variants extension, so its absence
    // is a load error rather than a degraded mode.
    let catalog = match document.extension_value(VARIANTS_EXTENSION) {
        Some(value) => {
            let list: VariantList = serde_json::from_value(value.clone())?;
            VariantCatalog::new(list.variants.into_iter().map(|v| v.name).collect())
        }
        None => return Err(AssetLoadError::MissingVariantMetadata),
    };
    log::info!("variant catalogue: {:?}", catalog.names());

    let mut selector = VariantSelector::new(catalog);
    let fallback = MaterialHandle(document.materials().count());

    let mut root = ContainerNode::new();
    let mut next_id: MeshId = 0;
    for scene in document.scenes() {
        for node in scene.nodes() {
            let child = to_scene_node(
                node,
                &Transform::default(),
                &buffer_data,
                device,
                fallback,
                &mut selector,
                &mut next_id,
            )?;
            root.add_child(child);
        }
    }
    let root: Box<dyn SceneNode> = Box::new(root);

    let materials = MaterialStore::new(
        device.clone(),
        queue.clone(),
        document,
        buffer_data,
        crate::model::material_layout(device),
    );

    // Everything the default scene references renders on the first frame, so
    // those materials are built eagerly. Variant materials stay unbuilt until
    // a selection asks for them.
    let mut initial: Vec<MaterialHandle> = Vec::new();
    collect_initial_materials(root.as_ref(), &mut initial);
    materials.preload(&initial).await?;

    Ok(LoadedScene {
        root,
        selector,
        materials,
    })
}

/// Read every buffer's bytes, indexed as the document indexes them.
///
/// Embedded data URIs are not supported, only the binary blob and sibling
/// files. A buffer backed by the blob when none is present is a hard error;
/// skipping it would shift every later buffer's index.
async fn read_buffer_data(gltf: &gltf::Gltf) -> Result<Vec<Vec<u8>>, AssetLoadError> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffer_data.push(blob.to_vec()),
                None => return Err(AssetLoadError::MissingBinaryChunk),
            },
            gltf::buffer::Source::Uri(uri) => {
                let bin = load_binary(uri)
                    .await
                    .map_err(|cause| AssetLoadError::Fetch {
                        path: uri.to_string(),
                        cause,
                    })?;
                buffer_data.push(bin);
            }
        }
    }
    Ok(buffer_data)
}

fn collect_initial_materials(node: &dyn SceneNode, out: &mut Vec<MaterialHandle>) {
    if let Some(handle) = node.material() {
        if !out.contains(&handle) {
            out.push(handle);
        }
    }
    for child in node.children() {
        collect_initial_materials(child.as_ref(), out);
    }
}

fn to_scene_node(
    node: gltf::Node,
    parent: &Transform,
    buffer_data: &[Vec<u8>],
    device: &wgpu::Device,
    fallback: MaterialHandle,
    selector: &mut VariantSelector,
    next_id: &mut MeshId,
) -> Result<Box<dyn SceneNode>, AssetLoadError> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let local = Transform {
        position: translation.into(),
        rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    };
    let world = parent * &local;

    let mut scene_node: Box<dyn SceneNode> = match node.mesh() {
        Some(mesh) => {
            let mesh_name = mesh.name().unwrap_or("unnamed").to_string();
            let mut container = ContainerNode::new();
            for primitive in mesh.primitives() {
                let id = *next_id;
                *next_id += 1;

                let reader = primitive.reader(|buffer| {
                    buffer_data.get(buffer.index()).map(Vec::as_slice)
                });

                let mut vertices = Vec::new();
                if let Some(positions) = reader.read_positions() {
                    for position in positions {
                        vertices.push(ModelVertex {
                            position,
                            tex_coords: Default::default(),
                            normal: Default::default(),
                        });
                    }
                }
                if let Some(normals) = reader.read_normals() {
                    for (vertex, normal) in vertices.iter_mut().zip(normals) {
                        vertex.normal = normal;
                    }
                }
                if let Some(tex_coords) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                    for (vertex, tex_coord) in vertices.iter_mut().zip(tex_coords) {
                        vertex.tex_coords = tex_coord;
                    }
                }

                let indices: Vec<u32> = match reader.read_indices() {
                    Some(raw) => raw.into_u32().collect(),
                    None => (0..vertices.len() as u32).collect(),
                };

                let material = primitive
                    .material()
                    .index()
                    .map(MaterialHandle)
                    .unwrap_or(fallback);

                if let Some(value) = primitive.extension_value(VARIANTS_EXTENSION) {
                    let list: MappingList = serde_json::from_value(value.clone())?;
                    let entries = list
                        .mappings
                        .into_iter()
                        .map(|def| MappingEntry {
                            material: MaterialHandle(def.material),
                            variants: def.variants,
                        })
                        .collect::<Vec<_>>();
                    if !entries.is_empty() {
                        selector.insert_mapping(id, MeshVariantMapping::new(entries));
                    }
                }

                let name = format!("{mesh_name}#{}", primitive.index());
                container.add_child(Box::new(MeshNode::new(
                    device, &name, id, &vertices, &indices, material, &world,
                )));
            }
            container.into_single_child()
        }
        None => Box::new(ContainerNode::new()),
    };

    for child in node.children() {
        let child_node = to_scene_node(
            child, &world, buffer_data, device, fallback, selector, next_id,
        )?;
        scene_node.add_child(child_node);
    }

    Ok(scene_node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn blob_backed_buffer_without_blob_fails_the_load() {
        let json = br#"{"asset":{"version":"2.0"},"buffers":[{"byteLength":4}]}"#;
        let gltf = gltf::Gltf::from_slice(json).unwrap();
        assert!(gltf.blob.is_none());

        let result = block_on(read_buffer_data(&gltf));
        assert!(matches!(result, Err(AssetLoadError::MissingBinaryChunk)));
    }
}
