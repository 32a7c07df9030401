//! Lazily built GPU materials for one glTF document.
//!
//! The store keeps the parsed document and its buffers and exposes one slot
//! per glTF material plus a trailing fallback slot for primitives that
//! declare none. A slot is built at most once; later lookups reuse the cached
//! [`Material`]. Cloning the store is cheap and shares the slots, which is
//! what lets resolution futures run detached on the web target.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::assets::load_binary;
use crate::error::{AssetLoadError, MaterialResolutionError};
use crate::model::Material;
use crate::scene::MaterialHandle;
use crate::texture::Texture;
use crate::variants::ResolveMaterial;

const WHITE_PIXEL: [u8; 4] = [255, 255, 255, 255];

#[derive(Clone)]
pub struct MaterialStore {
    device: wgpu::Device,
    queue: wgpu::Queue,
    document: Rc<gltf::Document>,
    buffers: Rc<Vec<Vec<u8>>>,
    layout: Rc<wgpu::BindGroupLayout>,
    slots: Rc<RefCell<Vec<Option<Material>>>>,
}

impl MaterialStore {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        document: gltf::Document,
        buffers: Vec<Vec<u8>>,
        layout: wgpu::BindGroupLayout,
    ) -> Self {
        // One slot per document material, one more for the fallback.
        let slot_count = document.materials().count() + 1;
        Self {
            device,
            queue,
            document: Rc::new(document),
            buffers: Rc::new(buffers),
            layout: Rc::new(layout),
            slots: Rc::new(RefCell::new(
                (0..slot_count).map(|_| None).collect(),
            )),
        }
    }

    /// Handle of the plain white fallback material.
    pub fn fallback_handle(&self) -> MaterialHandle {
        MaterialHandle(self.slots.borrow().len() - 1)
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// A shared view of all slots, for rendering. Must not be held across a
    /// call that resolves materials.
    pub fn materials(&self) -> Ref<'_, Vec<Option<Material>>> {
        self.slots.borrow()
    }

    pub fn is_resolved(&self, handle: MaterialHandle) -> bool {
        self.slots
            .borrow()
            .get(handle.0)
            .is_some_and(Option::is_some)
    }

    /// Build every listed material now. Used at load time for the default
    /// scene; any failure here is fatal to the load.
    pub async fn preload(&self, handles: &[MaterialHandle]) -> Result<(), AssetLoadError> {
        for &handle in handles {
            self.ensure(handle.0)
                .await
                .map_err(|source| AssetLoadError::InitialMaterial {
                    material: handle.0,
                    source,
                })?;
        }
        Ok(())
    }

    async fn ensure(&self, index: usize) -> Result<(), MaterialResolutionError> {
        {
            let slots = self.slots.borrow();
            match slots.get(index) {
                Some(Some(_)) => return Ok(()),
                Some(None) => {}
                None => return Err(MaterialResolutionError::UnknownMaterial(index)),
            }
        }

        let material = self.build(index).await?;
        // Another in-flight resolution may have built the slot meanwhile;
        // first writer wins either way.
        let mut slots = self.slots.borrow_mut();
        if slots[index].is_none() {
            slots[index] = Some(material);
        }
        Ok(())
    }

    async fn build(&self, index: usize) -> Result<Material, MaterialResolutionError> {
        if index == self.fallback_handle().0 {
            let texture = Texture::from_pixel(&self.device, &self.queue, WHITE_PIXEL, "fallback");
            return Ok(Material::new(
                &self.device,
                "fallback",
                texture,
                [1.0, 1.0, 1.0, 1.0],
                &self.layout,
            ));
        }

        let gltf_material = self
            .document
            .materials()
            .nth(index)
            .ok_or(MaterialResolutionError::UnknownMaterial(index))?;
        let name = gltf_material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material {index}"));
        let pbr = gltf_material.pbr_metallic_roughness();
        let base_color_factor = pbr.base_color_factor();

        let base_color = match pbr.base_color_texture() {
            Some(info) => match info.texture().source().source() {
                gltf::image::Source::View { view, mime_type } => {
                    let bytes = self
                        .buffers
                        .get(view.buffer().index())
                        .and_then(|buffer| view_bytes(buffer, view.offset(), view.length()))
                        .ok_or_else(|| MaterialResolutionError::Texture {
                            material: index,
                            cause: anyhow::anyhow!("texture buffer view is out of range"),
                        })?;
                    Texture::from_bytes(
                        &self.device,
                        &self.queue,
                        bytes,
                        &name,
                        mime_type.split('/').next_back(),
                    )
                    .map_err(|cause| MaterialResolutionError::Texture {
                        material: index,
                        cause,
                    })?
                }
                gltf::image::Source::Uri { uri, mime_type } => {
                    let bytes = load_binary(uri).await.map_err(|cause| {
                        MaterialResolutionError::Texture {
                            material: index,
                            cause,
                        }
                    })?;
                    Texture::from_bytes(
                        &self.device,
                        &self.queue,
                        &bytes,
                        &name,
                        mime_type.and_then(|mt| mt.split('/').next_back()),
                    )
                    .map_err(|cause| MaterialResolutionError::Texture {
                        material: index,
                        cause,
                    })?
                }
            },
            // Factor-only material: sample a white pixel, the factor does
            // the colouring in the shader.
            None => Texture::from_pixel(&self.device, &self.queue, WHITE_PIXEL, &name),
        };

        Ok(Material::new(
            &self.device,
            &name,
            base_color,
            base_color_factor,
            &self.layout,
        ))
    }
}

impl ResolveMaterial for MaterialStore {
    async fn resolve(
        &self,
        material: MaterialHandle,
    ) -> Result<MaterialHandle, MaterialResolutionError> {
        self.ensure(material.0).await?;
        Ok(material)
    }
}

/// Bounds-checked slice of a buffer view. Malformed views must fail the one
/// material, never panic.
fn view_bytes(buffer: &[u8], offset: usize, length: usize) -> Option<&[u8]> {
    buffer.get(offset..offset.checked_add(length)?)
}

#[cfg(test)]
mod tests {
    use super::view_bytes;

    #[test]
    fn buffer_views_past_the_end_are_rejected() {
        let buffer = [0u8; 8];
        assert!(view_bytes(&buffer, 0, 8).is_some());
        assert!(view_bytes(&buffer, 4, 4).is_some());
        assert!(view_bytes(&buffer, 4, 5).is_none());
        assert!(view_bytes(&buffer, 9, 0).is_none());
        assert!(view_bytes(&buffer, usize::MAX, 1).is_none());
    }
}
