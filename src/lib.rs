//! matswap
//!
//! A cross-platform viewer for glTF assets tagged with the
//! `KHR_materials_variants` extension, targeting native windows and the
//! browser canvas via WASM. The asset's variant catalogue drives material
//! switching at runtime: selecting a variant swaps every affected mesh's
//! material to the mapped one and restores the captured default everywhere
//! else, resolving GPU materials lazily as they are first needed.
//!
//! High-level modules
//! - `assets`: glTF loading, variant metadata parsing and the material store
//! - `camera`: camera types, orbit controller and uniforms for view/projection
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `error`: load and resolution error types
//! - `model`: GPU mesh and material data
//! - `pipelines`: render pipeline construction
//! - `scene`: the scene graph the variant selector operates on
//! - `variants`: variant catalogue, selection planning and application
//! - `viewer`: the application shell and event loop
//!

pub mod assets;
pub mod camera;
pub mod context;
pub mod error;
pub mod model;
pub mod pipelines;
pub mod scene;
pub mod texture;
pub mod variants;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use winit::dpi::PhysicalPosition;
pub use winit::event::WindowEvent;
