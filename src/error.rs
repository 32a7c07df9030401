//! Error taxonomy for asset loading and material resolution.
//!
//! Two failure classes exist: [`AssetLoadError`] is fatal to startup (no
//! scene is composed when the asset cannot be fetched, parsed, or carries no
//! variant metadata), while [`MaterialResolutionError`] is scoped to a single
//! mesh's material update and never aborts the session or other meshes'
//! updates. A variant name that matches nothing is not an error at all; the
//! affected meshes silently fall back to their default material.

use thiserror::Error;

/// Startup-fatal asset failures.
#[derive(Debug, Error)]
pub enum AssetLoadError {
    /// The asset bytes could not be read (filesystem on native, fetch on web).
    #[error("failed to fetch asset {path}: {cause}")]
    Fetch { path: String, cause: anyhow::Error },

    /// The bytes were read but are not a well-formed glTF document.
    #[error("failed to parse glTF asset: {0}")]
    Parse(#[from] gltf::Error),

    /// A buffer declares the binary blob as its source but the file
    /// carries none.
    #[error("glTF declares a binary buffer but the binary chunk is missing")]
    MissingBinaryChunk,

    /// The document carries no `KHR_materials_variants` root extension.
    #[error("asset declares no KHR_materials_variants metadata")]
    MissingVariantMetadata,

    /// The extension is present but its payload does not match the schema.
    #[error("malformed KHR_materials_variants payload: {0}")]
    MalformedVariantMetadata(#[from] serde_json::Error),

    /// A material referenced by the default scene could not be built.
    #[error("could not build initial material {material}")]
    InitialMaterial {
        material: usize,
        #[source]
        source: MaterialResolutionError,
    },
}

/// Per-mesh, per-call material resolution failures. Not retried; the user
/// re-triggers the selection to retry.
#[derive(Debug, Error)]
pub enum MaterialResolutionError {
    #[error("material index {0} is out of range for this asset")]
    UnknownMaterial(usize),

    /// A texture the material depends on could not be fetched or decoded.
    #[error("failed to resolve texture dependency of material {material}: {cause}")]
    Texture { material: usize, cause: anyhow::Error },
}
