//! Material-variant selection over the scene graph.
//!
//! A glTF asset tagged with `KHR_materials_variants` carries a root-level
//! catalogue of variant names plus, per primitive, a mapping from variant
//! indices to material indices. [`VariantSelector`] owns both, keeps a side
//! table of each mesh's default material, and turns a selection request into
//! a [`SelectionPlan`] of pending material swaps.
//!
//! Selection is split in two phases. [`VariantSelector::select`] walks the
//! graph synchronously: it captures defaults on first contact, restores
//! unmatched meshes inline and collects the swaps whose materials still need
//! resolving. The swaps are then resolved concurrently and committed one by
//! one through [`VariantSelector::commit`], each commit guarded by the
//! selection generation so a superseded selection can never overwrite a newer
//! one.

use std::collections::HashMap;

use crate::error::MaterialResolutionError;
use crate::scene::{MaterialHandle, MeshId, SceneNode, find_material_slot, visit_meshes};

/// The ordered list of variant names from the asset's root extension.
#[derive(Debug, Clone, Default)]
pub struct VariantCatalog {
    names: Vec<String>,
}

impl VariantCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Resolve a requested name to a variant index.
    ///
    /// Matching is by substring containment in catalogue order, first match
    /// wins: requesting "Wood" finds "Polished Wood" if that is the first
    /// entry containing it. Exact matches are a special case of this rule.
    pub fn resolve(&self, requested: &str) -> Option<usize> {
        self.names.iter().position(|name| name.contains(requested))
    }
}

/// One mapping entry of a primitive: a material and the variant indices it
/// applies to.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub material: MaterialHandle,
    pub variants: Vec<usize>,
}

/// A primitive's full variant-to-material mapping, in asset declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct MeshVariantMapping {
    entries: Vec<MappingEntry>,
}

impl MeshVariantMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The material mapped to a variant index.
    ///
    /// The first entry listing the index wins, so assets that malformedly
    /// list a variant in several entries still resolve deterministically.
    pub fn material_for(&self, variant: usize) -> Option<MaterialHandle> {
        self.entries
            .iter()
            .find(|entry| entry.variants.contains(&variant))
            .map(|entry| entry.material)
    }
}

#[derive(Debug)]
struct MeshRecord {
    mapping: MeshVariantMapping,
    /// The mesh's default material, captured lazily before its first
    /// override. `None` until the first selection touches the mesh.
    original: Option<MaterialHandle>,
}

/// A material swap whose target material may still need building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSwap {
    pub mesh: MeshId,
    pub material: MaterialHandle,
}

/// The outcome of one selection traversal: the swaps left to resolve, tagged
/// with the generation that must still be current at commit time.
#[derive(Debug)]
pub struct SelectionPlan {
    pub generation: u64,
    pub pending: Vec<PendingSwap>,
}

impl SelectionPlan {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Owns the variant catalogue and the per-mesh mapping and default-material
/// side tables.
#[derive(Debug)]
pub struct VariantSelector {
    catalog: VariantCatalog,
    records: HashMap<MeshId, MeshRecord>,
    generation: u64,
}

impl VariantSelector {
    pub fn new(catalog: VariantCatalog) -> Self {
        Self {
            catalog,
            records: HashMap::new(),
            generation: 0,
        }
    }

    /// Register a primitive's mapping at load time. Meshes without a mapping
    /// are simply never registered and stay untouched by every selection.
    pub fn insert_mapping(&mut self, mesh: MeshId, mapping: MeshVariantMapping) {
        self.records.insert(
            mesh,
            MeshRecord {
                mapping,
                original: None,
            },
        );
    }

    pub fn catalog(&self) -> &VariantCatalog {
        &self.catalog
    }

    /// The generation of the most recent selection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The cached default material of a mesh, if a selection has touched it.
    pub fn original_material(&self, mesh: MeshId) -> Option<MaterialHandle> {
        self.records.get(&mesh).and_then(|record| record.original)
    }

    /// Apply a variant selection to the graph.
    ///
    /// Bumps the selection generation, then visits every mesh that carries a
    /// mapping. On first contact the mesh's current material is captured as
    /// its default. Meshes whose mapping covers the resolved variant yield a
    /// [`PendingSwap`]; all others are restored to their default immediately.
    /// An unknown name resolves no variant, so every mapped mesh restores.
    pub fn select(&mut self, scene: &mut dyn SceneNode, requested: &str) -> SelectionPlan {
        self.generation += 1;
        let generation = self.generation;
        let variant = self.catalog.resolve(requested);
        if variant.is_none() {
            log::warn!("variant '{requested}' matches no catalogue entry, restoring defaults");
        }

        let records = &mut self.records;
        let mut pending = Vec::new();
        visit_meshes(scene, &mut |mesh, slot| {
            let Some(record) = records.get_mut(&mesh) else {
                return;
            };
            let original = *record.original.get_or_insert(*slot);
            match variant.and_then(|v| record.mapping.material_for(v)) {
                Some(material) => pending.push(PendingSwap { mesh, material }),
                None => *slot = original,
            }
        });

        SelectionPlan {
            generation,
            pending,
        }
    }

    /// Write a resolved material into a mesh's slot.
    ///
    /// Returns `false` without touching the graph when the plan's generation
    /// has been superseded by a newer selection, or when the mesh no longer
    /// exists.
    pub fn commit(
        &self,
        scene: &mut dyn SceneNode,
        mesh: MeshId,
        material: MaterialHandle,
        generation: u64,
    ) -> bool {
        if generation != self.generation {
            log::debug!(
                "discarding stale material update for mesh {mesh} (generation {generation}, current {})",
                self.generation
            );
            return false;
        }
        match find_material_slot(scene, mesh) {
            Some(slot) => {
                *slot = material;
                true
            }
            None => false,
        }
    }
}

/// Turns a material handle into a render-ready one, building GPU state on
/// demand.
pub trait ResolveMaterial {
    async fn resolve(
        &self,
        material: MaterialHandle,
    ) -> Result<MaterialHandle, MaterialResolutionError>;
}

/// Resolve and commit every swap in a plan.
///
/// All resolutions run concurrently. Each result commits independently: a
/// mesh whose material fails to resolve is logged and skipped while the rest
/// proceed, and results arriving after a newer selection are discarded by the
/// generation check. Returns the number of swaps actually applied.
pub async fn apply_plan<R: ResolveMaterial>(
    selector: &VariantSelector,
    scene: &mut dyn SceneNode,
    resolver: &R,
    plan: SelectionPlan,
) -> usize {
    let resolutions =
        futures::future::join_all(plan.pending.iter().map(|swap| resolver.resolve(swap.material)))
            .await;

    let mut applied = 0;
    for (swap, resolved) in plan.pending.iter().zip(resolutions) {
        match resolved {
            Ok(material) => {
                if selector.commit(scene, swap.mesh, material, plan.generation) {
                    applied += 1;
                }
            }
            Err(error) => {
                log::error!("material update for mesh {} failed: {error}", swap.mesh);
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(names: &[&str]) -> VariantCatalog {
        VariantCatalog::new(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn resolve_prefers_first_substring_match() {
        let catalog = catalog(&["Polished Wood", "Wood", "Marble"]);
        assert_eq!(catalog.resolve("Wood"), Some(0));
        assert_eq!(catalog.resolve("Marble"), Some(2));
    }

    #[test]
    fn resolve_exact_name_is_a_substring_match() {
        let catalog = catalog(&["Wood", "Marble"]);
        assert_eq!(catalog.resolve("Marble"), Some(1));
    }

    #[test]
    fn resolve_unknown_name_yields_none() {
        let catalog = catalog(&["Wood", "Marble"]);
        assert_eq!(catalog.resolve("Granite"), None);
    }

    #[test]
    fn mapping_first_entry_wins_on_overlap() {
        let mapping = MeshVariantMapping::new(vec![
            MappingEntry {
                material: MaterialHandle(3),
                variants: vec![0, 1],
            },
            MappingEntry {
                material: MaterialHandle(7),
                variants: vec![1],
            },
        ]);
        assert_eq!(mapping.material_for(1), Some(MaterialHandle(3)));
        assert_eq!(mapping.material_for(0), Some(MaterialHandle(3)));
        assert_eq!(mapping.material_for(2), None);
    }
}
