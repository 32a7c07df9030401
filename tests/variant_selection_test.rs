//! Variant selection behaviour over a stub scene graph.
//!
//! These tests exercise the full select/resolve/commit cycle without a GPU:
//! the scene nodes are plain structs and the resolver hands handles back
//! unchanged (or fails on demand).

use std::cell::RefCell;

use futures::executor::block_on;
use matswap::error::MaterialResolutionError;
use matswap::model::Material;
use matswap::scene::{MaterialHandle, MeshId, SceneNode, find_material_slot};
use matswap::variants::{
    MappingEntry, MeshVariantMapping, ResolveMaterial, VariantCatalog, VariantSelector, apply_plan,
};

struct TestMesh {
    id: MeshId,
    material: MaterialHandle,
    children: Vec<Box<dyn SceneNode>>,
}

impl TestMesh {
    fn new(id: MeshId, material: usize) -> Box<Self> {
        Box::new(Self {
            id,
            material: MaterialHandle(material),
            children: Vec::new(),
        })
    }
}

impl SceneNode for TestMesh {
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
        _: &[Option<Material>],
        _: &wgpu::BindGroup,
        _: &wgpu::BindGroup,
        _: &mut wgpu::RenderPass<'_>,
    ) {
    }
}

struct TestGroup {
    children: Vec<Box<dyn SceneNode>>,
}

impl TestGroup {
    fn new(children: Vec<Box<dyn SceneNode>>) -> Box<Self> {
        Box::new(Self { children })
    }
}

impl SceneNode for TestGroup {
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
        _: &[Option<Material>],
        _: &wgpu::BindGroup,
        _: &wgpu::BindGroup,
        _: &mut wgpu::RenderPass<'_>,
    ) {
    }
}

/// Resolver that hands handles straight back, optionally failing one of them.
#[derive(Default)]
struct StubResolver {
    fail: Option<MaterialHandle>,
    resolved: RefCell<Vec<MaterialHandle>>,
}

impl StubResolver {
    fn failing(handle: MaterialHandle) -> Self {
        Self {
            fail: Some(handle),
            resolved: RefCell::new(Vec::new()),
        }
    }
}

impl ResolveMaterial for StubResolver {
    async fn resolve(
        &self,
        material: MaterialHandle,
    ) -> Result<MaterialHandle, MaterialResolutionError> {
        if self.fail == Some(material) {
            return Err(MaterialResolutionError::UnknownMaterial(material.0));
        }
        self.resolved.borrow_mut().push(material);
        Ok(material)
    }
}

const SEAT: MeshId = 0;
const BACKREST: MeshId = 1;
const FLOOR: MeshId = 2;

/// A chair whose seat has wood and marble skins, a backrest with only a
/// marble skin, and a floor that carries no variant mapping at all.
fn chair_scene() -> (Box<dyn SceneNode>, VariantSelector) {
    let scene = TestGroup::new(vec![
        TestMesh::new(SEAT, 0),
        TestMesh::new(BACKREST, 1),
        TestMesh::new(FLOOR, 5),
    ]);

    let catalog = VariantCatalog::new(vec!["Wood".to_string(), "Marble".to_string()]);
    let mut selector = VariantSelector::new(catalog);
    selector.insert_mapping(
        SEAT,
        MeshVariantMapping::new(vec![
            MappingEntry {
                material: MaterialHandle(2),
                variants: vec![0],
            },
            MappingEntry {
                material: MaterialHandle(3),
                variants: vec![1],
            },
        ]),
    );
    selector.insert_mapping(
        BACKREST,
        MeshVariantMapping::new(vec![MappingEntry {
            material: MaterialHandle(4),
            variants: vec![1],
        }]),
    );

    (scene, selector)
}

fn material_of(scene: &mut dyn SceneNode, id: MeshId) -> MaterialHandle {
    *find_material_slot(scene, id).unwrap()
}

#[test]
fn selection_swaps_mapped_meshes_and_restores_the_rest() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    let plan = selector.select(scene.as_mut(), "Wood");
    let applied = block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));

    assert_eq!(applied, 1);
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(2));
    // The backrest has no wood skin, so it keeps its default.
    assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(1));
    assert_eq!(material_of(scene.as_mut(), FLOOR), MaterialHandle(5));
}

#[test]
fn selection_matches_by_substring() {
    let (mut scene, _) = chair_scene();
    let catalog = VariantCatalog::new(vec![
        "Aged Wood".to_string(),
        "Smooth Marble".to_string(),
    ]);
    let mut selector = VariantSelector::new(catalog);
    selector.insert_mapping(
        SEAT,
        MeshVariantMapping::new(vec![MappingEntry {
            material: MaterialHandle(7),
            variants: vec![1],
        }]),
    );
    let resolver = StubResolver::default();

    let plan = selector.select(scene.as_mut(), "Marble");
    block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));

    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(7));
}

#[test]
fn unknown_variant_restores_all_defaults() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    let plan = selector.select(scene.as_mut(), "Marble");
    block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(3));
    assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(4));

    let plan = selector.select(scene.as_mut(), "Granite");
    assert!(plan.is_empty());
    // Restores happen synchronously, before any resolution.
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(0));
    assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(1));
}

#[test]
fn defaults_are_captured_before_the_first_override() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    // Two overrides back to back; the cached default must still be the
    // material from before the first one.
    for name in ["Wood", "Marble"] {
        let plan = selector.select(scene.as_mut(), name);
        block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));
    }
    assert_eq!(selector.original_material(SEAT), Some(MaterialHandle(0)));

    let plan = selector.select(scene.as_mut(), "nothing like this");
    assert!(plan.is_empty());
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(0));
}

#[test]
fn reselecting_the_same_variant_is_idempotent() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    for _ in 0..3 {
        let plan = selector.select(scene.as_mut(), "Wood");
        block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));
        assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(2));
        assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(1));
    }
}

#[test]
fn stale_selection_results_are_discarded() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    let wood_plan = selector.select(scene.as_mut(), "Wood");
    let marble_plan = selector.select(scene.as_mut(), "Marble");

    // The older plan resolves after the newer selection superseded it.
    let applied = block_on(apply_plan(&selector, scene.as_mut(), &resolver, wood_plan));
    assert_eq!(applied, 0);

    let applied = block_on(apply_plan(&selector, scene.as_mut(), &resolver, marble_plan));
    assert_eq!(applied, 2);
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(3));
    assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(4));
}

#[test]
fn failed_resolution_only_affects_its_own_mesh() {
    let (mut scene, mut selector) = chair_scene();
    // The seat's marble material fails to build.
    let resolver = StubResolver::failing(MaterialHandle(3));

    let plan = selector.select(scene.as_mut(), "Marble");
    let applied = block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));

    assert_eq!(applied, 1);
    assert_eq!(material_of(scene.as_mut(), BACKREST), MaterialHandle(4));
    // The failed mesh keeps whatever it showed before.
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(0));
    assert_eq!(resolver.resolved.borrow().as_slice(), &[MaterialHandle(4)]);
}

#[test]
fn empty_catalog_is_valid_and_selects_nothing() {
    let (mut scene, _) = chair_scene();
    let catalog = VariantCatalog::new(Vec::new());
    assert!(catalog.is_empty());
    assert_eq!(catalog.len(), 0);
    assert_eq!(catalog.resolve("Wood"), None);

    // Mappings may still exist; with no catalogue entries they can never
    // resolve, so every mesh keeps what it currently shows.
    let mut selector = VariantSelector::new(catalog);
    selector.insert_mapping(
        SEAT,
        MeshVariantMapping::new(vec![MappingEntry {
            material: MaterialHandle(2),
            variants: vec![0],
        }]),
    );
    let resolver = StubResolver::default();

    let plan = selector.select(scene.as_mut(), "Wood");
    assert!(plan.is_empty());
    let applied = block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));
    assert_eq!(applied, 0);
    assert_eq!(material_of(scene.as_mut(), SEAT), MaterialHandle(0));
    assert!(resolver.resolved.borrow().is_empty());
}

#[test]
fn meshes_without_mappings_are_never_touched() {
    let (mut scene, mut selector) = chair_scene();
    let resolver = StubResolver::default();

    for name in ["Wood", "Marble", "Granite", "Wood"] {
        let plan = selector.select(scene.as_mut(), name);
        block_on(apply_plan(&selector, scene.as_mut(), &resolver, plan));
        assert_eq!(material_of(scene.as_mut(), FLOOR), MaterialHandle(5));
    }
}
