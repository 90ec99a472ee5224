//! Geometry layer and mesh library
//!
//! Links become nested `Xform` prims below `/<robot>/Geometry`, each placed
//! by its transform relative to the parent link. Primitive shapes are
//! authored in place; meshes are stored once per distinct content in the
//! mesh library and referenced from every geometry entry that uses them.

use nalgebra::Isometry3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{asset_paths, author_custom_data, set_display_name, set_local_transform, MeshMap};
use crate::kinematics::KinematicTree;
use crate::mesh::processing::content_digest;
use crate::mesh::NormalizedMesh;
use crate::model::{Geometry, LinkId, RobotModel};
use crate::usd::{Attribute, Layer, LayerMetadata, NameCache, PrimPath, PrimSpec, Property, Reference, Value};

/// Root prim of the mesh library layer
pub const LIBRARY_ROOT: &str = "Meshes";

/// One distinct mesh in the library
#[derive(Debug, Clone)]
pub struct LibraryMesh {
    pub prim: PrimPath,
    pub mesh: Arc<NormalizedMesh>,
    /// Subset prim name per mesh material; `None` for empty or unsplit groups
    pub subsets: Vec<Option<String>>,
}

/// Meshes keyed by content, authored once each
pub struct MeshLibrary {
    layer: Layer,
    names: NameCache,
    root: PrimPath,
    entries: Vec<LibraryMesh>,
    by_digest: HashMap<String, usize>,
    by_path: HashMap<PathBuf, usize>,
}

impl MeshLibrary {
    pub fn new(metadata: LayerMetadata) -> Self {
        let mut layer = Layer::new();
        layer.metadata = metadata;
        let root = PrimPath::from_root(LIBRARY_ROOT);
        layer.define_prim(&root, "Scope");
        Self {
            layer,
            names: NameCache::new(),
            root,
            entries: Vec::new(),
            by_digest: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Library index of the mesh decoded from `source`, authoring it on first use
    pub fn add(&mut self, source: &Path, mesh: &Arc<NormalizedMesh>) -> usize {
        if let Some(index) = self.by_path.get(source) {
            return *index;
        }

        let digest = content_digest(mesh);
        if let Some(index) = self.by_digest.get(&digest).copied() {
            debug!("Mesh {} shares content with a library entry", source.display());
            self.by_path.insert(source.to_path_buf(), index);
            return index;
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prim = self.names.child(&self.root, &stem);
        {
            let spec = self.layer.define_prim(&prim, "Mesh");
            set_display_name(spec, &stem);
            author_mesh_data(spec, mesh);
        }
        let subsets = self.author_subsets(&prim, mesh);

        let index = self.entries.len();
        self.entries.push(LibraryMesh {
            prim,
            mesh: Arc::clone(mesh),
            subsets,
        });
        self.by_digest.insert(digest, index);
        self.by_path.insert(source.to_path_buf(), index);
        index
    }

    fn author_subsets(&mut self, mesh_prim: &PrimPath, mesh: &NormalizedMesh) -> Vec<Option<String>> {
        if mesh.materials.len() < 2 {
            return vec![None; mesh.materials.len()];
        }

        if let Some(spec) = self.layer.prim_mut(mesh_prim) {
            spec.set_uniform(
                "subsetFamily:materialBind:familyType",
                Value::token("nonOverlapping"),
            );
        }

        let mut subsets = Vec::with_capacity(mesh.materials.len());
        for (material, faces) in mesh.materials.iter().zip(mesh.material_groups()) {
            if faces.is_empty() {
                subsets.push(None);
                continue;
            }
            let path = self.names.child(mesh_prim, &material.name);
            let spec = self.layer.define_prim(&path, "GeomSubset");
            set_display_name(spec, &material.name);
            spec.set_uniform("elementType", Value::token("face"));
            spec.set_uniform("familyName", Value::token("materialBind"));
            spec.set(
                "indices",
                Value::IntArray(faces.iter().map(|f| *f as i32).collect()),
            );
            subsets.push(Some(path.name().to_string()));
        }
        subsets
    }

    pub fn entry(&self, index: usize) -> &LibraryMesh {
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }
}

fn author_mesh_data(spec: &mut PrimSpec, mesh: &NormalizedMesh) {
    spec.set("points", Value::Point3fArray(mesh.positions.clone()));
    spec.set(
        "faceVertexCounts",
        Value::IntArray(vec![3; mesh.triangle_count()]),
    );
    spec.set(
        "faceVertexIndices",
        Value::IntArray(
            mesh.triangles
                .iter()
                .flatten()
                .map(|i| *i as i32)
                .collect(),
        ),
    );
    if let Some(normals) = &mesh.normals {
        spec.set_property(
            "normals",
            Property::Attribute(
                Attribute::new(Value::Normal3fArray(normals.clone())).interpolation("vertex"),
            ),
        );
    }
    if let Some(uvs) = &mesh.uvs {
        spec.set_property(
            "primvars:st",
            Property::Attribute(
                Attribute::new(Value::TexCoord2fArray(uvs.clone())).interpolation("vertex"),
            ),
        );
    }
    spec.set(
        "extent",
        Value::Float3Array(vec![mesh.bounds.min, mesh.bounds.max]),
    );
    spec.set_uniform("subdivisionScheme", Value::token("none"));
}

/// A visual entry as authored in the geometry layer
#[derive(Debug, Clone)]
pub struct AuthoredVisual {
    pub path: PrimPath,
    pub link: LinkId,
    /// Material named by the description, if any
    pub material: Option<String>,
    /// Library index when the visual is a mesh
    pub library_mesh: Option<usize>,
}

/// A collision gprim; its physics opinions live in the physics layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthoredCollision {
    pub path: PrimPath,
    pub is_mesh: bool,
}

/// Output of the geometry pass
pub struct AuthoredGeometry {
    pub layer: Layer,
    pub link_paths: Vec<PrimPath>,
    pub visuals: Vec<AuthoredVisual>,
    pub collisions: Vec<AuthoredCollision>,
}

/// Authors the link hierarchy and its gprims
pub struct GeometryAuthoring<'a> {
    model: &'a RobotModel,
    tree: &'a KinematicTree,
    meshes: &'a MeshMap,
    names: &'a mut NameCache,
}

impl<'a> GeometryAuthoring<'a> {
    pub fn new(
        model: &'a RobotModel,
        tree: &'a KinematicTree,
        meshes: &'a MeshMap,
        names: &'a mut NameCache,
    ) -> Self {
        Self {
            model,
            tree,
            meshes,
            names,
        }
    }

    pub fn author(
        mut self,
        robot: &PrimPath,
        geometry_root: &PrimPath,
        library: &mut MeshLibrary,
    ) -> AuthoredGeometry {
        let mut layer = Layer::new();
        layer.define_prim(robot, "Xform");
        layer.define_prim(geometry_root, "Xform");

        let mut link_paths = vec![PrimPath::root(); self.model.links().len()];
        let mut visuals = Vec::new();
        let mut collisions = Vec::new();

        let model = self.model;
        let tree = self.tree;
        // pre-order: a parent's path is known before its children
        for &id in tree.order() {
            let link = model.link(id);
            let parent = match tree.parent_joint(id) {
                Some(joint) => link_paths[model.joint(joint).parent.0].clone(),
                None => geometry_root.clone(),
            };
            let path = self.names.child(&parent, &link.name);
            {
                let spec = layer.define_prim(&path, "Xform");
                set_display_name(spec, &link.name);
                set_local_transform(spec, &tree.local(model, id), None);
            }

            for visual in &link.visuals {
                let name = visual.name.as_deref().unwrap_or("visual");
                if let Some((prim, library_mesh)) = self.author_geometry(
                    &mut layer,
                    library,
                    &path,
                    name,
                    &visual.geometry,
                    &visual.origin,
                ) {
                    author_custom_data(&mut layer, self.names, &prim, &visual.custom);
                    visuals.push(AuthoredVisual {
                        path: prim,
                        link: id,
                        material: visual.material.clone(),
                        library_mesh,
                    });
                }
            }

            for collision in &link.collisions {
                let name = collision.name.as_deref().unwrap_or("collision");
                if let Some((prim, library_mesh)) = self.author_geometry(
                    &mut layer,
                    library,
                    &path,
                    name,
                    &collision.geometry,
                    &collision.origin,
                ) {
                    if let Some(spec) = layer.prim_mut(&prim) {
                        spec.set_uniform("purpose", Value::token("guide"));
                    }
                    author_custom_data(&mut layer, self.names, &prim, &collision.custom);
                    collisions.push(AuthoredCollision {
                        path: prim,
                        is_mesh: library_mesh.is_some(),
                    });
                }
            }

            link_paths[id.0] = path;
        }

        // after every link is named, so custom scopes never rename a link
        for &id in tree.order() {
            author_custom_data(&mut layer, self.names, &link_paths[id.0], &model.link(id).custom);
        }
        if !model.custom().is_empty() {
            let custom = self.names.child(geometry_root, "custom");
            layer.define_prim(&custom, "Scope");
            author_custom_data(&mut layer, self.names, &custom, model.custom());
        }

        AuthoredGeometry {
            layer,
            link_paths,
            visuals,
            collisions,
        }
    }

    /// Author one gprim; returns its path and library index for meshes
    fn author_geometry(
        &mut self,
        layer: &mut Layer,
        library: &mut MeshLibrary,
        link: &PrimPath,
        name: &str,
        geometry: &Geometry,
        origin: &Isometry3<f64>,
    ) -> Option<(PrimPath, Option<usize>)> {
        let library_mesh = match geometry {
            Geometry::Mesh { reference, .. } => {
                let Some(mesh) = reference.path().and_then(|p| self.meshes.get(p).map(|m| (p, m)))
                else {
                    debug!("Skipping mesh without decoded data: {}", reference.authored);
                    return None;
                };
                Some(library.add(mesh.0, mesh.1))
            }
            _ => None,
        };

        let path = self.names.child(link, name);
        let type_name = match geometry {
            Geometry::Box { .. } => "Cube",
            Geometry::Cylinder { .. } => "Cylinder",
            Geometry::Sphere { .. } => "Sphere",
            Geometry::Mesh { .. } => "Mesh",
        };
        let spec = layer.define_prim(&path, type_name);
        set_display_name(spec, name);

        match geometry {
            Geometry::Box { size } => {
                spec.set("size", Value::Double(1.0));
                set_local_transform(spec, origin, Some(size));
            }
            Geometry::Cylinder { radius, length } => {
                spec.set("radius", Value::Double(*radius));
                spec.set("height", Value::Double(*length));
                spec.set_uniform("axis", Value::token("Z"));
                set_local_transform(spec, origin, None);
            }
            Geometry::Sphere { radius } => {
                spec.set("radius", Value::Double(*radius));
                set_local_transform(spec, origin, None);
            }
            Geometry::Mesh { scale, .. } => {
                if let Some(index) = library_mesh {
                    spec.references.push(Reference::new(
                        asset_paths::GEOMETRY_LIBRARY,
                        Some(library.entry(index).prim.clone()),
                    ));
                }
                set_local_transform(spec, origin, Some(scale));
            }
        }

        Some((path, library_mesh))
    }
}
