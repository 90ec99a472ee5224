//! Asset composer
//!
//! Maps a validated [`RobotModel`] onto a layered, self-contained asset:
//!
//! ```text
//! <name>/<name>.usda                    composition layer, single entry point
//! <name>/Payload/Contents.usda          sublayers the three content layers
//! <name>/Payload/Geometry.usda          link hierarchy and gprims
//! <name>/Payload/Materials.usda         materials and bindings
//! <name>/Payload/Physics.usda           rigid bodies, mass and joints
//! <name>/Resources/GeometryLibrary.usda mesh data, one prim per distinct mesh
//! <name>/Resources/Textures/            copied texture files
//! ```
//!
//! Content layers hold data in the description's own convention (Z up,
//! meters). The composition layer converts to the requested stage convention
//! with a single transform on the robot prim.

pub mod geometry;
pub mod materials;
pub mod physics;

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ConversionOptions, UpAxis};
use crate::error::{AssetWriteError, Warning};
use crate::kinematics::KinematicTree;
use crate::mesh::NormalizedMesh;
use crate::model::{CustomData, CustomElement, RobotModel};
use crate::usd::{
    sanitize_identifier, Layer, LayerMetadata, NameCache, PrimPath, PrimSpec, Reference, Value,
};

use geometry::{AuthoredCollision, GeometryAuthoring, MeshLibrary};
use materials::TextureStore;

pub const PAYLOAD_DIR: &str = "Payload";
pub const RESOURCES_DIR: &str = "Resources";
pub const TEXTURES_DIR: &str = "Textures";

/// Decoded meshes by resolved path
pub type MeshMap = HashMap<PathBuf, Arc<NormalizedMesh>>;

/// File locations of one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    pub root_dir: PathBuf,
    pub asset: PathBuf,
    pub contents: PathBuf,
    pub geometry: PathBuf,
    pub materials: PathBuf,
    pub physics: PathBuf,
    pub geometry_library: PathBuf,
    pub textures_dir: PathBuf,
}

impl AssetLayout {
    pub fn new(destination: &Path, name: &str) -> Self {
        let root_dir = destination.join(name);
        let payload = root_dir.join(PAYLOAD_DIR);
        let resources = root_dir.join(RESOURCES_DIR);
        Self {
            asset: root_dir.join(format!("{}.usda", name)),
            contents: payload.join("Contents.usda"),
            geometry: payload.join("Geometry.usda"),
            materials: payload.join("Materials.usda"),
            physics: payload.join("Physics.usda"),
            geometry_library: resources.join("GeometryLibrary.usda"),
            textures_dir: resources.join(TEXTURES_DIR),
            root_dir,
        }
    }
}

/// Asset paths as written inside the layers, relative to the layer itself
pub(crate) mod asset_paths {
    pub const CONTENTS: &str = "./Payload/Contents.usda";
    pub const GEOMETRY: &str = "./Geometry.usda";
    pub const MATERIALS: &str = "./Materials.usda";
    pub const PHYSICS: &str = "./Physics.usda";
    pub const GEOMETRY_LIBRARY: &str = "../Resources/GeometryLibrary.usda";
    pub const TEXTURES: &str = "../Resources/Textures";
}

/// Result of a successful composition
#[derive(Debug, Clone)]
pub struct ComposedAsset {
    pub asset_path: PathBuf,
    pub meshes_authored: usize,
    pub textures_copied: usize,
    pub warnings: Vec<Warning>,
}

/// Prim paths shared by every layer of one composition
pub(crate) struct ScenePaths {
    pub robot: PrimPath,
    pub geometry_root: PrimPath,
    /// Link prim path by link index
    pub links: Vec<PrimPath>,
    pub collisions: Vec<AuthoredCollision>,
}

/// Authors one robot model into a layered asset
pub struct AssetComposer<'a> {
    options: &'a ConversionOptions,
    model: &'a RobotModel,
    tree: &'a KinematicTree,
    meshes: &'a MeshMap,
}

impl<'a> AssetComposer<'a> {
    pub fn new(
        options: &'a ConversionOptions,
        model: &'a RobotModel,
        tree: &'a KinematicTree,
        meshes: &'a MeshMap,
    ) -> Self {
        Self {
            options,
            model,
            tree,
            meshes,
        }
    }

    /// Author every layer below `destination/name` and copy resources
    pub fn compose(&self, destination: &Path, name: &str) -> Result<ComposedAsset, AssetWriteError> {
        let layout = AssetLayout::new(destination, name);
        info!("Composing asset {}", layout.asset.display());

        let mut names = NameCache::new();
        let robot = names.child(&PrimPath::root(), self.model.name());
        let geometry_root = names.child(&robot, "Geometry");

        let mut library = MeshLibrary::new(self.library_metadata());
        let authored = GeometryAuthoring::new(self.model, self.tree, self.meshes, &mut names)
            .author(&robot, &geometry_root, &mut library);
        let scene = ScenePaths {
            robot: robot.clone(),
            geometry_root,
            links: authored.link_paths.clone(),
            collisions: authored.collisions.clone(),
        };

        let mut textures = TextureStore::new();
        let materials_layer = materials::author(
            self.model,
            &scene,
            &authored.visuals,
            &library,
            &mut names,
            &mut textures,
        );
        let mut warnings = Vec::new();
        let physics_layer = physics::author(
            self.model,
            self.tree,
            &scene,
            self.options.meters_per_unit,
            &mut names,
            &mut warnings,
        );

        let mut geometry_layer = authored.layer;
        let mut materials_layer = materials_layer;
        let mut physics_layer = physics_layer;
        for layer in [&mut geometry_layer, &mut materials_layer, &mut physics_layer] {
            layer.metadata = self.content_metadata(&robot);
        }

        let mut contents = Layer::new();
        contents.metadata = self.content_metadata(&robot);
        contents.metadata.sublayers = vec![
            asset_paths::PHYSICS.to_string(),
            asset_paths::MATERIALS.to_string(),
            asset_paths::GEOMETRY.to_string(),
        ];

        let root_layer = self.root_layer(&robot, &mut names);

        geometry_layer.save(&layout.geometry)?;
        materials_layer.save(&layout.materials)?;
        physics_layer.save(&layout.physics)?;
        contents.save(&layout.contents)?;
        if !library.is_empty() {
            library.layer().save(&layout.geometry_library)?;
        }
        let textures_copied = textures.copy_into(&layout.textures_dir)?;
        root_layer.save(&layout.asset)?;

        debug!(
            "Authored {} library meshes and {} textures",
            library.len(),
            textures_copied
        );
        Ok(ComposedAsset {
            asset_path: layout.asset,
            meshes_authored: library.len(),
            textures_copied,
            warnings,
        })
    }

    fn comment(&self) -> Option<String> {
        self.options.comment.clone()
    }

    fn authoring_data(&self) -> Vec<(String, String)> {
        vec![(
            "creator".to_string(),
            format!("urdf2usd v{}", crate::VERSION),
        )]
    }

    /// Metadata of the payload layers: the description's own convention
    fn content_metadata(&self, robot: &PrimPath) -> LayerMetadata {
        LayerMetadata {
            default_prim: Some(robot.name().to_string()),
            up_axis: Some(UpAxis::Z.as_token().to_string()),
            meters_per_unit: Some(1.0),
            kilograms_per_unit: Some(1.0),
            doc: self.comment(),
            sublayers: Vec::new(),
            custom_data: self.authoring_data(),
        }
    }

    fn library_metadata(&self) -> LayerMetadata {
        LayerMetadata {
            default_prim: Some(geometry::LIBRARY_ROOT.to_string()),
            ..self.content_metadata(&PrimPath::root())
        }
    }

    fn root_layer(&self, robot: &PrimPath, names: &mut NameCache) -> Layer {
        let mut layer = Layer::new();
        layer.metadata = LayerMetadata {
            default_prim: Some(robot.name().to_string()),
            up_axis: Some(self.options.up_axis.as_token().to_string()),
            meters_per_unit: Some(self.options.meters_per_unit),
            kilograms_per_unit: Some(1.0),
            doc: self.comment(),
            sublayers: Vec::new(),
            custom_data: self.authoring_data(),
        };

        {
            let spec = layer.define_prim(robot, "Xform");
            spec.kind = Some("component".to_string());
            spec.payloads
                .push(Reference::new(asset_paths::CONTENTS, None));
            set_display_name(spec, self.model.name());
            apply_stage_conversion(spec, self.options.up_axis, self.options.meters_per_unit);
        }

        if self.options.physics_scene {
            let scene = names.child(&PrimPath::root(), "PhysicsScene");
            let (direction, magnitude) = gravity(self.options.up_axis, self.options.meters_per_unit);
            let spec = layer.define_prim(&scene, "PhysicsScene");
            spec.set("physics:gravityDirection", Value::Vector3f(direction));
            spec.set("physics:gravityMagnitude", Value::Float(magnitude));
        }
        layer
    }
}

/// Rotation from Z up into the stage up axis, then the unit scale
pub fn stage_conversion(up_axis: UpAxis, meters_per_unit: f64) -> (UnitQuaternion<f64>, f64) {
    let rotation = match up_axis {
        UpAxis::Z => UnitQuaternion::identity(),
        UpAxis::Y => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2),
    };
    (rotation, 1.0 / meters_per_unit)
}

fn apply_stage_conversion(spec: &mut PrimSpec, up_axis: UpAxis, meters_per_unit: f64) {
    let (rotation, scale) = stage_conversion(up_axis, meters_per_unit);
    let mut order = Vec::new();
    if up_axis == UpAxis::Y {
        spec.set("xformOp:orient", Value::Quatf(quatf(&rotation)));
        order.push("xformOp:orient".to_string());
    }
    if scale != 1.0 {
        let s = scale as f32;
        spec.set("xformOp:scale", Value::Float3([s, s, s]));
        order.push("xformOp:scale".to_string());
    }
    if !order.is_empty() {
        spec.set_uniform("xformOpOrder", Value::TokenArray(order));
    }
}

fn gravity(up_axis: UpAxis, meters_per_unit: f64) -> ([f32; 3], f32) {
    let direction = match up_axis {
        UpAxis::Z => [0.0, 0.0, -1.0],
        UpAxis::Y => [0.0, -1.0, 0.0],
    };
    (direction, (9.81 / meters_per_unit) as f32)
}

/// Author translate/orient/scale ops for a local transform
pub(crate) fn set_local_transform(
    spec: &mut PrimSpec,
    transform: &Isometry3<f64>,
    scale: Option<&Vector3<f64>>,
) {
    let t = transform.translation.vector;
    spec.set("xformOp:translate", Value::Double3([t.x, t.y, t.z]));
    spec.set("xformOp:orient", Value::Quatf(quatf(&transform.rotation)));
    let mut order = vec!["xformOp:translate".to_string(), "xformOp:orient".to_string()];
    if let Some(scale) = scale.filter(|s| **s != Vector3::repeat(1.0)) {
        spec.set("xformOp:scale", Value::Float3(float3(scale)));
        order.push("xformOp:scale".to_string());
    }
    spec.set_uniform("xformOpOrder", Value::TokenArray(order));
}

/// Keep the authored name when the prim name had to change
pub(crate) fn set_display_name(spec: &mut PrimSpec, authored: &str) {
    if spec.name != authored {
        spec.display_name = Some(authored.to_string());
    }
}

/// Author description data the converter does not interpret onto `prim`
///
/// Attributes become `custom string urdf:<name>` on the prim itself and every
/// element becomes a nested `Scope` carrying its own attributes and text.
pub(crate) fn author_custom_data(
    layer: &mut Layer,
    names: &mut NameCache,
    prim: &PrimPath,
    data: &CustomData,
) {
    if data.is_empty() {
        return;
    }
    set_custom_strings(layer.override_prim(prim), &data.attributes, None);
    for element in &data.elements {
        author_custom_element(layer, names, prim, element);
    }
}

fn author_custom_element(
    layer: &mut Layer,
    names: &mut NameCache,
    parent: &PrimPath,
    element: &CustomElement,
) {
    let path = names.child(parent, &element.tag);
    let spec = layer.define_prim(&path, "Scope");
    set_display_name(spec, &element.tag);
    set_custom_strings(spec, &element.attributes, element.text.as_deref());
    for child in &element.children {
        author_custom_element(layer, names, &path, child);
    }
}

fn set_custom_strings(spec: &mut PrimSpec, attributes: &[(String, String)], text: Option<&str>) {
    for (key, value) in attributes {
        let name = format!("urdf:{}", sanitize_identifier(key));
        spec.set_custom(&name, Value::String(value.clone()));
    }
    if let Some(text) = text {
        spec.set_custom("urdf:text", Value::String(text.to_string()));
    }
}

pub(crate) fn quatf(rotation: &UnitQuaternion<f64>) -> [f32; 4] {
    [
        rotation.w as f32,
        rotation.i as f32,
        rotation.j as f32,
        rotation.k as f32,
    ]
}

pub(crate) fn float3(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}
