//! Materials layer
//!
//! Every description material and every mesh material with appearance data
//! becomes a `UsdPreviewSurface` network below `/<robot>/Looks`. Bindings are
//! authored as overs on the visual prims (or their material subsets).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::geometry::{AuthoredVisual, MeshLibrary};
use super::{asset_paths, author_custom_data, set_display_name, ScenePaths};
use crate::error::AssetWriteError;
use crate::model::RobotModel;
use crate::usd::{Attribute, Layer, NameCache, PrimPath, Property, Value};

const DEFAULT_DIFFUSE: [f32; 3] = [1.0, 1.0, 1.0];

/// Texture files to copy into the asset, with collision-free names
#[derive(Debug, Default)]
pub struct TextureStore {
    files: Vec<(PathBuf, String)>,
    by_source: HashMap<PathBuf, String>,
    taken: HashSet<String>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asset path of the copied texture, relative to the payload layers
    pub fn register(&mut self, source: &Path) -> String {
        if let Some(name) = self.by_source.get(source) {
            return format!("{}/{}", asset_paths::TEXTURES, name);
        }

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "texture".to_string());
        let mut name = file_name.clone();
        let mut suffix = 1;
        while self.taken.contains(&name) {
            let path = Path::new(&file_name);
            let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
            name = match path.extension() {
                Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
                None => format!("{}_{}", stem, suffix),
            };
            suffix += 1;
        }

        self.taken.insert(name.clone());
        self.by_source.insert(source.to_path_buf(), name.clone());
        self.files.push((source.to_path_buf(), name.clone()));
        format!("{}/{}", asset_paths::TEXTURES, name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copy every registered texture into `dir`
    pub fn copy_into(&self, dir: &Path) -> Result<usize, AssetWriteError> {
        if self.files.is_empty() {
            return Ok(0);
        }
        fs::create_dir_all(dir).map_err(|e| AssetWriteError::new(dir, e))?;
        for (source, name) in &self.files {
            let target = dir.join(name);
            debug!("Copying texture {} -> {}", source.display(), target.display());
            fs::copy(source, &target).map_err(|e| AssetWriteError::new(&target, e))?;
        }
        Ok(self.files.len())
    }
}

/// Appearance terms shared by description and mesh materials
struct Appearance<'m> {
    name: &'m str,
    diffuse: Option<[f32; 3]>,
    opacity: Option<f32>,
    texture: Option<&'m Path>,
}

/// Author the materials layer
pub(crate) fn author(
    model: &RobotModel,
    scene: &ScenePaths,
    visuals: &[AuthoredVisual],
    library: &MeshLibrary,
    names: &mut NameCache,
    textures: &mut TextureStore,
) -> Layer {
    let mut layer = Layer::new();
    layer.override_prim(&scene.robot);
    let looks = names.child(&scene.robot, "Looks");
    layer.define_prim(&looks, "Scope");

    let mut description_materials: HashMap<&str, PrimPath> = HashMap::new();
    for material in model.materials() {
        let appearance = Appearance {
            name: &material.name,
            diffuse: material
                .color
                .map(|c| [c[0] as f32, c[1] as f32, c[2] as f32]),
            opacity: material.color.map(|c| c[3] as f32).filter(|a| *a < 1.0),
            texture: material.texture.as_ref().and_then(|t| t.path()),
        };
        let path = define_material(&mut layer, &looks, names, textures, &appearance);
        author_custom_data(&mut layer, names, &path, &material.custom);
        description_materials.insert(&material.name, path);
    }

    // (library index, material slot) -> material prim
    let mut mesh_materials: HashMap<(usize, usize), PrimPath> = HashMap::new();
    for visual in visuals {
        if let Some(material) = visual
            .material
            .as_deref()
            .and_then(|name| description_materials.get(name))
        {
            bind(&mut layer, &visual.path, material);
            continue;
        }

        let Some(index) = visual.library_mesh else {
            continue;
        };
        let entry = library.entry(index);
        let single = entry.mesh.materials.len() == 1;
        for (slot, material) in entry.mesh.materials.iter().enumerate() {
            if !material.has_appearance() {
                continue;
            }
            let target = match entry.subsets.get(slot) {
                Some(Some(subset)) => visual.path.child(subset),
                _ if single => visual.path.clone(),
                _ => continue,
            };
            let material_path = match mesh_materials.get(&(index, slot)) {
                Some(path) => path.clone(),
                None => {
                    let appearance = Appearance {
                        name: &material.name,
                        diffuse: material.diffuse,
                        opacity: material.opacity,
                        texture: material.texture.as_deref(),
                    };
                    let path = define_material(&mut layer, &looks, names, textures, &appearance);
                    mesh_materials.insert((index, slot), path.clone());
                    path
                }
            };
            bind(&mut layer, &target, &material_path);
        }
    }

    layer
}

fn define_material(
    layer: &mut Layer,
    looks: &PrimPath,
    names: &mut NameCache,
    textures: &mut TextureStore,
    appearance: &Appearance,
) -> PrimPath {
    let path = names.child(looks, appearance.name);
    let surface = names.child(&path, "PreviewSurface");
    {
        let spec = layer.define_prim(&path, "Material");
        set_display_name(spec, appearance.name);
        spec.set_property(
            "outputs:surface",
            Property::Attribute(Attribute::connected(
                "token",
                surface.property("outputs:surface"),
            )),
        );
    }

    let texture = appearance.texture.map(|source| {
        let texture = names.child(&path, "DiffuseTexture");
        let reader = names.child(&path, "TexCoordReader");
        let asset = textures.register(source);

        let spec = layer.define_prim(&texture, "Shader");
        spec.set_uniform("info:id", Value::token("UsdUVTexture"));
        spec.set("inputs:file", Value::Asset(asset));
        spec.set_property(
            "inputs:st",
            Property::Attribute(Attribute::connected(
                "float2",
                reader.property("outputs:result"),
            )),
        );
        spec.set("inputs:wrapS", Value::token("repeat"));
        spec.set("inputs:wrapT", Value::token("repeat"));
        spec.set_property("outputs:rgb", Property::Attribute(Attribute::declared("float3")));

        let spec = layer.define_prim(&reader, "Shader");
        spec.set_uniform("info:id", Value::token("UsdPrimvarReader_float2"));
        spec.set("inputs:varname", Value::token("st"));
        spec.set_property("outputs:result", Property::Attribute(Attribute::declared("float2")));
        texture
    });

    let spec = layer.define_prim(&surface, "Shader");
    spec.set_uniform("info:id", Value::token("UsdPreviewSurface"));
    match &texture {
        Some(texture) => {
            spec.set_property(
                "inputs:diffuseColor",
                Property::Attribute(Attribute::connected(
                    "color3f",
                    texture.property("outputs:rgb"),
                )),
            );
        }
        None => {
            spec.set(
                "inputs:diffuseColor",
                Value::Color3f(appearance.diffuse.unwrap_or(DEFAULT_DIFFUSE)),
            );
        }
    }
    if let Some(opacity) = appearance.opacity {
        spec.set("inputs:opacity", Value::Float(opacity));
    }
    spec.set("inputs:roughness", Value::Float(0.5));
    spec.set("inputs:metallic", Value::Float(0.0));
    spec.set_property("outputs:surface", Property::Attribute(Attribute::declared("token")));

    path
}

fn bind(layer: &mut Layer, target: &PrimPath, material: &PrimPath) {
    let spec = layer.override_prim(target);
    spec.apply_api("MaterialBindingAPI");
    spec.set_relationship("material:binding", vec![material.clone()]);
}
