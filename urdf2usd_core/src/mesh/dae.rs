//! COLLADA (.dae) mesh decoder
//!
//! Geometry comes from the `collada` crate. It does not expose the asset
//! header, the visual scene or the effect library, so a second `roxmltree`
//! pass reads the unit, the node transforms of every geometry instance and
//! the diffuse color or texture behind each material symbol.

use nalgebra::{Matrix3, Matrix4, Point3, Unit, Vector3};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{read_error, Corner, MeshDecoder, MeshMaterial, RawFace, RawMesh};
use crate::error::MeshDecodeError;

/// `<instance_node>` chains deeper than this are treated as cycles
const MAX_NODE_DEPTH: usize = 64;

pub struct DaeDecoder;

impl MeshDecoder for DaeDecoder {
    fn extensions(&self) -> &'static [&'static str] {
        &["dae"]
    }

    fn decode(&self, path: &Path) -> Result<RawMesh, MeshDecodeError> {
        load_collada(path)
    }
}

/// Document-level data the geometry crate does not expose
#[derive(Debug)]
struct AssetInfo {
    meter: f64,
    /// Geometry id and accumulated node transform, one per scene instance
    instances: Vec<(String, Matrix4<f64>)>,
    /// Material symbol (or id) to appearance
    materials: HashMap<String, MeshMaterial>,
    missing_textures: Vec<String>,
}

/// Load a COLLADA file
pub fn load_collada(path: &Path) -> Result<RawMesh, MeshDecodeError> {
    debug!("Loading COLLADA file: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| read_error(path, e))?;

    let document = collada::document::ColladaDocument::from_str(&content).map_err(|e| {
        MeshDecodeError::corrupt(path, format!("COLLADA XML parsing error: {}", e))
    })?;
    let obj_set = document.get_obj_set().ok_or_else(|| {
        MeshDecodeError::corrupt(path, "failed to extract geometry from COLLADA document")
    })?;

    let info = read_asset_info(path, &content)?;
    debug!(
        "COLLADA file contains {} objects, {} scene instances (unit {} m)",
        obj_set.objects.len(),
        info.instances.len(),
        info.meter
    );

    let mut raw = RawMesh {
        missing_textures: info.missing_textures.clone(),
        ..RawMesh::default()
    };
    let mut material_slots: HashMap<String, usize> = HashMap::new();
    let unit = Matrix4::new_scaling(info.meter);

    if info.instances.is_empty() {
        for object in &obj_set.objects {
            append_object(path, &mut raw, object, &unit, &info, &mut material_slots);
        }
    } else {
        let objects: HashMap<&str, &collada::Object> = obj_set
            .objects
            .iter()
            .map(|o| (o.id.as_str(), o))
            .collect();
        for (geometry, transform) in &info.instances {
            match objects.get(geometry.as_str()) {
                Some(object) => append_object(
                    path,
                    &mut raw,
                    object,
                    &(unit * transform),
                    &info,
                    &mut material_slots,
                ),
                None => debug!("No mesh data for instanced geometry '{}'", geometry),
            }
        }
    }

    Ok(raw)
}

/// Append one geometry with `transform` baked into its vertices
fn append_object(
    path: &Path,
    raw: &mut RawMesh,
    object: &collada::Object,
    transform: &Matrix4<f64>,
    info: &AssetInfo,
    material_slots: &mut HashMap<String, usize>,
) {
    let position_offset = raw.positions.len();
    let normal_offset = raw.normals.len();
    let uv_offset = raw.uvs.len();

    let linear: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    let normal_matrix = linear
        .try_inverse()
        .map(|inverse| inverse.transpose())
        .unwrap_or(linear);

    raw.positions.extend(object.vertices.iter().map(|v| {
        let p = transform.transform_point(&Point3::new(v.x, v.y, v.z));
        [p.x as f32, p.y as f32, p.z as f32]
    }));
    raw.normals.extend(object.normals.iter().map(|n| {
        let rotated = normal_matrix * Vector3::new(n.x, n.y, n.z);
        let unit = rotated.try_normalize(f64::EPSILON).unwrap_or(rotated);
        [unit.x as f32, unit.y as f32, unit.z as f32]
    }));
    raw.uvs
        .extend(object.tex_vertices.iter().map(|t| [t.x as f32, t.y as f32]));

    let corner = |v: usize, t: Option<usize>, n: Option<usize>| {
        Corner::new(
            position_offset + v,
            n.map(|n| normal_offset + n),
            t.map(|t| uv_offset + t),
        )
    };

    for geometry in &object.geometry {
        for element in &geometry.mesh {
            match element {
                collada::PrimitiveElement::Triangles(triangles) => {
                    let material = material_slot(
                        triangles.material.as_deref(),
                        info,
                        &mut raw.materials,
                        material_slots,
                    );
                    for (i, &(a, b, c)) in triangles.vertices.iter().enumerate() {
                        let uv = triangles.tex_vertices.as_ref().and_then(|t| t.get(i));
                        let normal = triangles.normals.as_ref().and_then(|n| n.get(i));
                        raw.faces.push(RawFace {
                            corners: vec![
                                corner(a, uv.map(|t| t.0), normal.map(|n| n.0)),
                                corner(b, uv.map(|t| t.1), normal.map(|n| n.1)),
                                corner(c, uv.map(|t| t.2), normal.map(|n| n.2)),
                            ],
                            material,
                        });
                    }
                }
                collada::PrimitiveElement::Polylist(polylist) => {
                    let material = material_slot(
                        polylist.material.as_deref(),
                        info,
                        &mut raw.materials,
                        material_slots,
                    );
                    for shape in &polylist.shapes {
                        match shape {
                            collada::Shape::Triangle(a, b, c) => raw.faces.push(RawFace {
                                corners: [a, b, c]
                                    .iter()
                                    .map(|&&(v, t, n)| corner(v, t, n))
                                    .collect(),
                                material,
                            }),
                            _ => debug!("Skipping point/line primitive in {}", path.display()),
                        }
                    }
                }
                #[allow(unreachable_patterns)]
                _ => debug!("Skipping unsupported COLLADA primitive"),
            }
        }
    }
}

/// Geometry instances of the active visual scene
///
/// The active scene is the one `<scene><instance_visual_scene>` points at,
/// else the first one in the library.
fn scene_instances(root: Node) -> Vec<(String, Matrix4<f64>)> {
    let scenes: Vec<Node> = root
        .descendants()
        .filter(|n| n.has_tag_name("visual_scene"))
        .collect();
    let active = child(root, "scene")
        .and_then(|s| child(s, "instance_visual_scene"))
        .and_then(|i| i.attribute("url"))
        .map(|url| url.trim_start_matches('#'))
        .and_then(|id| scenes.iter().find(|s| s.attribute("id") == Some(id)))
        .or(scenes.first());

    let library: HashMap<&str, Node> = root
        .descendants()
        .filter(|n| n.has_tag_name("node"))
        .filter_map(|n| n.attribute("id").map(|id| (id, n)))
        .collect();

    let mut instances = Vec::new();
    if let Some(scene) = active {
        for node in scene.children().filter(|n| n.has_tag_name("node")) {
            walk_node(node, &Matrix4::identity(), &library, 0, &mut instances);
        }
    }
    instances
}

fn walk_node(
    node: Node,
    parent: &Matrix4<f64>,
    library: &HashMap<&str, Node>,
    depth: usize,
    instances: &mut Vec<(String, Matrix4<f64>)>,
) {
    if depth > MAX_NODE_DEPTH {
        debug!("Node nesting deeper than {}, skipping", MAX_NODE_DEPTH);
        return;
    }

    let transform = parent * node_transform(node);
    for element in node.children().filter(|n| n.is_element()) {
        match element.tag_name().name() {
            "instance_geometry" => {
                if let Some(url) = element.attribute("url") {
                    instances.push((url.trim_start_matches('#').to_string(), transform));
                }
            }
            "instance_node" => {
                let target = element
                    .attribute("url")
                    .map(|url| url.trim_start_matches('#'))
                    .and_then(|id| library.get(id));
                if let Some(target) = target {
                    walk_node(*target, &transform, library, depth + 1, instances);
                }
            }
            "node" => walk_node(element, &transform, library, depth + 1, instances),
            _ => {}
        }
    }
}

/// Product of a node's transform elements in document order
fn node_transform(node: Node) -> Matrix4<f64> {
    let mut transform = Matrix4::identity();
    for element in node.children().filter(|n| n.is_element()) {
        let values: Vec<f64> = element
            .text()
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|v| v.parse().ok())
            .collect();
        let step = match (element.tag_name().name(), values.as_slice()) {
            // row-major in the file
            ("matrix", v) if v.len() == 16 => Matrix4::from_row_slice(v),
            ("translate", &[x, y, z]) => Matrix4::new_translation(&Vector3::new(x, y, z)),
            ("rotate", &[x, y, z, degrees]) => {
                match Unit::try_new(Vector3::new(x, y, z), f64::EPSILON) {
                    Some(axis) => Matrix4::from_axis_angle(&axis, degrees.to_radians()),
                    None => continue,
                }
            }
            ("scale", &[x, y, z]) => Matrix4::new_nonuniform_scaling(&Vector3::new(x, y, z)),
            _ => continue,
        };
        transform *= step;
    }
    transform
}

/// Index of the material group for a primitive's material symbol
fn material_slot(
    symbol: Option<&str>,
    info: &AssetInfo,
    materials: &mut Vec<MeshMaterial>,
    slots: &mut HashMap<String, usize>,
) -> Option<usize> {
    let symbol = symbol?;
    if let Some(slot) = slots.get(symbol) {
        return Some(*slot);
    }
    let material = info
        .materials
        .get(symbol)
        .cloned()
        .unwrap_or_else(|| MeshMaterial::named(symbol));
    materials.push(material);
    slots.insert(symbol.to_string(), materials.len() - 1);
    Some(materials.len() - 1)
}

fn read_asset_info(path: &Path, content: &str) -> Result<AssetInfo, MeshDecodeError> {
    let doc = Document::parse(content.trim_start())
        .map_err(|e| MeshDecodeError::corrupt(path, format!("COLLADA XML parsing error: {}", e)))?;
    let root = doc.root_element();

    let asset = child(root, "asset");
    let meter = asset
        .and_then(|a| child(a, "unit"))
        .and_then(|u| u.attribute("meter"))
        .and_then(|m| m.trim().parse::<f64>().ok())
        .filter(|m| *m > 0.0)
        .unwrap_or(1.0);

    let base_dir = path.parent().unwrap_or(Path::new("."));
    let images = image_paths(root);
    let effects = effect_appearances(root);

    let mut materials = HashMap::new();
    let mut missing_textures = Vec::new();
    for material in root
        .descendants()
        .filter(|n| n.has_tag_name("material") && n.parent().is_some_and(|p| p.has_tag_name("library_materials")))
    {
        let Some(id) = material.attribute("id") else {
            continue;
        };
        let effect = child(material, "instance_effect")
            .and_then(|e| e.attribute("url"))
            .map(|url| url.trim_start_matches('#'))
            .and_then(|effect_id| effects.get(effect_id));

        let mut converted = MeshMaterial::named(material.attribute("name").unwrap_or(id));
        if let Some(effect) = effect {
            converted.diffuse = effect.color.map(|c| [c[0], c[1], c[2]]);
            converted.opacity = effect.color.map(|c| c[3]).filter(|a| *a < 1.0);
            if let Some(image) = effect.image.as_deref() {
                let reference = images.get(image).map(String::as_str).unwrap_or(image);
                match texture_path(base_dir, reference) {
                    Some(found) => converted.texture = Some(found),
                    None => missing_textures.push(reference.to_string()),
                }
            }
        }
        materials.insert(id.to_string(), converted);
    }

    // Primitives name a symbol that instance_material binds to a material id
    for binding in root.descendants().filter(|n| n.has_tag_name("instance_material")) {
        let (Some(symbol), Some(target)) = (binding.attribute("symbol"), binding.attribute("target"))
        else {
            continue;
        };
        if let Some(material) = materials.get(target.trim_start_matches('#')).cloned() {
            materials.entry(symbol.to_string()).or_insert(material);
        }
    }

    Ok(AssetInfo {
        meter,
        instances: scene_instances(root),
        materials,
        missing_textures,
    })
}

#[derive(Debug, Default)]
struct EffectAppearance {
    color: Option<[f32; 4]>,
    /// Image id (or file name when the sampler chain is absent)
    image: Option<String>,
}

fn effect_appearances(root: Node) -> HashMap<String, EffectAppearance> {
    let mut effects = HashMap::new();
    for effect in root.descendants().filter(|n| n.has_tag_name("effect")) {
        let Some(id) = effect.attribute("id") else {
            continue;
        };
        let mut appearance = EffectAppearance::default();
        if let Some(diffuse) = effect.descendants().find(|n| n.has_tag_name("diffuse")) {
            if let Some(color) = child(diffuse, "color").and_then(|c| c.text()) {
                let values: Vec<f32> = color
                    .split_whitespace()
                    .filter_map(|s| s.parse().ok())
                    .collect();
                if values.len() >= 3 {
                    appearance.color = Some([
                        values[0],
                        values[1],
                        values[2],
                        values.get(3).copied().unwrap_or(1.0),
                    ]);
                }
            }
            if let Some(sampler) = child(diffuse, "texture").and_then(|t| t.attribute("texture")) {
                appearance.image = Some(sampler_image(effect, sampler));
            }
        }
        effects.insert(id.to_string(), appearance);
    }
    effects
}

/// Follow sampler2D -> surface -> init_from inside an effect
fn sampler_image(effect: Node, sampler: &str) -> String {
    let newparam = |sid: &str| {
        effect
            .descendants()
            .find(|n| n.has_tag_name("newparam") && n.attribute("sid") == Some(sid))
    };

    let Some(sampler_param) = newparam(sampler) else {
        return sampler.to_string();
    };
    let sampler2d = child(sampler_param, "sampler2D");

    // COLLADA 1.5 points at the image directly
    if let Some(url) = sampler2d
        .and_then(|s| child(s, "instance_image"))
        .and_then(|i| i.attribute("url"))
    {
        return url.trim_start_matches('#').to_string();
    }

    let surface = sampler2d
        .and_then(|s| child(s, "source"))
        .and_then(|s| s.text())
        .map(str::trim)
        .and_then(newparam)
        .and_then(|p| child(p, "surface"))
        .and_then(|s| child(s, "init_from"))
        .and_then(|i| i.text())
        .map(str::trim);

    surface.unwrap_or(sampler).to_string()
}

fn image_paths(root: Node) -> HashMap<String, String> {
    let mut images = HashMap::new();
    for image in root.descendants().filter(|n| n.has_tag_name("image")) {
        let Some(id) = image.attribute("id") else {
            continue;
        };
        let init_from = child(image, "init_from");
        // 1.5 nests the path in <ref>
        let file = init_from
            .and_then(|i| child(i, "ref"))
            .or(init_from)
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(file) = file {
            images.insert(id.to_string(), file.to_string());
        }
    }
    images
}

fn texture_path(base_dir: &Path, reference: &str) -> Option<PathBuf> {
    let stripped = reference.strip_prefix("file://").unwrap_or(reference);
    let path = Path::new(stripped);
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    candidate.is_file().then_some(candidate)
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}
