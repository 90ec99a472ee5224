//! Wavefront OBJ mesh decoder
//!
//! Loads .obj files with support for:
//! - Positions, normals, UVs
//! - Polygons of any arity (triangulated later)
//! - `.mtl` materials with diffuse colors and diffuse textures

use std::path::Path;
use tracing::debug;

use super::{read_error, Corner, MeshDecoder, MeshMaterial, RawFace, RawMesh};
use crate::error::MeshDecodeError;

pub struct ObjDecoder;

impl MeshDecoder for ObjDecoder {
    fn extensions(&self) -> &'static [&'static str] {
        &["obj"]
    }

    fn decode(&self, path: &Path) -> Result<RawMesh, MeshDecodeError> {
        load_obj(path)
    }
}

/// Load an OBJ file
pub fn load_obj(path: &Path) -> Result<RawMesh, MeshDecodeError> {
    debug!("Loading OBJ file: {}", path.display());

    // Keep polygons intact; fan triangulation happens during normalization
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: false,
            ignore_points: true,
            ignore_lines: true,
        },
    )
    .map_err(|e| match e {
        tobj::LoadError::OpenFileFailed | tobj::LoadError::ReadError => read_error(path, e),
        other => MeshDecodeError::corrupt(path, format!("OBJ parsing error: {}", other)),
    })?;

    let mut raw = RawMesh::default();

    match materials {
        Ok(materials) => {
            for material in &materials {
                raw.materials.push(convert_material(path, material, &mut raw.missing_textures));
            }
        }
        Err(e) => debug!("No usable materials for {}: {}", path.display(), e),
    }

    debug!("OBJ file contains {} models", models.len());

    for model in &models {
        let mesh = &model.mesh;
        let offset = raw.positions.len();
        let has_normals = !mesh.normals.is_empty();
        let has_uvs = !mesh.texcoords.is_empty();

        raw.positions
            .extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        if has_normals {
            raw.normals
                .extend(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]));
        }
        if has_uvs {
            raw.uvs
                .extend(mesh.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]));
        }

        let corner = |index: u32| {
            let i = offset + index as usize;
            Corner::new(i, has_normals.then_some(i), has_uvs.then_some(i))
        };
        let material = mesh.material_id.filter(|id| *id < raw.materials.len());

        if mesh.face_arities.is_empty() {
            for triangle in mesh.indices.chunks(3) {
                raw.faces.push(RawFace {
                    corners: triangle.iter().map(|i| corner(*i)).collect(),
                    material,
                });
            }
        } else {
            let mut start = 0usize;
            for arity in &mesh.face_arities {
                let end = start + *arity as usize;
                let indices = mesh.indices.get(start..end).ok_or_else(|| {
                    MeshDecodeError::corrupt(path, "face arity exceeds index count")
                })?;
                raw.faces.push(RawFace {
                    corners: indices.iter().map(|i| corner(*i)).collect(),
                    material,
                });
                start = end;
            }
        }
    }

    Ok(raw)
}

/// Convert an MTL material, resolving its diffuse texture next to the OBJ file
fn convert_material(
    obj_path: &Path,
    material: &tobj::Material,
    missing_textures: &mut Vec<String>,
) -> MeshMaterial {
    let obj_dir = obj_path.parent().unwrap_or(Path::new("."));

    let texture = material
        .diffuse_texture
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|name| {
            let candidate = obj_dir.join(name);
            if candidate.is_file() {
                Some(candidate)
            } else {
                missing_textures.push(name.to_string());
                None
            }
        });

    MeshMaterial {
        name: material.name.clone(),
        diffuse: material.diffuse,
        opacity: material.dissolve.filter(|d| *d < 1.0),
        texture,
    }
}
