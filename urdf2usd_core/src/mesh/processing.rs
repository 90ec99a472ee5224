//! Mesh processing utilities
//!
//! Fan triangulation, vertex welding, bounding boxes and the content digest
//! used to deduplicate authored meshes.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::{Corner, MeshMaterial, NormalizedMesh, RawMesh};
use crate::error::MeshDecodeError;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Calculate axis-aligned bounding box
pub fn calculate_aabb(positions: &[[f32; 3]]) -> Aabb {
    let Some(first) = positions.first() else {
        return Aabb::default();
    };
    let mut min = *first;
    let mut max = *first;

    for pos in positions {
        for axis in 0..3 {
            min[axis] = min[axis].min(pos[axis]);
            max[axis] = max[axis].max(pos[axis]);
        }
    }

    Aabb { min, max }
}

/// Split a polygon into a triangle fan rooted at its first corner
pub fn fan_triangulate<T: Copy>(polygon: &[T]) -> impl Iterator<Item = [T; 3]> + '_ {
    (1..polygon.len().saturating_sub(1)).map(move |i| [polygon[0], polygon[i], polygon[i + 1]])
}

/// Weld key: exact bit patterns at zero tolerance, grid cells otherwise
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexKey {
    position: [i64; 3],
    normal: Option<[i64; 3]>,
    uv: Option<[i64; 2]>,
}

fn quantize(value: f32, epsilon: f32) -> i64 {
    if epsilon > 0.0 {
        (value / epsilon).round() as i64
    } else {
        // -0.0 and 0.0 stay distinct, matching bit-identical welding
        value.to_bits() as i64
    }
}

fn quantize3(v: [f32; 3], epsilon: f32) -> [i64; 3] {
    [
        quantize(v[0], epsilon),
        quantize(v[1], epsilon),
        quantize(v[2], epsilon),
    ]
}

/// Turn decoder output into a [`NormalizedMesh`]
///
/// Polygons are fan-triangulated, identical vertices are welded within
/// `epsilon` and ungrouped faces get a placeholder material.
pub fn normalize(
    path: &Path,
    mut raw: RawMesh,
    epsilon: f32,
) -> Result<NormalizedMesh, MeshDecodeError> {
    if raw.faces.is_empty() {
        return Err(MeshDecodeError::corrupt(path, "mesh contains no faces"));
    }

    // Attributes are kept only when every corner carries them
    let has_normals = raw
        .faces
        .iter()
        .flat_map(|f| &f.corners)
        .all(|c| c.normal.is_some());
    let has_uvs = raw
        .faces
        .iter()
        .flat_map(|f| &f.corners)
        .all(|c| c.uv.is_some());

    let mut materials = std::mem::take(&mut raw.materials);
    let ungrouped = raw
        .faces
        .iter()
        .any(|f| f.material.map_or(true, |m| m >= materials.len()));
    let default_material = if ungrouped {
        materials.push(MeshMaterial::named("default"));
        Some(materials.len() as u32 - 1)
    } else {
        None
    };

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut triangles = Vec::new();
    let mut face_materials = Vec::new();
    let mut welded: HashMap<VertexKey, u32> = HashMap::new();

    for (face_index, face) in raw.faces.iter().enumerate() {
        if face.corners.len() < 3 {
            return Err(MeshDecodeError::corrupt(
                path,
                format!(
                    "face {} has {} corners, at least 3 are required",
                    face_index,
                    face.corners.len()
                ),
            ));
        }

        let mut indices = Vec::with_capacity(face.corners.len());
        for corner in &face.corners {
            let (position, normal, uv) = lookup_corner(path, &raw, corner, has_normals, has_uvs)?;
            let key = VertexKey {
                position: quantize3(position, epsilon),
                normal: normal.map(|n| quantize3(n, epsilon)),
                uv: uv.map(|t| [quantize(t[0], epsilon), quantize(t[1], epsilon)]),
            };
            let index = *welded.entry(key).or_insert_with(|| {
                positions.push(position);
                if let Some(n) = normal {
                    normals.push(n);
                }
                if let Some(t) = uv {
                    uvs.push(t);
                }
                positions.len() as u32 - 1
            });
            indices.push(index);
        }

        let material = match face.material {
            Some(m) if m < materials.len() && default_material != Some(m as u32) => m as u32,
            _ => default_material.unwrap_or(0),
        };
        for triangle in fan_triangulate(&indices) {
            triangles.push(triangle);
            face_materials.push(material);
        }
    }

    debug!(
        "Normalized {}: {} faces -> {} triangles, {} vertices",
        path.display(),
        raw.faces.len(),
        triangles.len(),
        positions.len()
    );

    let bounds = calculate_aabb(&positions);
    Ok(NormalizedMesh {
        positions,
        normals: has_normals.then_some(normals),
        uvs: has_uvs.then_some(uvs),
        triangles,
        face_materials,
        materials,
        bounds,
        missing_textures: raw.missing_textures,
    })
}

type CornerData = ([f32; 3], Option<[f32; 3]>, Option<[f32; 2]>);

fn lookup_corner(
    path: &Path,
    raw: &RawMesh,
    corner: &Corner,
    has_normals: bool,
    has_uvs: bool,
) -> Result<CornerData, MeshDecodeError> {
    let out_of_range = |kind: &str, index: usize, len: usize| {
        MeshDecodeError::corrupt(
            path,
            format!("{} index {} out of range ({} available)", kind, index, len),
        )
    };

    let position = *raw
        .positions
        .get(corner.position)
        .ok_or_else(|| out_of_range("position", corner.position, raw.positions.len()))?;

    let normal = match corner.normal.filter(|_| has_normals) {
        Some(i) => Some(
            *raw.normals
                .get(i)
                .ok_or_else(|| out_of_range("normal", i, raw.normals.len()))?,
        ),
        None => None,
    };

    let uv = match corner.uv.filter(|_| has_uvs) {
        Some(i) => Some(
            *raw.uvs
                .get(i)
                .ok_or_else(|| out_of_range("uv", i, raw.uvs.len()))?,
        ),
        None => None,
    };

    Ok((position, normal, uv))
}

/// SHA-256 over everything that ends up in the authored mesh
pub fn content_digest(mesh: &NormalizedMesh) -> String {
    let mut hasher = Sha256::new();

    hasher.update((mesh.positions.len() as u64).to_le_bytes());
    for p in &mesh.positions {
        for c in p {
            hasher.update(c.to_le_bytes());
        }
    }
    match &mesh.normals {
        Some(normals) => {
            hasher.update([1u8]);
            for n in normals.iter().flatten() {
                hasher.update(n.to_le_bytes());
            }
        }
        None => hasher.update([0u8]),
    }
    match &mesh.uvs {
        Some(uvs) => {
            hasher.update([1u8]);
            for t in uvs.iter().flatten() {
                hasher.update(t.to_le_bytes());
            }
        }
        None => hasher.update([0u8]),
    }
    hasher.update((mesh.triangles.len() as u64).to_le_bytes());
    for (triangle, material) in mesh.triangles.iter().zip(&mesh.face_materials) {
        for i in triangle {
            hasher.update(i.to_le_bytes());
        }
        hasher.update(material.to_le_bytes());
    }
    for material in &mesh.materials {
        hasher.update(material.name.as_bytes());
        hasher.update([0u8]);
        if let Some(diffuse) = material.diffuse {
            for c in diffuse {
                hasher.update(c.to_le_bytes());
            }
        }
        if let Some(opacity) = material.opacity {
            hasher.update(opacity.to_le_bytes());
        }
        if let Some(texture) = &material.texture {
            hasher.update(texture.to_string_lossy().as_bytes());
        }
        hasher.update([0xffu8]);
    }

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
