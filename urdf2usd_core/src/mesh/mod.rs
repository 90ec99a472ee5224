//! Mesh decoding and normalization
//!
//! Per-format decoders (OBJ via `tobj`, STL via `stl_io`, COLLADA via
//! `collada`) hand back a [`RawMesh`]; [`processing::normalize`] turns it into
//! the canonical [`NormalizedMesh`] used by the composer.

pub mod cache;
pub mod dae;
pub mod obj;
pub mod processing;
pub mod stl;

use std::path::{Path, PathBuf};

use crate::error::MeshDecodeError;

pub use cache::{MeshCache, MeshCacheStats};
pub use processing::{normalize, Aabb};

/// One corner of a decoded polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub position: usize,
    pub normal: Option<usize>,
    pub uv: Option<usize>,
}

impl Corner {
    pub fn new(position: usize, normal: Option<usize>, uv: Option<usize>) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A decoded polygon with its material group
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    pub corners: Vec<Corner>,
    /// Index into [`RawMesh::materials`]
    pub material: Option<usize>,
}

/// Appearance attached to a material group of a mesh file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshMaterial {
    pub name: String,
    pub diffuse: Option<[f32; 3]>,
    pub opacity: Option<f32>,
    /// Existing texture file on disk
    pub texture: Option<PathBuf>,
}

impl MeshMaterial {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// False for the placeholder material assigned to ungrouped faces
    pub fn has_appearance(&self) -> bool {
        self.diffuse.is_some() || self.texture.is_some()
    }
}

/// Decoder output, before triangulation and welding
#[derive(Debug, Clone, Default)]
pub struct RawMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub faces: Vec<RawFace>,
    pub materials: Vec<MeshMaterial>,
    /// Texture references of the file that could not be found
    pub missing_textures: Vec<String>,
}

/// Canonical triangulated mesh
///
/// `normals` and `uvs`, when present, are parallel to `positions`.
/// `face_materials` holds one index into `materials` per triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub triangles: Vec<[u32; 3]>,
    pub face_materials: Vec<u32>,
    pub materials: Vec<MeshMaterial>,
    pub bounds: Aabb,
    pub missing_textures: Vec<String>,
}

impl NormalizedMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Triangle indices grouped by material, in material order
    pub fn material_groups(&self) -> Vec<Vec<u32>> {
        let mut groups = vec![Vec::new(); self.materials.len()];
        for (face, material) in self.face_materials.iter().enumerate() {
            groups[*material as usize].push(face as u32);
        }
        groups
    }
}

/// A per-format mesh decoder
pub trait MeshDecoder: Send + Sync {
    /// Lower-case file extensions handled by this decoder
    fn extensions(&self) -> &'static [&'static str];

    fn decode(&self, path: &Path) -> Result<RawMesh, MeshDecodeError>;
}

static DECODERS: [&dyn MeshDecoder; 3] = [&obj::ObjDecoder, &stl::StlDecoder, &dae::DaeDecoder];

/// Pick the decoder for a file by its extension
pub fn decoder_for(path: &Path) -> Result<&'static dyn MeshDecoder, MeshDecodeError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    DECODERS
        .iter()
        .copied()
        .find(|decoder| decoder.extensions().contains(&extension.as_str()))
        .ok_or_else(|| {
            MeshDecodeError::unsupported(path, format!("unknown mesh format '.{}'", extension))
        })
}

/// Decode and normalize a mesh file
pub fn load_mesh(path: &Path, weld_epsilon: f32) -> Result<NormalizedMesh, MeshDecodeError> {
    let raw = decoder_for(path)?.decode(path)?;
    normalize(path, raw, weld_epsilon)
}

pub(crate) fn read_error(path: &Path, error: impl std::fmt::Display) -> MeshDecodeError {
    MeshDecodeError::Io {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
