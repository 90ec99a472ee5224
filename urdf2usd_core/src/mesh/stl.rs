//! STL mesh decoder (ASCII and binary)
//!
//! STL carries no UVs or materials. The per-facet normals are dropped since
//! they are frequently zero in exported files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use super::{read_error, Corner, MeshDecoder, RawFace, RawMesh};
use crate::error::MeshDecodeError;

pub struct StlDecoder;

impl MeshDecoder for StlDecoder {
    fn extensions(&self) -> &'static [&'static str] {
        &["stl"]
    }

    fn decode(&self, path: &Path) -> Result<RawMesh, MeshDecodeError> {
        load_stl(path)
    }
}

/// Load an STL file
pub fn load_stl(path: &Path) -> Result<RawMesh, MeshDecodeError> {
    debug!("Loading STL file: {}", path.display());

    let file = File::open(path).map_err(|e| read_error(path, e))?;
    let mut reader = BufReader::new(file);
    let mesh = stl_io::read_stl(&mut reader)
        .map_err(|e| MeshDecodeError::corrupt(path, format!("STL parsing error: {}", e)))?;

    debug!(
        "STL file contains {} vertices, {} facets",
        mesh.vertices.len(),
        mesh.faces.len()
    );

    let positions = mesh.vertices.iter().map(|v| [v[0], v[1], v[2]]).collect();
    let faces = mesh
        .faces
        .iter()
        .map(|face| RawFace {
            corners: face
                .vertices
                .iter()
                .map(|i| Corner::new(*i, None, None))
                .collect(),
            material: None,
        })
        .collect();

    Ok(RawMesh {
        positions,
        faces,
        ..RawMesh::default()
    })
}

/// Encode triangles as a binary STL payload
#[cfg(test)]
pub(crate) fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for triangle in triangles {
        bytes.extend_from_slice(&[0u8; 12]);
        for vertex in triangle {
            for c in vertex {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&[0u8; 2]);
    }
    bytes
}
