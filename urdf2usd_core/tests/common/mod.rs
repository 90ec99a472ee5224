//! Fixture builders shared by the end-to-end tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Write `contents` to `dir/relative`, creating parent directories
pub fn write_file(dir: &Path, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Binary STL bytes for the given triangles
pub fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for triangle in triangles {
        // facet normal, ignored by the decoder
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

/// A single triangle whose first vertex sits at `(x, 0, 0)`
pub fn triangle_at(x: f32) -> Vec<u8> {
    binary_stl(&[[[x, 0.0, 0.0], [x + 1.0, 0.0, 0.0], [x, 1.0, 0.0]]])
}

pub const TEXTURED_QUAD_OBJ: &str = "\
mtllib panel.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl painted
f 1/1 2/2 3/3 4/4
";

pub const PANEL_MTL: &str = "\
newmtl painted
Kd 0.8 0.2 0.2
map_Kd panel.png
";

/// A robot description with one link per `(name, geometry)` entry, chained by
/// revolute joints in declaration order
pub fn chain_urdf(robot: &str, links: &[(&str, &str)]) -> String {
    let mut xml = format!("<robot name=\"{}\">\n", robot);
    for (name, geometry) in links {
        xml.push_str(&format!("  <link name=\"{}\">\n", name));
        if !geometry.is_empty() {
            xml.push_str(&format!(
                "    <visual><geometry>{}</geometry></visual>\n",
                geometry
            ));
        }
        xml.push_str("  </link>\n");
    }
    for (i, pair) in links.windows(2).enumerate() {
        xml.push_str(&format!(
            "  <joint name=\"joint_{}\" type=\"revolute\">\n\
             \x20   <parent link=\"{}\"/>\n\
             \x20   <child link=\"{}\"/>\n\
             \x20   <origin xyz=\"0 0 0.5\"/>\n\
             \x20   <axis xyz=\"0 0 1\"/>\n\
             \x20   <limit lower=\"-1.57\" upper=\"1.57\" effort=\"10\" velocity=\"1\"/>\n\
             \x20 </joint>\n",
            i, pair[0].0, pair[1].0
        ));
    }
    xml.push_str("</robot>\n");
    xml
}

pub fn mesh(filename: &str) -> String {
    format!("<mesh filename=\"{}\"/>", filename)
}

/// Number of prim specs (`def` or `over` blocks) in a layer's text
pub fn prim_spec_count(usda: &str) -> usize {
    usda.lines()
        .map(str::trim_start)
        .filter(|line| line.starts_with("def ") || line.starts_with("over "))
        .count()
}

/// Every `@asset@` path in a layer's text
pub fn asset_paths(usda: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = usda;
    while let Some(start) = rest.find('@') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('@') else {
            break;
        };
        paths.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    paths
}

/// Every `.usda` file below `dir`
pub fn layer_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "usda") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}
