//! Path resolution for referenced resources
//!
//! Handles the reference forms found in robot descriptions:
//! - package:// (ROS package URIs, explicit mapping first, then an ancestor walk)
//! - file:// (File URIs)
//! - Absolute paths
//! - Relative paths (against the description's directory)
//!
//! The resolver reads the filesystem but keeps no state between calls, so the
//! same reference always resolves to the same path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ResourceNotFound;

const PACKAGE_SCHEME: &str = "package://";
const FILE_SCHEME: &str = "file://";

/// Resolver for resource references of one description file
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    /// Directory containing the description file
    source_dir: PathBuf,
    /// Explicit package name to base directory mappings
    package_mappings: BTreeMap<String, PathBuf>,
}

impl ResourceResolver {
    /// Create a resolver for a description located in `source_dir`
    pub fn new(source_dir: impl AsRef<Path>) -> Self {
        Self {
            source_dir: absolutize(source_dir.as_ref()),
            package_mappings: BTreeMap::new(),
        }
    }

    /// Create with explicit package mappings
    pub fn with_package_mappings(
        source_dir: impl AsRef<Path>,
        mappings: &BTreeMap<String, PathBuf>,
    ) -> Self {
        let mut resolver = Self::new(source_dir);
        for (name, base) in mappings {
            resolver.add_package_mapping(name, base);
        }
        resolver
    }

    /// Map `package://<name>` to a base directory
    pub fn add_package_mapping(&mut self, name: &str, base: impl AsRef<Path>) {
        self.package_mappings
            .insert(name.to_string(), absolutize(base.as_ref()));
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Resolve a reference to an existing file
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, ResourceNotFound> {
        let reference = reference.trim();
        let mut candidates = Vec::new();

        let found = if let Some(stripped) = reference.strip_prefix(PACKAGE_SCHEME) {
            self.resolve_package(stripped, &mut candidates)
        } else {
            let path = Path::new(reference.strip_prefix(FILE_SCHEME).unwrap_or(reference));
            let candidate = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.source_dir.join(path)
            };
            check(candidate, &mut candidates)
        };

        match found {
            Some(path) => {
                debug!("Resolved '{}' -> {}", reference, path.display());
                Ok(path)
            }
            None => Err(ResourceNotFound {
                reference: reference.to_string(),
                candidates,
            }),
        }
    }

    /// Resolve a `package://<name>/<subpath>` reference (without its scheme)
    fn resolve_package(&self, package_path: &str, candidates: &mut Vec<PathBuf>) -> Option<PathBuf> {
        let (package_name, file_path) = package_path.split_once('/')?;
        let file_path = file_path.trim_start_matches('/');
        if package_name.is_empty() || file_path.is_empty() {
            return None;
        }

        // Explicit mapping first
        if let Some(base) = self.package_mappings.get(package_name) {
            if let Some(found) = check(base.join(file_path), candidates) {
                return Some(found);
            }
        }

        // Ancestor walk, nearest directory first
        for ancestor in self.source_dir.ancestors() {
            let candidate = ancestor.join(package_name).join(file_path);
            if let Some(found) = check(candidate, candidates) {
                return Some(found);
            }
        }

        None
    }
}

fn check(candidate: PathBuf, candidates: &mut Vec<PathBuf>) -> Option<PathBuf> {
    if candidate.is_file() {
        Some(candidate)
    } else {
        candidates.push(candidate);
        None
    }
}

/// Absolute form of `path`; the empty path (the parent of a bare file name)
/// is the working directory
fn absolutize(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_absolute_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("mesh.stl");
        touch(&file);

        let resolver = ResourceResolver::new(temp.path().join("robot"));
        let resolved = resolver.resolve(file.to_str().unwrap()).unwrap();
        assert_eq!(resolved, file);
    }

    #[test]
    fn test_file_uri() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("mesh.obj");
        touch(&file);

        let resolver = ResourceResolver::new(temp.path());
        let uri = format!("file://{}", file.display());
        assert_eq!(resolver.resolve(&uri).unwrap(), file);
    }

    #[test]
    fn test_relative_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("urdf/meshes/link.stl");
        touch(&file);

        let resolver = ResourceResolver::new(temp.path().join("urdf"));
        assert_eq!(resolver.resolve("meshes/link.stl").unwrap(), file);
    }

    #[test]
    fn test_package_mapping_wins_over_walk() {
        let temp = TempDir::new().unwrap();
        let mapped = temp.path().join("mapped/textures/body.png");
        let walked = temp.path().join("robot_package/textures/body.png");
        touch(&mapped);
        touch(&walked);

        let mut resolver = ResourceResolver::new(temp.path().join("urdf"));
        resolver.add_package_mapping("robot_package", temp.path().join("mapped"));

        let resolved = resolver
            .resolve("package://robot_package/textures/body.png")
            .unwrap();
        assert_eq!(resolved, mapped);
    }

    #[test]
    fn test_ancestor_walk_prefers_nearest() {
        let temp = TempDir::new().unwrap();
        let far = temp.path().join("robot_package/textures/body.png");
        let near = temp.path().join("ws/robot_package/textures/body.png");
        touch(&far);
        touch(&near);

        let resolver = ResourceResolver::new(temp.path().join("ws/src/description/urdf"));
        let resolved = resolver
            .resolve("package://robot_package/textures/body.png")
            .unwrap();
        assert_eq!(resolved, near);
    }

    #[test]
    fn test_unmapped_falls_back_to_walk() {
        let temp = TempDir::new().unwrap();
        let walked = temp.path().join("arm/meshes/base.stl");
        touch(&walked);

        let mut resolver = ResourceResolver::new(temp.path().join("urdf"));
        resolver.add_package_mapping("arm", temp.path().join("empty"));
        assert_eq!(resolver.resolve("package://arm/meshes/base.stl").unwrap(), walked);
    }

    #[test]
    fn test_not_found_reports_candidates() {
        let temp = TempDir::new().unwrap();
        let source_dir = temp.path().join("a/b");
        let mut resolver = ResourceResolver::new(&source_dir);
        resolver.add_package_mapping("pkg", temp.path().join("mapped"));

        let err = resolver.resolve("package://pkg/missing.stl").unwrap_err();
        assert_eq!(err.reference, "package://pkg/missing.stl");
        assert_eq!(err.candidates[0], temp.path().join("mapped/missing.stl"));
        assert_eq!(err.candidates[1], source_dir.join("pkg/missing.stl"));
        assert_eq!(err.candidates[2], temp.path().join("a/pkg/missing.stl"));
        // mapping + every ancestor of the source dir
        assert_eq!(err.candidates.len(), 1 + source_dir.ancestors().count());
    }

    #[test]
    fn test_bare_file_name_parent_is_working_dir() {
        // Path::new("robot.urdf").parent() is the empty path
        let resolver = ResourceResolver::new(Path::new("robot.urdf").parent().unwrap());
        assert!(resolver.source_dir().is_absolute());
        assert_eq!(resolver.source_dir(), std::env::current_dir().unwrap());
        assert!(resolver.source_dir().ancestors().count() > 1);
    }

    #[test]
    fn test_malformed_package_uri() {
        let temp = TempDir::new().unwrap();
        let resolver = ResourceResolver::new(temp.path());
        assert!(resolver.resolve("package://only_name").is_err());
        assert!(resolver.resolve("package:///file.stl").is_err());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("pkg/m.stl"));

        let resolver = ResourceResolver::new(temp.path().join("urdf"));
        let first = resolver.resolve("package://pkg/m.stl").unwrap();
        let second = resolver.resolve("package://pkg/m.stl").unwrap();
        assert_eq!(first, second);
    }
}
