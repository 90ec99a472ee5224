//! Conversion facade
//!
//! Runs the pipeline for one description: resolve and parse, apply the
//! failure policy, build the kinematic tree, decode meshes, then compose the
//! layered asset. Every non-fatal problem ends up in the returned report.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::composer::{AssetComposer, MeshMap};
use crate::config::{ConversionOptions, Policy};
use crate::error::{
    ConversionError, ConvertErrorKind, MeshDecodeError, ResourceNotFound, Warning, WarningKind,
};
use crate::kinematics::{build_tree, RestPositions};
use crate::mesh::cache::MeshCache;
use crate::model::{Geometry, RobotModel};
use crate::parser::parse_urdf;
use crate::resolver::ResourceResolver;

/// Outcome of a successful conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    /// Root layer of the written asset
    pub asset_path: PathBuf,
    pub warnings: Vec<Warning>,
    pub links: usize,
    pub joints: usize,
    /// Distinct mesh files decoded without error
    pub meshes_decoded: usize,
    /// Meshes written to the geometry library after deduplication
    pub meshes_authored: usize,
    pub textures_copied: usize,
}

impl ConversionReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Pretty JSON rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Converts URDF descriptions into self-contained layered assets
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConversionOptions,
}

impl Converter {
    pub fn new(options: ConversionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Convert `source` into an asset directory below `destination`
    pub fn convert(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<ConversionReport, ConversionError> {
        let source = source.as_ref();
        self.run(source, destination.as_ref())
            .map_err(|kind| ConversionError::new(source, kind))
    }

    fn run(&self, source: &Path, destination: &Path) -> Result<ConversionReport, ConvertErrorKind> {
        self.options.validate()?;
        check_paths(source, destination)?;

        info!("Converting {}", source.display());
        let xml = std::fs::read_to_string(source).map_err(|e| {
            ConvertErrorKind::InvalidInput(format!("failed to read '{}': {}", source.display(), e))
        })?;

        let source = std::path::absolute(source).map_err(|e| {
            ConvertErrorKind::InvalidInput(format!(
                "failed to locate '{}': {}",
                source.display(),
                e
            ))
        })?;
        let source_dir = source.parent().unwrap_or_else(|| Path::new("/"));
        let resolver =
            ResourceResolver::with_package_mappings(source_dir, &self.options.package_mappings);
        let parsed = parse_urdf(&xml, &resolver)?;
        let mut model = parsed.model;
        let mut warnings = parsed.warnings;
        info!(
            "Parsed robot '{}' ({} links, {} joints)",
            model.name(),
            model.links().len(),
            model.joints().len()
        );

        apply_resolution_policy(&mut model, self.options.policy, &mut warnings)?;

        let rest = RestPositions::new(self.options.rest_pose, self.options.joint_positions.clone());
        let tree = build_tree(&model, &rest)?;

        let cache = MeshCache::new(self.options.weld_epsilon);
        let mut meshes = MeshMap::new();
        let mut failed = HashMap::new();
        for (path, result) in cache.load_all(&model.mesh_paths()) {
            match result {
                Ok(mesh) => {
                    meshes.insert(path, mesh);
                }
                Err(error) => {
                    failed.insert(path, error);
                }
            }
        }
        let meshes_decoded = meshes.len();
        apply_decode_policy(&mut model, failed, self.options.policy, &mut warnings)?;
        collect_missing_textures(&meshes, self.options.policy, &mut warnings)?;

        let name = self.output_name(&source);
        let composed = AssetComposer::new(&self.options, &model, &tree, &meshes)
            .compose(destination, &name)?;
        warnings.extend(composed.warnings);

        for warning in &warnings {
            warn!("{}", warning);
        }
        info!(
            "Wrote {} with {} warning(s)",
            composed.asset_path.display(),
            warnings.len()
        );

        Ok(ConversionReport {
            asset_path: composed.asset_path,
            warnings,
            links: model.links().len(),
            joints: model.joints().len(),
            meshes_decoded,
            meshes_authored: composed.meshes_authored,
            textures_copied: composed.textures_copied,
        })
    }

    fn output_name(&self, source: &Path) -> String {
        self.options
            .output_name
            .clone()
            .or_else(|| {
                source
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "robot".to_string())
    }
}

/// Convert with explicit options
pub fn convert(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ConversionOptions,
) -> Result<ConversionReport, ConversionError> {
    Converter::new(options.clone()).convert(source, destination)
}

fn check_paths(source: &Path, destination: &Path) -> Result<(), ConvertErrorKind> {
    if !source.is_file() {
        return Err(ConvertErrorKind::InvalidInput(format!(
            "source '{}' is not a readable file",
            source.display()
        )));
    }
    if destination.is_file() {
        return Err(ConvertErrorKind::InvalidInput(format!(
            "destination '{}' is a file, expected a directory",
            destination.display()
        )));
    }
    Ok(())
}

/// Drop geometry and textures that failed to resolve, or fail under strict policy
fn apply_resolution_policy(
    model: &mut RobotModel,
    policy: Policy,
    warnings: &mut Vec<Warning>,
) -> Result<(), ResourceNotFound> {
    for link in model.links_mut() {
        let link_name = link.name.clone();
        let mut keep = |geometry: &Geometry| -> Result<bool, ResourceNotFound> {
            let Some(Err(missing)) = geometry.mesh_reference().map(|r| &r.resolved) else {
                return Ok(true);
            };
            if policy == Policy::Strict {
                return Err(missing.clone());
            }
            warnings.push(Warning::new(
                WarningKind::ResourceNotFound,
                &link_name,
                format!("dropped geometry: {}", missing),
            ));
            Ok(false)
        };

        let mut visuals = Vec::with_capacity(link.visuals.len());
        for visual in link.visuals.drain(..) {
            if keep(&visual.geometry)? {
                visuals.push(visual);
            }
        }
        let mut collisions = Vec::with_capacity(link.collisions.len());
        for collision in link.collisions.drain(..) {
            if keep(&collision.geometry)? {
                collisions.push(collision);
            }
        }
        link.visuals = visuals;
        link.collisions = collisions;
    }

    for material in model.materials_mut() {
        let Some(Err(missing)) = material.texture.as_ref().map(|t| &t.resolved) else {
            continue;
        };
        if policy == Policy::Strict {
            return Err(missing.clone());
        }
        warnings.push(Warning::new(
            WarningKind::ResourceNotFound,
            &material.name,
            format!("dropped texture: {}", missing),
        ));
        material.texture = None;
    }
    Ok(())
}

/// Drop geometry whose mesh failed to decode, one warning per file
fn apply_decode_policy(
    model: &mut RobotModel,
    failed: HashMap<PathBuf, MeshDecodeError>,
    policy: Policy,
    warnings: &mut Vec<Warning>,
) -> Result<(), MeshDecodeError> {
    if failed.is_empty() {
        return Ok(());
    }

    let mut errors: Vec<MeshDecodeError> = failed.into_values().collect();
    errors.sort_by(|a, b| a.path().cmp(b.path()));
    if policy == Policy::Strict {
        return Err(errors.remove(0));
    }

    let broken: HashSet<PathBuf> = errors.iter().map(|e| e.path().to_path_buf()).collect();
    for error in &errors {
        warnings.push(Warning::new(
            WarningKind::MeshDecode,
            error.path().display().to_string(),
            format!("dropped every geometry using it: {}", error),
        ));
    }

    let uses_broken = |geometry: &Geometry| {
        geometry
            .mesh_reference()
            .and_then(|r| r.path())
            .is_some_and(|path| broken.contains(path))
    };
    for link in model.links_mut() {
        let before = link.visuals.len() + link.collisions.len();
        link.visuals.retain(|v| !uses_broken(&v.geometry));
        link.collisions.retain(|c| !uses_broken(&c.geometry));
        let dropped = before - link.visuals.len() - link.collisions.len();
        if dropped > 0 {
            debug!("Dropped {} geometry entries from link '{}'", dropped, link.name);
        }
    }
    Ok(())
}

/// Record textures named by mesh materials that could not be found
fn collect_missing_textures(
    meshes: &MeshMap,
    policy: Policy,
    warnings: &mut Vec<Warning>,
) -> Result<(), ResourceNotFound> {
    let mut entries: Vec<_> = meshes.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (path, mesh) in entries {
        for texture in &mesh.missing_textures {
            if policy == Policy::Strict {
                return Err(ResourceNotFound {
                    reference: texture.clone(),
                    candidates: Vec::new(),
                });
            }
            warnings.push(Warning::new(
                WarningKind::MissingTexture,
                path.display().to_string(),
                format!("texture '{}' not found, material keeps its color only", texture),
            ));
        }
    }
    Ok(())
}
