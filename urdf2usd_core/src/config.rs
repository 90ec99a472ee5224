//! Conversion options
//!
//! Options can be built in code, parsed from a TOML document, or loaded from a
//! file. Every field has a default so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConvertErrorKind;

/// How recoverable resource and mesh failures are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Abort the conversion
    Strict,
    /// Drop the affected geometry and record a warning
    #[default]
    Lenient,
}

/// Up axis of the authored stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpAxis {
    #[serde(rename = "y", alias = "Y")]
    Y,
    #[serde(rename = "z", alias = "Z")]
    #[default]
    Z,
}

impl UpAxis {
    pub fn as_token(&self) -> &'static str {
        match self {
            UpAxis::Y => "Y",
            UpAxis::Z => "Z",
        }
    }
}

impl FromStr for UpAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "y" => Ok(UpAxis::Y),
            "z" => Ok(UpAxis::Z),
            other => Err(format!("unknown up axis '{}', expected y or z", other)),
        }
    }
}

/// Joint position used for the exported static transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestPose {
    /// Every joint at zero displacement
    #[default]
    Zero,
    /// Joints with a `<calibration reference_position>` use it, others stay at zero
    Calibration,
}

impl FromStr for RestPose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(RestPose::Zero),
            "calibration" => Ok(RestPose::Calibration),
            other => Err(format!(
                "unknown rest pose '{}', expected zero or calibration",
                other
            )),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Policy::Strict => write!(f, "strict"),
            Policy::Lenient => write!(f, "lenient"),
        }
    }
}

/// Options for a single conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Explicit `package://<name>` roots
    #[serde(default)]
    pub package_mappings: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub policy: Policy,
    /// Asset directory and root file name; defaults to the source file stem
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub up_axis: UpAxis,
    #[serde(default = "default_meters_per_unit")]
    pub meters_per_unit: f64,
    #[serde(default)]
    pub rest_pose: RestPose,
    /// Explicit rest positions in radians or meters, overriding `rest_pose`
    #[serde(default)]
    pub joint_positions: BTreeMap<String, f64>,
    /// Vertex weld tolerance; zero welds only bit-identical vertices
    #[serde(default)]
    pub weld_epsilon: f32,
    #[serde(default = "default_physics_scene")]
    pub physics_scene: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_meters_per_unit() -> f64 {
    1.0
}

fn default_physics_scene() -> bool {
    true
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            package_mappings: BTreeMap::new(),
            policy: Policy::default(),
            output_name: None,
            up_axis: UpAxis::default(),
            meters_per_unit: default_meters_per_unit(),
            rest_pose: RestPose::default(),
            joint_positions: BTreeMap::new(),
            weld_epsilon: 0.0,
            physics_scene: default_physics_scene(),
            comment: None,
        }
    }
}

impl ConversionOptions {
    /// Parse options from a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConvertErrorKind> {
        let options: Self = toml::from_str(text)
            .map_err(|e| ConvertErrorKind::InvalidInput(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConvertErrorKind> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertErrorKind::InvalidInput(format!(
                "failed to read options file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Add a package mapping from a `name=path` argument
    pub fn add_package_argument(&mut self, argument: &str) -> Result<(), ConvertErrorKind> {
        let (name, path) = argument.split_once('=').ok_or_else(|| {
            ConvertErrorKind::InvalidInput(format!(
                "package mapping '{}' must have the form name=path",
                argument
            ))
        })?;
        let name = name.trim();
        let path = path.trim();
        if name.is_empty() || path.is_empty() {
            return Err(ConvertErrorKind::InvalidInput(format!(
                "package mapping '{}' must have the form name=path",
                argument
            )));
        }
        self.package_mappings
            .insert(name.to_string(), PathBuf::from(path));
        Ok(())
    }

    /// Check value ranges before any work starts
    pub fn validate(&self) -> Result<(), ConvertErrorKind> {
        if !(self.meters_per_unit.is_finite() && self.meters_per_unit > 0.0) {
            return Err(ConvertErrorKind::InvalidInput(format!(
                "meters_per_unit must be positive, got {}",
                self.meters_per_unit
            )));
        }
        if !(self.weld_epsilon.is_finite() && self.weld_epsilon >= 0.0) {
            return Err(ConvertErrorKind::InvalidInput(format!(
                "weld_epsilon must be zero or positive, got {}",
                self.weld_epsilon
            )));
        }
        if let Some(name) = &self.output_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(ConvertErrorKind::InvalidInput(format!(
                    "output name '{}' must be a plain file name",
                    name
                )));
            }
        }
        for (package, base) in &self.package_mappings {
            if package.is_empty() || package.contains('/') {
                return Err(ConvertErrorKind::InvalidInput(format!(
                    "invalid package name '{}' mapped to '{}'",
                    package,
                    base.display()
                )));
            }
        }
        for (joint, value) in &self.joint_positions {
            if !value.is_finite() {
                return Err(ConvertErrorKind::InvalidInput(format!(
                    "rest position for joint '{}' is not finite",
                    joint
                )));
            }
        }
        Ok(())
    }
}
