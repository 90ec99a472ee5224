//! Error and warning types for the conversion pipeline
//!
//! Every failure family has its own `thiserror` enum or struct. The converter
//! facade folds them into [`ConvertErrorKind`] and wraps the result with the
//! source description path in [`ConversionError`].

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed or invalid robot description
#[derive(Debug, Clone, PartialEq, Error)]
#[error("<{element}>: {message}{}", line_suffix(.line))]
pub struct ParseError {
    /// Tag of the offending element
    pub element: String,
    /// What went wrong, naming the attribute or entity when known
    pub message: String,
    /// 1-based line of the element in the source text
    pub line: Option<u32>,
}

fn line_suffix(line: &Option<u32>) -> String {
    line.map(|l| format!(" (line: {})", l)).unwrap_or_default()
}

impl ParseError {
    pub fn new(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

/// A reference that no resolution strategy could turn into a readable file
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resource '{reference}' not found{}", searched_suffix(.candidates))]
pub struct ResourceNotFound {
    /// The path exactly as authored in the description
    pub reference: String,
    /// Every location that was checked, in order
    pub candidates: Vec<PathBuf>,
}

fn searched_suffix(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let list = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(" (searched: {})", list)
}

/// Corrupt or unsupported mesh payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshDecodeError {
    #[error("failed to read mesh '{}': {reason}", path.display())]
    Io { path: PathBuf, reason: String },

    #[error("mesh '{}' is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("mesh '{}' uses an unsupported feature: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
}

impl MeshDecodeError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The mesh file the error refers to
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Corrupt { path, .. } | Self::Unsupported { path, .. } => {
                path
            }
        }
    }
}

/// The links and joints do not form a single rooted tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KinematicError {
    #[error("multiple root links found: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("no root link found; the joint structure is a loop through {}", .0.join(" -> "))]
    NoRoot(Vec<String>),

    #[error("link '{0}' is reached twice; the joint structure contains a cycle")]
    Cycle(String),

    #[error("links not connected to the root: {}", .0.join(", "))]
    DisconnectedLink(Vec<String>),
}

impl KinematicError {
    /// True for the failures caused by a joint loop
    pub fn is_cycle_related(&self) -> bool {
        matches!(self, Self::NoRoot(_) | Self::Cycle(_))
    }
}

/// Authoring or storage failure while writing the asset
#[derive(Debug, Error)]
#[error("failed to write '{}': {source}", path.display())]
pub struct AssetWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl AssetWriteError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Every fatal error a conversion can end with
#[derive(Debug, Error)]
pub enum ConvertErrorKind {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    ResourceNotFound(#[from] ResourceNotFound),

    #[error(transparent)]
    MeshDecode(#[from] MeshDecodeError),

    #[error(transparent)]
    Kinematic(#[from] KinematicError),

    #[error(transparent)]
    AssetWrite(#[from] AssetWriteError),
}

/// A failed conversion, wrapped with the description it was converting
#[derive(Debug, Error)]
#[error("failed to convert '{}': {kind}", path.display())]
pub struct ConversionError {
    pub path: PathBuf,
    #[source]
    pub kind: ConvertErrorKind,
}

impl ConversionError {
    pub fn new(path: impl Into<PathBuf>, kind: impl Into<ConvertErrorKind>) -> Self {
        Self {
            path: path.into(),
            kind: kind.into(),
        }
    }
}

/// Result type for conversion-level operations
pub type ConvertResult<T> = Result<T, ConvertErrorKind>;

/// Category of a recoverable problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ResourceNotFound,
    MeshDecode,
    MissingTexture,
    UnsupportedFeature,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            WarningKind::ResourceNotFound => "resource not found",
            WarningKind::MeshDecode => "mesh decode",
            WarningKind::MissingTexture => "missing texture",
            WarningKind::UnsupportedFeature => "unsupported feature",
        };
        f.write_str(label)
    }
}

/// A recoverable problem recorded during a conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// The link, joint, material or file the warning is about
    pub subject: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}
