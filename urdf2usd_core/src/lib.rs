//! # urdf2usd core
//!
//! Converts URDF robot descriptions into self-contained, layered USD assets.
//!
//! The pipeline:
//!
//! - **Resolver**: maps `package://`, `file://` and relative paths to files
//! - **Parser**: reads URDF into a typed [`RobotModel`] with line-numbered errors
//! - **Kinematics**: validates the joint graph and computes rest-pose transforms
//! - **Mesh**: decodes OBJ, STL and COLLADA into triangulated, welded meshes
//! - **Composer**: authors geometry, material and physics layers plus the
//!   composition layer that ties them together
//!
//! ## Quick Start
//!
//! ```no_run
//! use urdf2usd_core::{ConversionOptions, Converter};
//!
//! let report = Converter::new(ConversionOptions::default())
//!     .convert("robot.urdf", "out")
//!     .unwrap();
//! println!("wrote {}", report.asset_path.display());
//! ```

pub mod composer;
pub mod config;
pub mod convert;
pub mod error;
pub mod kinematics;
pub mod mesh;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod usd;

pub use config::{ConversionOptions, Policy, RestPose, UpAxis};
pub use convert::{convert, ConversionReport, Converter};
pub use error::{
    AssetWriteError, ConversionError, ConvertErrorKind, KinematicError, MeshDecodeError,
    ParseError, ResourceNotFound, Warning, WarningKind,
};
pub use kinematics::{build_tree, KinematicTree, RestPositions};
pub use model::RobotModel;
pub use parser::parse_urdf;
pub use resolver::ResourceResolver;

/// Version written into every authored layer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
