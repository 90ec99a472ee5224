use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use urdf2usd_core::{ConversionOptions, ConvertErrorKind, Policy, RestPose, UpAxis};

#[derive(Parser, Debug, Clone)]
#[command(name = "urdf2usd")]
#[command(about = "URDF to layered USD asset converter", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Convert a URDF robot description into a self-contained asset
    Convert(ConvertArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// URDF file to convert
    pub source: PathBuf,

    /// Directory that receives the asset directory
    pub destination: PathBuf,

    /// Package root as name=path, repeatable
    #[arg(short, long = "package", value_name = "NAME=PATH")]
    pub packages: Vec<String>,

    /// Fail on any missing resource or unreadable mesh
    #[arg(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Drop failing geometry and keep going
    #[arg(long)]
    pub lenient: bool,

    /// Asset name; defaults to the source file stem
    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(long, value_name = "y|z")]
    pub up_axis: Option<UpAxis>,

    #[arg(long)]
    pub meters_per_unit: Option<f64>,

    #[arg(long, value_name = "zero|calibration")]
    pub rest_pose: Option<RestPose>,

    #[arg(long, default_value_t = false)]
    pub no_physics_scene: bool,

    /// Comment written into every layer
    #[arg(long)]
    pub comment: Option<String>,

    /// TOML options file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print the conversion report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    pub fn parse() -> Self {
        Parser::parse()
    }
}

impl ConvertArgs {
    /// Options from the config file with flag overrides applied
    pub fn options(&self) -> Result<ConversionOptions, ConvertErrorKind> {
        let mut options = match &self.config {
            Some(path) => ConversionOptions::from_toml_file(path)?,
            None => ConversionOptions::default(),
        };

        for package in &self.packages {
            options.add_package_argument(package)?;
        }
        if self.strict {
            options.policy = Policy::Strict;
        } else if self.lenient {
            options.policy = Policy::Lenient;
        }
        if let Some(name) = &self.name {
            options.output_name = Some(name.clone());
        }
        if let Some(up_axis) = self.up_axis {
            options.up_axis = up_axis;
        }
        if let Some(mpu) = self.meters_per_unit {
            options.meters_per_unit = mpu;
        }
        if let Some(rest_pose) = self.rest_pose {
            options.rest_pose = rest_pose;
        }
        if self.no_physics_scene {
            options.physics_scene = false;
        }
        if let Some(comment) = &self.comment {
            options.comment = Some(comment.clone());
        }

        options.validate()?;
        Ok(options)
    }
}
