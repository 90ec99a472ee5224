//! In-memory robot model
//!
//! Links live in an arena and are addressed by [`LinkId`]. Joints refer to
//! their parent and child by id, never by live reference, so malformed input
//! with loops can be represented and rejected later by the kinematics pass.

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ResourceNotFound;

/// Index of a link in [`RobotModel::links`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub usize);

/// Index of a joint in [`RobotModel::joints`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub usize);

/// A path as authored in the description plus its resolution outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReference {
    pub authored: String,
    pub resolved: Result<PathBuf, ResourceNotFound>,
}

impl ResourceReference {
    pub fn new(authored: impl Into<String>, resolved: Result<PathBuf, ResourceNotFound>) -> Self {
        Self {
            authored: authored.into(),
            resolved,
        }
    }

    /// Resolved location, if resolution succeeded
    pub fn path(&self) -> Option<&Path> {
        self.resolved.as_deref().ok()
    }
}

/// An element with no meaning to the converter, kept as written
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content; `None` when blank
    pub text: Option<String>,
    pub children: Vec<CustomElement>,
}

/// Attributes and child elements of a known element that the converter
/// does not interpret
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomData {
    pub attributes: Vec<(String, String)>,
    pub elements: Vec<CustomElement>,
}

impl CustomData {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.elements.is_empty()
    }
}

/// Geometry of a visual or collision entry
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Box { size: Vector3<f64> },
    Cylinder { radius: f64, length: f64 },
    Sphere { radius: f64 },
    Mesh {
        reference: ResourceReference,
        scale: Vector3<f64>,
    },
}

impl Geometry {
    pub fn mesh_reference(&self) -> Option<&ResourceReference> {
        match self {
            Geometry::Mesh { reference, .. } => Some(reference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Visual {
    pub name: Option<String>,
    pub origin: Isometry3<f64>,
    pub geometry: Geometry,
    /// Name of a material in [`RobotModel::materials`]
    pub material: Option<String>,
    pub custom: CustomData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub name: Option<String>,
    pub origin: Isometry3<f64>,
    pub geometry: Geometry,
    pub custom: CustomData,
}

/// Symmetric inertia tensor about the inertial frame origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Inertia {
    pub ixx: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyy: f64,
    pub iyz: f64,
    pub izz: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inertial {
    /// Center of mass frame relative to the link frame
    pub origin: Isometry3<f64>,
    pub mass: f64,
    pub inertia: Inertia,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub visuals: Vec<Visual>,
    pub collisions: Vec<Collision>,
    pub inertial: Option<Inertial>,
    pub custom: CustomData,
}

impl Link {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visuals: Vec::new(),
            collisions: Vec::new(),
            inertial: None,
            custom: CustomData::default(),
        }
    }

    /// A link with neither geometry nor mass data carries no rigid body
    pub fn is_ghost(&self) -> bool {
        self.visuals.is_empty() && self.collisions.is_empty() && self.inertial.is_none()
    }
}

/// Position range of a limited joint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionRange {
    pub lower: f64,
    pub upper: f64,
}

/// Kind of a joint with its kind-specific motion data
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Fixed,
    Revolute {
        axis: Unit<Vector3<f64>>,
        range: PositionRange,
    },
    Continuous {
        axis: Unit<Vector3<f64>>,
    },
    Prismatic {
        axis: Unit<Vector3<f64>>,
        range: PositionRange,
    },
    /// Moves in the plane perpendicular to `normal`
    Planar {
        normal: Unit<Vector3<f64>>,
    },
    Floating,
}

impl JointKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            JointKind::Fixed => "fixed",
            JointKind::Revolute { .. } => "revolute",
            JointKind::Continuous { .. } => "continuous",
            JointKind::Prismatic { .. } => "prismatic",
            JointKind::Planar { .. } => "planar",
            JointKind::Floating => "floating",
        }
    }

    pub fn axis(&self) -> Option<Unit<Vector3<f64>>> {
        match self {
            JointKind::Revolute { axis, .. }
            | JointKind::Continuous { axis }
            | JointKind::Prismatic { axis, .. } => Some(*axis),
            JointKind::Planar { normal } => Some(*normal),
            JointKind::Fixed | JointKind::Floating => None,
        }
    }

    /// Transform of the child frame relative to the joint frame at `position`
    ///
    /// Only single-degree-of-freedom joints move; the others stay at identity.
    pub fn motion(&self, position: f64) -> Isometry3<f64> {
        match self {
            JointKind::Revolute { axis, .. } | JointKind::Continuous { axis } => {
                Isometry3::from_parts(
                    Translation3::identity(),
                    UnitQuaternion::from_axis_angle(axis, position),
                )
            }
            JointKind::Prismatic { axis, .. } => Isometry3::from_parts(
                Translation3::from(axis.into_inner() * position),
                UnitQuaternion::identity(),
            ),
            JointKind::Fixed | JointKind::Planar { .. } | JointKind::Floating => {
                Isometry3::identity()
            }
        }
    }
}

/// Effort and velocity limits
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionLimit {
    pub effort: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dynamics {
    pub damping: f64,
    pub friction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    pub rising: Option<f64>,
    pub falling: Option<f64>,
    pub reference_position: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SafetyController {
    pub soft_lower_limit: f64,
    pub soft_upper_limit: f64,
    pub k_position: f64,
    pub k_velocity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mimic {
    pub joint: String,
    pub multiplier: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    pub parent: LinkId,
    pub child: LinkId,
    /// Joint frame relative to the parent link frame
    pub origin: Isometry3<f64>,
    pub limit: Option<MotionLimit>,
    pub dynamics: Option<Dynamics>,
    pub calibration: Option<Calibration>,
    pub safety_controller: Option<SafetyController>,
    pub mimic: Option<Mimic>,
    pub custom: CustomData,
}

/// RGBA color with components in `[0, 1]`
pub type Rgba = [f64; 4];

/// Named appearance, either an inline color, a texture or both
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Option<Rgba>,
    pub texture: Option<ResourceReference>,
    pub custom: CustomData,
}

/// Root aggregate of a parsed description
#[derive(Debug, Clone, PartialEq)]
pub struct RobotModel {
    name: String,
    links: Vec<Link>,
    joints: Vec<Joint>,
    materials: Vec<Material>,
    /// Top-level elements other than links, joints and materials
    custom: CustomData,
    link_index: HashMap<String, LinkId>,
}

impl RobotModel {
    /// Build the model; link names must already be unique
    pub fn new(
        name: impl Into<String>,
        links: Vec<Link>,
        joints: Vec<Joint>,
        materials: Vec<Material>,
    ) -> Self {
        let link_index = links
            .iter()
            .enumerate()
            .map(|(i, link)| (link.name.clone(), LinkId(i)))
            .collect();
        Self {
            name: name.into(),
            links,
            joints,
            materials,
            custom: CustomData::default(),
            link_index,
        }
    }

    /// Attach top-level data the converter does not interpret
    pub fn with_custom(mut self, custom: CustomData) -> Self {
        self.custom = custom;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Mutable access for dropping geometry; link names stay fixed
    pub fn links_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.links.iter_mut()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn custom(&self) -> &CustomData {
        &self.custom
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut()
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id.0]
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.link_index.get(name).copied()
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> {
        (0..self.links.len()).map(LinkId)
    }

    pub fn joint_ids(&self) -> impl Iterator<Item = JointId> {
        (0..self.joints.len()).map(JointId)
    }

    /// Resolved paths of every mesh still referenced by some geometry entry
    pub fn mesh_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .links
            .iter()
            .flat_map(|link| {
                link.visuals
                    .iter()
                    .map(|v| &v.geometry)
                    .chain(link.collisions.iter().map(|c| &c.geometry))
            })
            .filter_map(|g| g.mesh_reference().and_then(|r| r.path()))
            .map(Path::to_path_buf)
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
