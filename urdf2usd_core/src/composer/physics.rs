//! Physics layer
//!
//! Holds one prim per link (rigid body and mass opinions), one `over` per
//! collision gprim and one prim per joint, plus the robot, geometry and
//! `Physics` containers. Unknown joint data nests below the joint prim.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, Unit, UnitQuaternion, Vector3};
use std::f64::consts::PI;
use tracing::debug;

use super::{author_custom_data, float3, quatf, set_display_name, ScenePaths};
use crate::error::{Warning, WarningKind};
use crate::kinematics::KinematicTree;
use crate::model::{Inertia, Inertial, Joint, JointKind, LinkId, RobotModel};
use crate::usd::{Layer, NameCache, PrimSpec, Value};

/// Author the physics layer
pub(crate) fn author(
    model: &RobotModel,
    tree: &KinematicTree,
    scene: &ScenePaths,
    meters_per_unit: f64,
    names: &mut NameCache,
    warnings: &mut Vec<Warning>,
) -> Layer {
    let mut layer = Layer::new();
    layer.override_prim(&scene.robot);
    layer.override_prim(&scene.geometry_root);

    let articulation = articulation_root(model, tree);
    for &id in tree.order() {
        let link = model.link(id);
        let spec = layer.override_prim(&scene.links[id.0]);
        if !link.is_ghost() {
            spec.apply_api("PhysicsRigidBodyAPI");
        }
        if id == articulation {
            spec.apply_api("PhysicsArticulationRootAPI");
        }
        if let Some(inertial) = &link.inertial {
            apply_mass(spec, inertial, meters_per_unit);
        }
    }

    for collision in &scene.collisions {
        let spec = layer.override_prim(&collision.path);
        spec.apply_api("PhysicsCollisionAPI");
        spec.set("physics:collisionEnabled", Value::Bool(true));
        if collision.is_mesh {
            spec.apply_api("PhysicsMeshCollisionAPI");
            spec.set_uniform("physics:approximation", Value::token("none"));
        }
    }

    let scope = names.child(&scene.robot, "Physics");
    layer.define_prim(&scope, "Scope");
    for id in model.joint_ids() {
        let joint = model.joint(id);
        let path = names.child(&scope, &joint.name);
        let spec = layer.define_prim(&path, joint_type_name(&joint.kind));
        set_display_name(spec, &joint.name);
        spec.set_relationship("physics:body0", vec![scene.links[joint.parent.0].clone()]);
        spec.set_relationship("physics:body1", vec![scene.links[joint.child.0].clone()]);
        author_joint(spec, joint, tree, meters_per_unit);
        author_description_data(spec, joint);
        author_custom_data(&mut layer, names, &path, &joint.custom);

        if matches!(joint.kind, JointKind::Floating) {
            warnings.push(Warning::new(
                WarningKind::UnsupportedFeature,
                &joint.name,
                "floating joint authored as an unconstrained joint",
            ));
        }
        debug!("Authored {} joint {}", joint.kind.type_name(), path);
    }

    layer
}

/// The first link in tree order that carries a rigid body
///
/// A massless, geometry-free root only anchors the tree, so the
/// articulation starts below it.
pub fn articulation_root(model: &RobotModel, tree: &KinematicTree) -> LinkId {
    tree.order()
        .iter()
        .copied()
        .find(|id| !model.link(*id).is_ghost())
        .unwrap_or_else(|| tree.root())
}

fn joint_type_name(kind: &JointKind) -> &'static str {
    match kind {
        JointKind::Fixed => "PhysicsFixedJoint",
        JointKind::Revolute { .. } | JointKind::Continuous { .. } => "PhysicsRevoluteJoint",
        JointKind::Prismatic { .. } => "PhysicsPrismaticJoint",
        JointKind::Planar { .. } | JointKind::Floating => "PhysicsJoint",
    }
}

/// Axis token and the rotation that carries that token axis onto `axis`
pub fn axis_alignment(axis: &Unit<Vector3<f64>>) -> (&'static str, UnitQuaternion<f64>) {
    let principal = [("X", Vector3::x()), ("Y", Vector3::y()), ("Z", Vector3::z())];
    for (token, unit) in principal {
        if (axis.into_inner() - unit).norm() < 1e-9 {
            return (token, UnitQuaternion::identity());
        }
    }
    let rotation = UnitQuaternion::rotation_between(&Vector3::x(), &axis.into_inner())
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI));
    ("X", rotation)
}

/// Joint frames in both bodies plus kind-specific axis and limits
fn author_joint(spec: &mut PrimSpec, joint: &Joint, tree: &KinematicTree, meters_per_unit: f64) {
    let (token, alignment) = joint
        .kind
        .axis()
        .map(|axis| axis_alignment(&axis))
        .unwrap_or(("X", UnitQuaternion::identity()));
    let align = Isometry3::from_parts(Translation3::identity(), alignment);

    let frame0 = joint.origin * align;
    let joint_world = tree.world(joint.parent) * joint.origin;
    let frame1 = tree.world(joint.child).inv_mul(&joint_world) * align;

    spec.set("physics:localPos0", Value::Point3f(float3(&frame0.translation.vector)));
    spec.set("physics:localRot0", Value::Quatf(quatf(&frame0.rotation)));
    spec.set("physics:localPos1", Value::Point3f(float3(&frame1.translation.vector)));
    spec.set("physics:localRot1", Value::Quatf(quatf(&frame1.rotation)));

    match &joint.kind {
        JointKind::Revolute { range, .. } => {
            spec.set_uniform("physics:axis", Value::token(token));
            spec.set("physics:lowerLimit", Value::Float(range.lower.to_degrees() as f32));
            spec.set("physics:upperLimit", Value::Float(range.upper.to_degrees() as f32));
        }
        JointKind::Continuous { .. } => {
            spec.set_uniform("physics:axis", Value::token(token));
        }
        JointKind::Prismatic { range, .. } => {
            let scale = 1.0 / meters_per_unit;
            spec.set_uniform("physics:axis", Value::token(token));
            spec.set("physics:lowerLimit", Value::Float((range.lower * scale) as f32));
            spec.set("physics:upperLimit", Value::Float((range.upper * scale) as f32));
        }
        JointKind::Planar { .. } => {
            // free in the plane: lock translation along the normal and the
            // two rotations that tilt the plane
            let locked = match token {
                "X" => ["transX", "rotY", "rotZ"],
                "Y" => ["transY", "rotX", "rotZ"],
                _ => ["transZ", "rotX", "rotY"],
            };
            for dof in locked {
                spec.apply_api(&format!("PhysicsLimitAPI:{}", dof));
                spec.set(&format!("limit:{}:physics:low", dof), Value::Float(0.0));
                spec.set(&format!("limit:{}:physics:high", dof), Value::Float(0.0));
            }
        }
        JointKind::Fixed | JointKind::Floating => {}
    }
}

/// Description-only joint data as custom `urdf:` attributes
fn author_description_data(spec: &mut PrimSpec, joint: &Joint) {
    let float = |v: f64| Value::Float(v as f32);

    spec.set_custom("urdf:jointType", Value::token(joint.kind.type_name()));
    if let Some(limit) = &joint.limit {
        spec.set_custom("urdf:limit:effort", float(limit.effort));
        spec.set_custom("urdf:limit:velocity", float(limit.velocity));
    }
    if let Some(dynamics) = &joint.dynamics {
        spec.set_custom("urdf:dynamics:damping", float(dynamics.damping));
        spec.set_custom("urdf:dynamics:friction", float(dynamics.friction));
    }
    if let Some(calibration) = &joint.calibration {
        if let Some(rising) = calibration.rising {
            spec.set_custom("urdf:calibration:rising", float(rising));
        }
        if let Some(falling) = calibration.falling {
            spec.set_custom("urdf:calibration:falling", float(falling));
        }
        if let Some(reference) = calibration.reference_position {
            spec.set_custom("urdf:calibration:reference_position", float(reference));
        }
    }
    if let Some(safety) = &joint.safety_controller {
        spec.set_custom(
            "urdf:safety_controller:soft_lower_limit",
            float(safety.soft_lower_limit),
        );
        spec.set_custom(
            "urdf:safety_controller:soft_upper_limit",
            float(safety.soft_upper_limit),
        );
        spec.set_custom("urdf:safety_controller:k_position", float(safety.k_position));
        spec.set_custom("urdf:safety_controller:k_velocity", float(safety.k_velocity));
    }
    if let Some(mimic) = &joint.mimic {
        spec.set_custom("urdf:mimic:joint", Value::String(mimic.joint.clone()));
        spec.set_custom("urdf:mimic:multiplier", float(mimic.multiplier));
        spec.set_custom("urdf:mimic:offset", float(mimic.offset));
    }
}

fn apply_mass(spec: &mut PrimSpec, inertial: &Inertial, meters_per_unit: f64) {
    spec.apply_api("PhysicsMassAPI");
    spec.set("physics:mass", Value::Float(inertial.mass as f32));
    spec.set(
        "physics:centerOfMass",
        Value::Point3f(float3(&inertial.origin.translation.vector)),
    );

    // kg * m^2 -> kg * unit^2
    let inertia_scale = 1.0 / (meters_per_unit * meters_per_unit);
    let (moments, axes) = principal_inertia(&inertial.inertia);
    spec.set(
        "physics:diagonalInertia",
        Value::Float3(float3(&(moments * inertia_scale))),
    );
    spec.set(
        "physics:principalAxes",
        Value::Quatf(quatf(&(inertial.origin.rotation * axes))),
    );
}

/// Principal moments (ascending) and the rotation whose columns are the axes
pub fn principal_inertia(inertia: &Inertia) -> (Vector3<f64>, UnitQuaternion<f64>) {
    if inertia.ixy == 0.0 && inertia.ixz == 0.0 && inertia.iyz == 0.0 {
        return (
            Vector3::new(inertia.ixx, inertia.iyy, inertia.izz),
            UnitQuaternion::identity(),
        );
    }

    let tensor = Matrix3::new(
        inertia.ixx, inertia.ixy, inertia.ixz,
        inertia.ixy, inertia.iyy, inertia.iyz,
        inertia.ixz, inertia.iyz, inertia.izz,
    );
    let eigen = tensor.symmetric_eigen();

    let mut order = [0usize, 1, 2];
    order.sort_by(|a, b| eigen.eigenvalues[*a].total_cmp(&eigen.eigenvalues[*b]));

    let moments = Vector3::from_fn(|i, _| eigen.eigenvalues[order[i]].max(0.0));
    let mut axes = Matrix3::from_fn(|r, c| eigen.eigenvectors[(r, order[c])]);
    if axes.determinant() < 0.0 {
        axes.column_mut(2).neg_mut();
    }
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(axes));
    (moments, rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestPose;
    use crate::kinematics::{build_tree, RestPositions};
    use crate::model::{Calibration, Link, Mimic, PositionRange};
    use crate::composer::geometry::AuthoredCollision;
    use crate::usd::{PrimPath, Specifier};
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn joint(name: &str, kind: JointKind, parent: usize, child: usize) -> Joint {
        Joint {
            name: name.to_string(),
            kind,
            parent: LinkId(parent),
            child: LinkId(child),
            origin: Isometry3::translation(0.0, 0.0, 1.0),
            limit: None,
            dynamics: None,
            calibration: None,
            safety_controller: None,
            mimic: None,
            custom: Default::default(),
        }
    }

    fn scene_for(model: &RobotModel, tree: &KinematicTree) -> ScenePaths {
        let robot = PrimPath::from_root("bot");
        let geometry_root = robot.child("Geometry");
        let mut links = vec![PrimPath::root(); model.links().len()];
        for &id in tree.order() {
            let parent = match tree.parent_joint(id) {
                Some(j) => links[model.joint(j).parent.0].clone(),
                None => geometry_root.clone(),
            };
            links[id.0] = parent.child(&model.link(id).name);
        }
        ScenePaths {
            robot,
            geometry_root,
            links,
            collisions: Vec::new(),
        }
    }

    fn with_mass(name: &str) -> Link {
        let mut link = Link::new(name);
        link.inertial = Some(Inertial {
            origin: Isometry3::translation(0.1, 0.0, 0.0),
            mass: 2.0,
            inertia: Inertia {
                ixx: 1.0,
                iyy: 2.0,
                izz: 3.0,
                ..Inertia::default()
            },
        });
        link
    }

    fn author_model(model: &RobotModel, rest: &RestPositions) -> (Layer, Vec<Warning>) {
        let tree = build_tree(model, rest).unwrap();
        let scene = scene_for(model, &tree);
        let mut names = NameCache::new();
        let mut warnings = Vec::new();
        let layer = author(model, &tree, &scene, 1.0, &mut names, &mut warnings);
        (layer, warnings)
    }

    #[test]
    fn test_prim_count_is_links_plus_joints() {
        let axis = Vector3::z_axis();
        let model = RobotModel::new(
            "bot",
            vec![Link::new("world"), with_mass("a"), with_mass("b"), with_mass("c")],
            vec![
                joint("fix", JointKind::Fixed, 0, 1),
                joint(
                    "hinge",
                    JointKind::Revolute {
                        axis,
                        range: PositionRange {
                            lower: -1.0,
                            upper: 1.0,
                        },
                    },
                    1,
                    2,
                ),
                joint("free", JointKind::Floating, 1, 3),
            ],
            Vec::new(),
        );
        let (layer, warnings) = author_model(&model, &RestPositions::default());

        // robot, Geometry and Physics containers
        assert_eq!(layer.prim_count() - 3, 4 + 3);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnsupportedFeature);
    }

    #[test]
    fn test_collision_schemas_are_overs() {
        let model = RobotModel::new("bot", vec![with_mass("base")], Vec::new(), Vec::new());
        let tree = build_tree(&model, &RestPositions::default()).unwrap();
        let mut scene = scene_for(&model, &tree);
        let base = scene.links[0].clone();
        scene.collisions = vec![
            AuthoredCollision {
                path: base.child("collision"),
                is_mesh: false,
            },
            AuthoredCollision {
                path: base.child("collision_1"),
                is_mesh: true,
            },
        ];
        let mut names = NameCache::new();
        let mut warnings = Vec::new();
        let layer = author(&model, &tree, &scene, 1.0, &mut names, &mut warnings);

        let boxed = layer.prim(&base.child("collision")).unwrap();
        assert_eq!(boxed.specifier, Specifier::Over);
        assert!(boxed.type_name.is_none());
        assert!(boxed.has_api("PhysicsCollisionAPI"));
        assert!(!boxed.has_api("PhysicsMeshCollisionAPI"));
        assert_eq!(boxed.value("physics:collisionEnabled"), Some(&Value::Bool(true)));

        let mesh = layer.prim(&base.child("collision_1")).unwrap();
        assert!(mesh.has_api("PhysicsMeshCollisionAPI"));
        assert_eq!(mesh.value("physics:approximation"), Some(&Value::token("none")));
        // one link, two collisions, robot + Geometry + Physics
        assert_eq!(layer.prim_count(), 1 + 2 + 3);
    }

    #[test]
    fn test_ghost_root_moves_articulation() {
        let model = RobotModel::new(
            "bot",
            vec![Link::new("world"), with_mass("base")],
            vec![joint("fix", JointKind::Fixed, 0, 1)],
            Vec::new(),
        );
        let (layer, _) = author_model(&model, &RestPositions::default());

        let world = layer.prim(&PrimPath::from_root("bot").child("Geometry").child("world")).unwrap();
        assert!(world.api_schemas.is_empty());
        let base = layer
            .prim(&PrimPath::from_root("bot").child("Geometry").child("world").child("base"))
            .unwrap();
        assert!(base.has_api("PhysicsRigidBodyAPI"));
        assert!(base.has_api("PhysicsArticulationRootAPI"));
        assert!(base.has_api("PhysicsMassAPI"));
        assert_eq!(base.value("physics:mass"), Some(&Value::Float(2.0)));
        assert_eq!(
            base.value("physics:centerOfMass"),
            Some(&Value::Point3f([0.1, 0.0, 0.0]))
        );
        assert_eq!(
            base.value("physics:diagonalInertia"),
            Some(&Value::Float3([1.0, 2.0, 3.0]))
        );
    }

    #[test]
    fn test_revolute_limits_in_degrees() {
        let model = RobotModel::new(
            "bot",
            vec![with_mass("a"), with_mass("b")],
            vec![joint(
                "elbow",
                JointKind::Revolute {
                    axis: Vector3::y_axis(),
                    range: PositionRange {
                        lower: -PI / 2.0,
                        upper: PI,
                    },
                },
                0,
                1,
            )],
            Vec::new(),
        );
        let (layer, _) = author_model(&model, &RestPositions::default());
        let elbow = layer.prim(&PrimPath::from_root("bot").child("Physics").child("elbow")).unwrap();

        assert_eq!(elbow.type_name.as_deref(), Some("PhysicsRevoluteJoint"));
        assert_eq!(elbow.value("physics:axis"), Some(&Value::token("Y")));
        assert_eq!(elbow.value("physics:lowerLimit"), Some(&Value::Float(-90.0)));
        assert_eq!(elbow.value("physics:upperLimit"), Some(&Value::Float(180.0)));
        assert_eq!(
            elbow.value("physics:localPos0"),
            Some(&Value::Point3f([0.0, 0.0, 1.0]))
        );
        assert_eq!(
            elbow.value("physics:localPos1"),
            Some(&Value::Point3f([0.0, 0.0, 0.0]))
        );
        assert_eq!(
            elbow.relationship("physics:body1"),
            Some(&[PrimPath::from_root("bot").child("Geometry").child("a").child("b")][..])
        );
        assert_eq!(elbow.value("urdf:jointType"), Some(&Value::token("revolute")));
    }

    #[test]
    fn test_rest_pose_moves_child_frame() {
        let mut hinge = joint(
            "hinge",
            JointKind::Revolute {
                axis: Vector3::z_axis(),
                range: PositionRange {
                    lower: -PI,
                    upper: PI,
                },
            },
            0,
            1,
        );
        hinge.calibration = Some(Calibration {
            rising: None,
            falling: None,
            reference_position: Some(PI / 2.0),
        });
        let model = RobotModel::new("bot", vec![with_mass("a"), with_mass("b")], vec![hinge], Vec::new());
        let (layer, _) = author_model(&model, &RestPositions::new(RestPose::Calibration, BTreeMap::new()));

        let spec = layer.prim(&PrimPath::from_root("bot").child("Physics").child("hinge")).unwrap();
        let Some(Value::Quatf(q)) = spec.value("physics:localRot1") else {
            panic!("missing localRot1");
        };
        // child frame sits a quarter turn ahead, so the joint frame is a quarter turn back
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            q[0] as f64,
            q[1] as f64,
            q[2] as f64,
            q[3] as f64,
        ));
        assert_relative_eq!(rotation.angle(), PI / 2.0, epsilon = 1e-6);
        assert_relative_eq!(
            rotation * Vector3::x(),
            -Vector3::y(),
            epsilon = 1e-6
        );
        assert_eq!(
            spec.value("urdf:calibration:reference_position"),
            Some(&Value::Float((PI / 2.0) as f32))
        );
    }

    #[test]
    fn test_planar_locks_normal_axis() {
        let mut slide = joint(
            "slide",
            JointKind::Planar {
                normal: Vector3::z_axis(),
            },
            0,
            1,
        );
        slide.mimic = Some(Mimic {
            joint: "other".to_string(),
            multiplier: 2.0,
            offset: 0.5,
        });
        let model = RobotModel::new("bot", vec![with_mass("a"), with_mass("b")], vec![slide], Vec::new());
        let (layer, _) = author_model(&model, &RestPositions::default());
        let spec = layer.prim(&PrimPath::from_root("bot").child("Physics").child("slide")).unwrap();

        assert_eq!(spec.type_name.as_deref(), Some("PhysicsJoint"));
        assert!(spec.has_api("PhysicsLimitAPI:transZ"));
        assert!(spec.has_api("PhysicsLimitAPI:rotX"));
        assert!(spec.has_api("PhysicsLimitAPI:rotY"));
        assert!(!spec.has_api("PhysicsLimitAPI:rotZ"));
        assert_eq!(spec.value("limit:transZ:physics:high"), Some(&Value::Float(0.0)));
        assert_eq!(
            spec.value("urdf:mimic:joint"),
            Some(&Value::String("other".to_string()))
        );
    }

    #[test]
    fn test_axis_alignment() {
        let (token, rotation) = axis_alignment(&Vector3::z_axis());
        assert_eq!(token, "Z");
        assert_eq!(rotation, UnitQuaternion::identity());

        let diagonal = Unit::new_normalize(Vector3::new(1.0, 1.0, 0.0));
        let (token, rotation) = axis_alignment(&diagonal);
        assert_eq!(token, "X");
        assert_relative_eq!(rotation * Vector3::x(), diagonal.into_inner(), epsilon = 1e-12);

        let (_, rotation) = axis_alignment(&-Vector3::x_axis());
        assert_relative_eq!(rotation * Vector3::x(), -Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_principal_inertia_of_rotated_tensor() {
        // diag(1, 2, 3) rotated 45 degrees about z
        let inertia = Inertia {
            ixx: 1.5,
            ixy: -0.5,
            ixz: 0.0,
            iyy: 1.5,
            iyz: 0.0,
            izz: 3.0,
        };
        let (moments, axes) = principal_inertia(&inertia);
        assert_relative_eq!(moments, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-9);

        // the axes must diagonalize the tensor
        let tensor = Matrix3::new(1.5, -0.5, 0.0, -0.5, 1.5, 0.0, 0.0, 0.0, 3.0);
        let r = axes.to_rotation_matrix().into_inner();
        let diagonal = r.transpose() * tensor * r;
        assert_relative_eq!(diagonal, Matrix3::from_diagonal(&moments), epsilon = 1e-9);
    }
}
