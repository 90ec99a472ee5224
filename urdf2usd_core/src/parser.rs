//! URDF parser and model builder
//!
//! Parses the XML text with `roxmltree` into a [`RobotModel`]. Every mesh and
//! texture path is handed to the [`ResourceResolver`] as it is encountered and
//! the outcome is stored next to the authored string; whether a failed
//! resolution is fatal is decided later by the converter's policy.

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{ParseError, Warning, WarningKind};
use crate::model::{
    Calibration, Collision, CustomData, CustomElement, Dynamics, Geometry, Inertia, Inertial,
    Joint, JointKind, Link, LinkId, Material, Mimic, MotionLimit, PositionRange,
    ResourceReference, Rgba, RobotModel, SafetyController, Visual,
};
use crate::resolver::ResourceResolver;

/// Parsed model plus the non-fatal findings of the parse
#[derive(Debug)]
pub struct ParsedDescription {
    pub model: RobotModel,
    pub warnings: Vec<Warning>,
}

/// URDF Parser
pub struct UrdfParser<'r> {
    resolver: &'r ResourceResolver,
    /// Lines removed from the front of the text before parsing
    line_offset: u32,
    materials: Vec<Material>,
    warnings: Vec<Warning>,
}

impl<'r> UrdfParser<'r> {
    pub fn new(resolver: &'r ResourceResolver) -> Self {
        Self {
            resolver,
            line_offset: 0,
            materials: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Parse URDF from XML text
    pub fn parse(mut self, xml: &str) -> Result<ParsedDescription, ParseError> {
        // roxmltree rejects whitespace in front of the XML declaration
        let trimmed = xml.trim_start();
        self.line_offset = xml[..xml.len() - trimmed.len()].matches('\n').count() as u32;

        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(trimmed, options).map_err(|e| {
            ParseError::new("xml", e.to_string()).at_line(e.pos().row + self.line_offset)
        })?;

        let robot = doc.root_element();
        if !robot.has_tag_name("robot") {
            return Err(self.error(
                robot,
                format!(
                    "root element must be <robot>, found <{}>",
                    robot.tag_name().name()
                ),
            ));
        }
        let model = self.parse_robot(robot)?;

        debug!(
            "Parsed robot '{}': {} links, {} joints, {} materials",
            model.name(),
            model.links().len(),
            model.joints().len(),
            model.materials().len()
        );

        Ok(ParsedDescription {
            model,
            warnings: self.warnings,
        })
    }

    fn parse_robot(&mut self, elem: Node) -> Result<RobotModel, ParseError> {
        let name = self.required(elem, "name")?.to_string();

        // Materials may be referenced before they are declared
        for child in elements(elem).filter(|n| n.has_tag_name("material")) {
            let material = self.parse_material(child)?;
            if self.materials.iter().any(|m| m.name == material.name) {
                return Err(self.error(
                    child,
                    format!("duplicate material name '{}'", material.name),
                ));
            }
            self.materials.push(material);
        }

        let mut links = Vec::new();
        let mut link_names = HashSet::new();
        for child in elements(elem).filter(|n| n.has_tag_name("link")) {
            let link = self.parse_link(child)?;
            if !link_names.insert(link.name.clone()) {
                return Err(self.error(child, format!("duplicate link name '{}'", link.name)));
            }
            links.push(link);
        }
        if links.is_empty() {
            return Err(self.error(elem, "robot declares no links"));
        }

        let link_ids: HashMap<&str, usize> = links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.as_str(), i))
            .collect();

        let mut custom = CustomData {
            attributes: unknown_attributes(elem, &["name", "version"]),
            elements: Vec::new(),
        };
        let mut transmission_names = HashSet::new();
        for child in elements(elem) {
            match child.tag_name().name() {
                "link" | "joint" | "material" => {}
                "transmission" => {
                    let name = self.required(child, "name")?;
                    if !transmission_names.insert(name) {
                        return Err(self.error(
                            child,
                            format!("duplicate transmission name '{}'", name),
                        ));
                    }
                    custom.elements.push(custom_element(child));
                }
                _ => custom.elements.push(custom_element(child)),
            }
        }

        let mut joints = Vec::new();
        let mut joint_names = HashSet::new();
        for child in elements(elem).filter(|n| n.has_tag_name("joint")) {
            let joint = self.parse_joint(child, &link_ids)?;
            if !joint_names.insert(joint.name.clone()) {
                return Err(self.error(child, format!("duplicate joint name '{}'", joint.name)));
            }
            joints.push(joint);
        }

        for joint in &joints {
            if let Some(mimic) = &joint.mimic {
                if !joint_names.contains(&mimic.joint) {
                    self.warnings.push(Warning::new(
                        WarningKind::UnsupportedFeature,
                        &joint.name,
                        format!("mimic references unknown joint '{}'", mimic.joint),
                    ));
                }
            }
        }

        Ok(RobotModel::new(
            name,
            links,
            joints,
            std::mem::take(&mut self.materials),
        )
        .with_custom(custom))
    }

    fn parse_link(&mut self, elem: Node) -> Result<Link, ParseError> {
        let mut link = Link::new(self.required(elem, "name")?);
        link.custom.attributes = unknown_attributes(elem, &["name"]);

        for child in elements(elem) {
            match child.tag_name().name() {
                "visual" => {
                    let visual = self.parse_visual(child)?;
                    link.visuals.push(visual);
                }
                "collision" => {
                    let collision = self.parse_collision(child)?;
                    link.collisions.push(collision);
                }
                "inertial" => link.inertial = Some(self.parse_inertial(child)?),
                _ => link.custom.elements.push(custom_element(child)),
            }
        }

        Ok(link)
    }

    fn parse_visual(&mut self, elem: Node) -> Result<Visual, ParseError> {
        let name = elem.attribute("name").map(str::to_string);
        let mut origin = Isometry3::identity();
        let mut geometry = None;
        let mut material = None;
        let mut custom = CustomData {
            attributes: unknown_attributes(elem, &["name"]),
            elements: Vec::new(),
        };

        for child in elements(elem) {
            match child.tag_name().name() {
                "origin" => origin = self.parse_origin(child)?,
                "geometry" => geometry = Some(self.parse_geometry(child)?),
                "material" => material = Some(self.parse_visual_material(child)?),
                _ => custom.elements.push(custom_element(child)),
            }
        }

        Ok(Visual {
            name,
            origin,
            geometry: geometry.ok_or_else(|| self.error(elem, "missing <geometry>"))?,
            material,
            custom,
        })
    }

    /// A visual's `<material>` either names a declared material or defines one inline
    ///
    /// Inline definitions register under their name, so later visuals may
    /// refer to them by name alone.
    fn parse_visual_material(&mut self, elem: Node) -> Result<String, ParseError> {
        let name = self.required(elem, "name")?.to_string();
        let known = self.materials.iter().any(|m| m.name == name);
        let defines = elements(elem).any(|n| n.has_tag_name("color") || n.has_tag_name("texture"));
        if !known {
            if !defines {
                return Err(self.error(elem, format!("material '{}' is not defined", name)));
            }
            let material = self.parse_material(elem)?;
            self.materials.push(material);
        }
        Ok(name)
    }

    fn parse_collision(&self, elem: Node) -> Result<Collision, ParseError> {
        let name = elem.attribute("name").map(str::to_string);
        let mut origin = Isometry3::identity();
        let mut geometry = None;
        let mut custom = CustomData {
            attributes: unknown_attributes(elem, &["name"]),
            elements: Vec::new(),
        };

        for child in elements(elem) {
            match child.tag_name().name() {
                "origin" => origin = self.parse_origin(child)?,
                "geometry" => geometry = Some(self.parse_geometry(child)?),
                _ => custom.elements.push(custom_element(child)),
            }
        }

        Ok(Collision {
            name,
            origin,
            geometry: geometry.ok_or_else(|| self.error(elem, "missing <geometry>"))?,
            custom,
        })
    }

    fn parse_inertial(&self, elem: Node) -> Result<Inertial, ParseError> {
        let mut origin = Isometry3::identity();
        let mut mass = 0.0;
        let mut inertia = Inertia::default();

        for child in elements(elem) {
            match child.tag_name().name() {
                "origin" => origin = self.parse_origin(child)?,
                "mass" => mass = self.required_f64(child, "value")?,
                "inertia" => {
                    inertia = Inertia {
                        ixx: self.optional_f64(child, "ixx", 0.0)?,
                        ixy: self.optional_f64(child, "ixy", 0.0)?,
                        ixz: self.optional_f64(child, "ixz", 0.0)?,
                        iyy: self.optional_f64(child, "iyy", 0.0)?,
                        iyz: self.optional_f64(child, "iyz", 0.0)?,
                        izz: self.optional_f64(child, "izz", 0.0)?,
                    }
                }
                _ => {}
            }
        }

        if mass < 0.0 {
            return Err(self.error(elem, format!("mass must not be negative, got {}", mass)));
        }

        Ok(Inertial {
            origin,
            mass,
            inertia,
        })
    }

    fn parse_geometry(&self, elem: Node) -> Result<Geometry, ParseError> {
        let mut shapes = elements(elem);
        let shape = shapes
            .next()
            .ok_or_else(|| self.error(elem, "geometry has no shape"))?;
        if shapes.next().is_some() {
            return Err(self.error(elem, "geometry must contain exactly one shape"));
        }

        match shape.tag_name().name() {
            "box" => Ok(Geometry::Box {
                size: self.vec3(shape, "size")?.ok_or_else(|| {
                    self.error(shape, "attribute 'size' is required")
                })?,
            }),
            "cylinder" => Ok(Geometry::Cylinder {
                radius: self.required_f64(shape, "radius")?,
                length: self.required_f64(shape, "length")?,
            }),
            "sphere" => Ok(Geometry::Sphere {
                radius: self.required_f64(shape, "radius")?,
            }),
            "mesh" => {
                let filename = self.required(shape, "filename")?;
                let scale = self
                    .vec3(shape, "scale")?
                    .unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
                Ok(Geometry::Mesh {
                    reference: ResourceReference::new(filename, self.resolver.resolve(filename)),
                    scale,
                })
            }
            other => Err(self.error(shape, format!("unsupported geometry <{}>", other))),
        }
    }

    fn parse_material(&self, elem: Node) -> Result<Material, ParseError> {
        let name = self.required(elem, "name")?.to_string();
        let mut color = None;
        let mut texture = None;
        let mut custom = CustomData {
            attributes: unknown_attributes(elem, &["name"]),
            elements: Vec::new(),
        };

        for child in elements(elem) {
            match child.tag_name().name() {
                "color" => color = Some(self.parse_rgba(child)?),
                "texture" => {
                    let filename = self.required(child, "filename")?;
                    texture = Some(ResourceReference::new(
                        filename,
                        self.resolver.resolve(filename),
                    ));
                }
                _ => custom.elements.push(custom_element(child)),
            }
        }

        Ok(Material {
            name,
            color,
            texture,
            custom,
        })
    }

    fn parse_rgba(&self, elem: Node) -> Result<Rgba, ParseError> {
        let value = self.required(elem, "rgba")?;
        let parts = self.floats(elem, "rgba", value)?;
        match parts.as_slice() {
            [r, g, b, a] => Ok([*r, *g, *b, *a]),
            _ => Err(self.error(
                elem,
                format!("attribute 'rgba' needs 4 values, got '{}'", value),
            )),
        }
    }

    fn parse_joint(
        &self,
        elem: Node,
        link_ids: &HashMap<&str, usize>,
    ) -> Result<Joint, ParseError> {
        let name = self.required(elem, "name")?.to_string();
        let type_name = self.required(elem, "type")?;

        let mut parent = None;
        let mut child = None;
        let mut origin = Isometry3::identity();
        let mut axis = Vector3::x();
        let mut limit = None;
        let mut range = PositionRange::default();
        let mut dynamics = None;
        let mut calibration = None;
        let mut safety_controller = None;
        let mut mimic = None;
        let mut custom = CustomData {
            attributes: unknown_attributes(elem, &["name", "type"]),
            elements: Vec::new(),
        };

        for node in elements(elem) {
            match node.tag_name().name() {
                "parent" => parent = Some((node, self.required(node, "link")?)),
                "child" => child = Some((node, self.required(node, "link")?)),
                "origin" => origin = self.parse_origin(node)?,
                "axis" => axis = self.vec3(node, "xyz")?.unwrap_or_else(Vector3::x),
                "limit" => {
                    range = PositionRange {
                        lower: self.optional_f64(node, "lower", 0.0)?,
                        upper: self.optional_f64(node, "upper", 0.0)?,
                    };
                    limit = Some(MotionLimit {
                        effort: self.optional_f64(node, "effort", 0.0)?,
                        velocity: self.optional_f64(node, "velocity", 0.0)?,
                    });
                }
                "dynamics" => {
                    dynamics = Some(Dynamics {
                        damping: self.optional_f64(node, "damping", 0.0)?,
                        friction: self.optional_f64(node, "friction", 0.0)?,
                    })
                }
                "calibration" => {
                    calibration = Some(Calibration {
                        rising: self.maybe_f64(node, "rising")?,
                        falling: self.maybe_f64(node, "falling")?,
                        reference_position: self.maybe_f64(node, "reference_position")?,
                    })
                }
                "safety_controller" => {
                    safety_controller = Some(SafetyController {
                        soft_lower_limit: self.optional_f64(node, "soft_lower_limit", 0.0)?,
                        soft_upper_limit: self.optional_f64(node, "soft_upper_limit", 0.0)?,
                        k_position: self.optional_f64(node, "k_position", 0.0)?,
                        k_velocity: self.required_f64(node, "k_velocity")?,
                    })
                }
                "mimic" => {
                    mimic = Some(Mimic {
                        joint: self.required(node, "joint")?.to_string(),
                        multiplier: self.optional_f64(node, "multiplier", 1.0)?,
                        offset: self.optional_f64(node, "offset", 0.0)?,
                    })
                }
                _ => custom.elements.push(custom_element(node)),
            }
        }

        let unit_axis = || {
            Unit::try_new(axis, f64::EPSILON)
                .ok_or_else(|| self.error(elem, format!("joint '{}' has a zero axis", name)))
        };
        let kind = match type_name {
            "fixed" => JointKind::Fixed,
            "revolute" => JointKind::Revolute {
                axis: unit_axis()?,
                range,
            },
            "continuous" => JointKind::Continuous { axis: unit_axis()? },
            "prismatic" => JointKind::Prismatic {
                axis: unit_axis()?,
                range,
            },
            "planar" => JointKind::Planar {
                normal: unit_axis()?,
            },
            "floating" => JointKind::Floating,
            other => {
                return Err(self.error(elem, format!("unknown joint type '{}'", other)));
            }
        };

        let (parent_node, parent_name) =
            parent.ok_or_else(|| self.error(elem, format!("joint '{}' has no <parent>", name)))?;
        let (child_node, child_name) =
            child.ok_or_else(|| self.error(elem, format!("joint '{}' has no <child>", name)))?;
        let lookup = |node: Node, link: &str| {
            link_ids.get(link).map(|&i| LinkId(i)).ok_or_else(|| {
                self.error(
                    node,
                    format!("joint '{}' references unknown link '{}'", name, link),
                )
            })
        };

        Ok(Joint {
            parent: lookup(parent_node, parent_name)?,
            child: lookup(child_node, child_name)?,
            name: name.clone(),
            kind,
            origin,
            limit,
            dynamics,
            calibration,
            safety_controller,
            mimic,
            custom,
        })
    }

    /// `<origin xyz rpy>`; RPY is applied as fixed-axis roll, then pitch, then yaw
    fn parse_origin(&self, elem: Node) -> Result<Isometry3<f64>, ParseError> {
        let xyz = self.vec3(elem, "xyz")?.unwrap_or_else(Vector3::zeros);
        let rpy = self.vec3(elem, "rpy")?.unwrap_or_else(Vector3::zeros);
        Ok(Isometry3::from_parts(
            Translation3::from(xyz),
            UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
        ))
    }

    fn vec3(&self, elem: Node, attribute: &str) -> Result<Option<Vector3<f64>>, ParseError> {
        let Some(value) = elem.attribute(attribute) else {
            return Ok(None);
        };
        match self.floats(elem, attribute, value)?.as_slice() {
            [x, y, z] => Ok(Some(Vector3::new(*x, *y, *z))),
            _ => Err(self.error(
                elem,
                format!("attribute '{}' needs 3 values, got '{}'", attribute, value),
            )),
        }
    }

    fn floats(&self, elem: Node, attribute: &str, value: &str) -> Result<Vec<f64>, ParseError> {
        value
            .split_whitespace()
            .map(|part| {
                part.parse::<f64>().map_err(|_| {
                    self.error(
                        elem,
                        format!("attribute '{}' has invalid number '{}'", attribute, part),
                    )
                })
            })
            .collect()
    }

    fn required<'a>(&self, elem: Node<'a, '_>, attribute: &str) -> Result<&'a str, ParseError> {
        elem.attribute(attribute)
            .ok_or_else(|| self.error(elem, format!("attribute '{}' is required", attribute)))
    }

    fn maybe_f64(&self, elem: Node, attribute: &str) -> Result<Option<f64>, ParseError> {
        elem.attribute(attribute)
            .map(|value| {
                value.trim().parse::<f64>().map_err(|_| {
                    self.error(
                        elem,
                        format!("attribute '{}' has invalid number '{}'", attribute, value),
                    )
                })
            })
            .transpose()
    }

    fn optional_f64(&self, elem: Node, attribute: &str, default: f64) -> Result<f64, ParseError> {
        Ok(self.maybe_f64(elem, attribute)?.unwrap_or(default))
    }

    fn required_f64(&self, elem: Node, attribute: &str) -> Result<f64, ParseError> {
        self.maybe_f64(elem, attribute)?
            .ok_or_else(|| self.error(elem, format!("attribute '{}' is required", attribute)))
    }

    fn error(&self, elem: Node, message: impl Into<String>) -> ParseError {
        let row = elem.document().text_pos_at(elem.range().start).row;
        ParseError::new(elem.tag_name().name(), message).at_line(row + self.line_offset)
    }
}

fn elements<'a, 'input>(elem: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    elem.children().filter(|n| n.is_element())
}

/// Attributes of `elem` other than the `known` ones
fn unknown_attributes(elem: Node, known: &[&str]) -> Vec<(String, String)> {
    elem.attributes()
        .filter(|a| a.namespace().is_some() || !known.contains(&a.name()))
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

/// Copy an element the converter does not interpret, with everything below it
fn custom_element(elem: Node) -> CustomElement {
    let text: String = elem
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let text = text.trim();
    CustomElement {
        tag: elem.tag_name().name().to_string(),
        attributes: unknown_attributes(elem, &[]),
        text: (!text.is_empty()).then(|| text.to_string()),
        children: elements(elem).map(custom_element).collect(),
    }
}

/// Parse URDF text from a description located in the resolver's source directory
pub fn parse_urdf(xml: &str, resolver: &ResourceResolver) -> Result<ParsedDescription, ParseError> {
    UrdfParser::new(resolver).parse(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use tempfile::TempDir;

    fn parse(xml: &str) -> Result<ParsedDescription, ParseError> {
        let resolver = ResourceResolver::new(std::env::temp_dir());
        parse_urdf(xml, &resolver)
    }

    #[test]
    fn test_parse_simple_urdf() {
        let urdf = r#"
        <?xml version="1.0"?>
        <robot name="test_robot">
            <link name="base_link">
                <visual>
                    <geometry>
                        <box size="1 2 3"/>
                    </geometry>
                </visual>
            </link>
        </robot>
        "#;

        let parsed = parse(urdf).unwrap();
        let robot = parsed.model;
        assert_eq!(robot.name(), "test_robot");
        assert_eq!(robot.links().len(), 1);
        assert_eq!(robot.links()[0].name, "base_link");
        match &robot.links()[0].visuals[0].geometry {
            Geometry::Box { size } => assert_eq!(*size, Vector3::new(1.0, 2.0, 3.0)),
            other => panic!("Expected box geometry, got {:?}", other),
        }
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_parse_joint() {
        let urdf = r#"
        <robot name="test">
            <link name="base"/>
            <link name="link1"/>
            <joint name="joint1" type="revolute">
                <parent link="base"/>
                <child link="link1"/>
                <origin xyz="0 0 0.5" rpy="0 0 1.5707963267948966"/>
                <axis xyz="0 0 2"/>
                <limit lower="-3.14" upper="3.14" effort="100" velocity="1"/>
                <dynamics damping="0.1"/>
                <calibration rising="0.2"/>
                <safety_controller k_velocity="10" soft_lower_limit="-3"/>
            </joint>
        </robot>
        "#;

        let robot = parse(urdf).unwrap().model;
        assert_eq!(robot.joints().len(), 1);
        let joint = &robot.joints()[0];
        assert_eq!(robot.link(joint.parent).name, "base");
        assert_eq!(robot.link(joint.child).name, "link1");
        match &joint.kind {
            JointKind::Revolute { axis, range } => {
                assert_relative_eq!(axis.into_inner(), Vector3::z());
                assert_eq!(range.lower, -3.14);
                assert_eq!(range.upper, 3.14);
            }
            other => panic!("Expected revolute joint, got {:?}", other),
        }
        assert_eq!(joint.limit.unwrap().effort, 100.0);
        assert_eq!(joint.dynamics.unwrap().friction, 0.0);
        assert_eq!(joint.calibration.unwrap().rising, Some(0.2));
        assert_eq!(joint.safety_controller.unwrap().k_velocity, 10.0);
        assert_relative_eq!(joint.origin.translation.vector, Vector3::new(0.0, 0.0, 0.5));
        assert_relative_eq!(joint.origin.rotation.euler_angles().2, FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_rpy_order() {
        let urdf = r#"
        <robot name="test">
            <link name="a"><visual><origin rpy="1.5707963267948966 0 1.5707963267948966"/>
                <geometry><sphere radius="1"/></geometry></visual></link>
        </robot>
        "#;
        let robot = parse(urdf).unwrap().model;
        let origin = robot.links()[0].visuals[0].origin;
        // roll about X first, then yaw about fixed Z
        let y = origin.rotation * Vector3::y();
        assert_relative_eq!(y, Vector3::z(), epsilon = 1e-12);
        let x = origin.rotation * Vector3::x();
        assert_relative_eq!(x, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_missing_name_reports_line() {
        let urdf = "<robot name=\"r\">\n  <link name=\"a\"/>\n  <link/>\n</robot>";
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.element, "link");
        assert_eq!(err.line, Some(3));
        assert!(err.message.contains("name"));
    }

    #[test]
    fn test_leading_whitespace_keeps_line_numbers() {
        let urdf = "\n\n<?xml version=\"1.0\"?>\n<robot name=\"r\">\n<link/>\n</robot>";
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.line, Some(5));
    }

    #[test]
    fn test_duplicate_names() {
        let links = r#"<robot name="r"><link name="a"/><link name="a"/></robot>"#;
        assert!(parse(links).unwrap_err().message.contains("duplicate link"));

        let joints = r#"<robot name="r"><link name="a"/><link name="b"/><link name="c"/>
            <joint name="j" type="fixed"><parent link="a"/><child link="b"/></joint>
            <joint name="j" type="fixed"><parent link="b"/><child link="c"/></joint></robot>"#;
        assert!(parse(joints).unwrap_err().message.contains("duplicate joint"));

        let materials = r#"<robot name="r"><material name="m"/><material name="m"/>
            <link name="a"/></robot>"#;
        assert!(parse(materials).unwrap_err().message.contains("duplicate material"));
    }

    #[test]
    fn test_invalid_joint_type() {
        let urdf = r#"<robot name="r"><link name="a"/><link name="b"/>
            <joint name="j" type="ball"><parent link="a"/><child link="b"/></joint></robot>"#;
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.element, "joint");
        assert!(err.message.contains("ball"));
    }

    #[test]
    fn test_unknown_link_reference() {
        let urdf = r#"<robot name="r"><link name="a"/>
            <joint name="j" type="fixed"><parent link="a"/><child link="ghost"/></joint></robot>"#;
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.element, "child");
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn test_malformed_values() {
        let bad_xyz = r#"<robot name="r"><link name="a"><visual><origin xyz="1 2"/>
            <geometry><sphere radius="1"/></geometry></visual></link></robot>"#;
        assert!(parse(bad_xyz).unwrap_err().message.contains("3 values"));

        let bad_rgba = r#"<robot name="r"><material name="m"><color rgba="1 0 0"/></material>
            <link name="a"/></robot>"#;
        assert!(parse(bad_rgba).unwrap_err().message.contains("4 values"));

        let bad_number = r#"<robot name="r"><link name="a"><visual>
            <geometry><sphere radius="big"/></geometry></visual></link></robot>"#;
        assert!(parse(bad_number).unwrap_err().message.contains("big"));

        let malformed = r#"<robot name="r"><link name="a"></robot>"#;
        assert_eq!(parse(malformed).unwrap_err().element, "xml");
    }

    #[test]
    fn test_inline_and_shared_materials() {
        let urdf = r#"
        <robot name="r">
            <link name="a">
                <visual>
                    <geometry><box size="1 1 1"/></geometry>
                    <material name="red"><color rgba="1 0 0 1"/></material>
                </visual>
            </link>
            <link name="b">
                <visual>
                    <geometry><box size="1 1 1"/></geometry>
                    <material name="red"/>
                </visual>
            </link>
            <joint name="j" type="fixed"><parent link="a"/><child link="b"/></joint>
        </robot>
        "#;
        let parsed = parse(urdf).unwrap();
        assert_eq!(parsed.model.materials().len(), 1);
        assert_eq!(parsed.model.material("red").unwrap().color, Some([1.0, 0.0, 0.0, 1.0]));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_undefined_material_is_error() {
        let urdf = r#"<robot name="r"><link name="a"><visual>
            <geometry><box size="1 1 1"/></geometry><material name="nope"/>
            </visual></link></robot>"#;
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.element, "material");
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("'nope'"));
    }

    #[test]
    fn test_unknown_data_is_kept() {
        let urdf = r#"<robot name="r" generator="cad">
            <link name="a" color_hint="blue">
                <visual name="v" layer="3">
                    <geometry><box size="1 1 1"/></geometry>
                    <sensor_mount frame="cam"/>
                </visual>
                <collision><geometry><sphere radius="1"/></geometry><contact soft="yes"/></collision>
                <gazebo reference="a"><mu1>0.5</mu1><kp value="1e6"/></gazebo>
            </link>
            <link name="b"/>
            <material name="m" finish="matte"><color rgba="1 1 1 1"/><gloss>0.2</gloss></material>
            <joint name="j" type="fixed" stiff="1">
                <parent link="a"/><child link="b"/>
                <hardware bus="can0"/>
            </joint>
            <transmission name="t1"><type>simple</type></transmission>
            <gazebo><plugin name="ctl"/></gazebo>
        </robot>"#;
        let model = parse(urdf).unwrap().model;
        let pair = |k: &str, v: &str| (k.to_string(), v.to_string());

        assert_eq!(model.custom().attributes, vec![pair("generator", "cad")]);
        let top: Vec<&str> = model.custom().elements.iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(top, vec!["transmission", "gazebo"]);
        assert_eq!(model.custom().elements[0].children[0].text.as_deref(), Some("simple"));

        let a = model.link(LinkId(0));
        assert_eq!(a.custom.attributes, vec![pair("color_hint", "blue")]);
        let gazebo = &a.custom.elements[0];
        assert_eq!(gazebo.tag, "gazebo");
        assert_eq!(gazebo.attributes, vec![pair("reference", "a")]);
        assert_eq!(gazebo.text, None);
        assert_eq!(gazebo.children[0].text.as_deref(), Some("0.5"));
        assert_eq!(gazebo.children[1].attributes, vec![pair("value", "1e6")]);

        assert_eq!(a.visuals[0].custom.attributes, vec![pair("layer", "3")]);
        assert_eq!(a.visuals[0].custom.elements[0].tag, "sensor_mount");
        assert_eq!(a.collisions[0].custom.elements[0].tag, "contact");
        assert!(model.link(LinkId(1)).custom.is_empty());

        let m = model.material("m").unwrap();
        assert_eq!(m.custom.attributes, vec![pair("finish", "matte")]);
        assert_eq!(m.custom.elements[0].text.as_deref(), Some("0.2"));

        let j = &model.joints()[0];
        assert_eq!(j.custom.attributes, vec![pair("stiff", "1")]);
        assert_eq!(j.custom.elements[0].attributes, vec![pair("bus", "can0")]);
    }

    #[test]
    fn test_duplicate_transmission_name() {
        let urdf = r#"<robot name="r"><link name="a"/>
            <transmission name="t"/>
            <transmission name="t"/>
        </robot>"#;
        let err = parse(urdf).unwrap_err();
        assert_eq!(err.element, "transmission");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_mesh_resolution_recorded() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("found.stl"), b"solid").unwrap();
        let urdf = r#"<robot name="r"><link name="a">
            <visual><geometry><mesh filename="found.stl" scale="2 2 2"/></geometry></visual>
            <collision><geometry><mesh filename="missing.stl"/></geometry></collision>
            </link></robot>"#;
        let resolver = ResourceResolver::new(temp.path());
        let model = parse_urdf(urdf, &resolver).unwrap().model;
        let link = &model.links()[0];

        match &link.visuals[0].geometry {
            Geometry::Mesh { reference, scale } => {
                assert_eq!(reference.path(), Some(temp.path().join("found.stl").as_path()));
                assert_eq!(*scale, Vector3::new(2.0, 2.0, 2.0));
            }
            other => panic!("Expected mesh geometry, got {:?}", other),
        }
        let missing = link.collisions[0].geometry.mesh_reference().unwrap();
        assert_eq!(missing.authored, "missing.stl");
        assert!(missing.resolved.is_err());
        assert_eq!(model.mesh_paths(), vec![temp.path().join("found.stl")]);
    }

    #[test]
    fn test_joint_defaults() {
        let urdf = r#"<robot name="r"><link name="a"/><link name="b"/>
            <joint name="j" type="prismatic"><parent link="a"/><child link="b"/>
            <mimic joint="k"/></joint></robot>"#;
        let parsed = parse(urdf).unwrap();
        let joint = &parsed.model.joints()[0];
        assert_eq!(joint.kind.axis(), Some(Vector3::x_axis()));
        assert!(joint.limit.is_none());
        let mimic = joint.mimic.as_ref().unwrap();
        assert_eq!(mimic.multiplier, 1.0);
        assert_eq!(mimic.offset, 0.0);
        // mimic target does not exist
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_zero_axis_rejected() {
        let urdf = r#"<robot name="r"><link name="a"/><link name="b"/>
            <joint name="j" type="revolute"><parent link="a"/><child link="b"/>
            <axis xyz="0 0 0"/></joint></robot>"#;
        assert!(parse(urdf).unwrap_err().message.contains("zero axis"));
    }
}
