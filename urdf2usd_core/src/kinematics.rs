//! Kinematic graph validation
//!
//! Confirms that the links and joints of a [`RobotModel`] form one rooted tree
//! and computes every link's transform from the root frame.

use nalgebra::Isometry3;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::RestPose;
use crate::error::KinematicError;
use crate::model::{Joint, JointId, LinkId, RobotModel};

/// Joint positions used for the exported static pose
#[derive(Debug, Clone, Default)]
pub struct RestPositions {
    convention: RestPose,
    overrides: BTreeMap<String, f64>,
}

impl RestPositions {
    pub fn new(convention: RestPose, overrides: BTreeMap<String, f64>) -> Self {
        Self {
            convention,
            overrides,
        }
    }

    /// Position of `joint`: explicit override, then the convention
    pub fn position(&self, joint: &Joint) -> f64 {
        if let Some(position) = self.overrides.get(&joint.name) {
            return *position;
        }
        match self.convention {
            RestPose::Zero => 0.0,
            RestPose::Calibration => joint
                .calibration
                .and_then(|c| c.reference_position)
                .unwrap_or(0.0),
        }
    }
}

/// Validated tree structure with accumulated transforms
#[derive(Debug, Clone)]
pub struct KinematicTree {
    root: LinkId,
    /// Links in depth-first pre-order, root first
    order: Vec<LinkId>,
    parent_joint: Vec<Option<JointId>>,
    child_joints: Vec<Vec<JointId>>,
    world: Vec<Isometry3<f64>>,
}

impl KinematicTree {
    pub fn root(&self) -> LinkId {
        self.root
    }

    /// Parents always come before their children
    pub fn order(&self) -> &[LinkId] {
        &self.order
    }

    pub fn parent_joint(&self, link: LinkId) -> Option<JointId> {
        self.parent_joint[link.0]
    }

    pub fn child_joints(&self, link: LinkId) -> &[JointId] {
        &self.child_joints[link.0]
    }

    /// Transform of the link frame relative to the root frame
    pub fn world(&self, link: LinkId) -> &Isometry3<f64> {
        &self.world[link.0]
    }

    /// Transform of the link frame relative to its parent link frame
    pub fn local(&self, model: &RobotModel, link: LinkId) -> Isometry3<f64> {
        match self.parent_joint(link) {
            Some(joint) => {
                let parent = model.joint(joint).parent;
                self.world(parent).inv_mul(self.world(link))
            }
            None => *self.world(link),
        }
    }
}

/// Validate the joint graph and accumulate link transforms
pub fn build_tree(
    model: &RobotModel,
    rest: &RestPositions,
) -> Result<KinematicTree, KinematicError> {
    let link_count = model.links().len();
    let mut incoming: Vec<Vec<JointId>> = vec![Vec::new(); link_count];
    let mut outgoing: Vec<Vec<JointId>> = vec![Vec::new(); link_count];
    for id in model.joint_ids() {
        let joint = model.joint(id);
        incoming[joint.child.0].push(id);
        outgoing[joint.parent.0].push(id);
    }

    let roots: Vec<LinkId> = model
        .link_ids()
        .filter(|link| incoming[link.0].is_empty())
        .collect();
    let root = match roots.as_slice() {
        [root] => *root,
        [] => return Err(KinematicError::NoRoot(find_loop(model, &incoming))),
        _ => {
            return Err(KinematicError::MultipleRoots(
                roots.iter().map(|l| model.link(*l).name.clone()).collect(),
            ))
        }
    };

    let mut visited = vec![false; link_count];
    let mut parent_joint = vec![None; link_count];
    let mut world = vec![Isometry3::identity(); link_count];
    let mut order = Vec::with_capacity(link_count);
    let mut stack = vec![root];
    visited[root.0] = true;

    while let Some(link) = stack.pop() {
        order.push(link);
        // Reversed so children are visited in declaration order
        for &joint_id in outgoing[link.0].iter().rev() {
            let joint = model.joint(joint_id);
            let child = joint.child;
            if visited[child.0] {
                return Err(KinematicError::Cycle(model.link(child).name.clone()));
            }
            visited[child.0] = true;
            parent_joint[child.0] = Some(joint_id);
            world[child.0] =
                world[link.0] * joint.origin * joint.kind.motion(rest.position(joint));
            stack.push(child);
        }
    }

    let disconnected: Vec<String> = model
        .link_ids()
        .filter(|link| !visited[link.0])
        .map(|link| model.link(link).name.clone())
        .collect();
    if !disconnected.is_empty() {
        return Err(KinematicError::DisconnectedLink(disconnected));
    }

    debug!(
        "Kinematic tree rooted at '{}' with {} links",
        model.link(root).name,
        order.len()
    );

    Ok(KinematicTree {
        root,
        order,
        parent_joint,
        child_joints: outgoing,
        world,
    })
}

/// Follow parent pointers from the first link until a link repeats
fn find_loop(model: &RobotModel, incoming: &[Vec<JointId>]) -> Vec<String> {
    if model.links().is_empty() {
        return Vec::new();
    }
    let mut seen = Vec::new();
    let mut current = LinkId(0);
    loop {
        if let Some(start) = seen.iter().position(|l| *l == current) {
            let mut names: Vec<String> = seen[start..]
                .iter()
                .map(|l: &LinkId| model.link(*l).name.clone())
                .collect();
            names.push(model.link(current).name.clone());
            return names;
        }
        seen.push(current);
        match incoming[current.0].first() {
            Some(joint) => current = model.joint(*joint).parent,
            None => return seen.iter().map(|l| model.link(*l).name.clone()).collect(),
        }
    }
}
