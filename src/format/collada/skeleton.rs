use glam::{Mat4, Quat, Vec3};
use log::{debug, info};
use xmltree::Element;

use crate::conversion::{Joint, JointTable, Skeleton};

use super::{
    document,
    error::{ImportError, Result},
};

/// Builds the skeleton below `visual_scene`.
///
/// The first node of type `JOINT` in document order is the root. The walk only descends
/// through joint nodes, and each joint gets the id its identifier has in `table`. The node ids
/// of joints are registered as aliases in the returned skeleton's table, so animation channels
/// can refer to joints by node id.
///
/// Every joint of `table` must be reached from that root. Armatures with several root bones
/// are therefore rejected with [`ImportError::MalformedAsset`] instead of keeping only the
/// first subtree.
pub fn build(mut table: JointTable, visual_scene: &Element, max_depth: usize) -> Result<Skeleton> {
    let root_node = document::descendants(visual_scene, "node")
        .into_iter()
        .find(|node| is_joint(node))
        .ok_or_else(|| ImportError::malformed("visual_scene", "no node of type JOINT"))?;

    let mut builder = Builder {
        table: &mut table,
        slots: Vec::new(),
        max_depth,
    };
    builder.slots.resize(builder.table.len(), None);
    let root = builder.visit(root_node, None, 0)?;

    let slots = builder.slots;
    let mut joints = Vec::with_capacity(slots.len());
    for (id, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(joint) => joints.push(joint),
            None => {
                return Err(ImportError::malformed(
                    "visual_scene",
                    format!(
                        "joint \"{}\" is not part of the hierarchy",
                        table.name(id).unwrap_or_default()
                    ),
                ))
            }
        }
    }

    info!(
        "Built a skeleton of {} joints rooted at \"{}\"",
        joints.len(),
        joints[root].name
    );

    Ok(Skeleton {
        joints,
        table,
        root: Some(root),
    })
}

fn is_joint(node: &Element) -> bool {
    node.attributes.get("type").map(String::as_str) == Some("JOINT")
}

struct Builder<'a> {
    table: &'a mut JointTable,
    slots: Vec<Option<Joint>>,
    max_depth: usize,
}

impl Builder<'_> {
    fn visit(&mut self, node: &Element, parent: Option<usize>, depth: usize) -> Result<usize> {
        if depth >= self.max_depth {
            return Err(ImportError::malformed(
                "node",
                format!("joint hierarchy is deeper than {} levels", self.max_depth),
            ));
        }

        let key = ["sid", "id", "name"]
            .iter()
            .find_map(|attribute| node.attributes.get(*attribute))
            .ok_or_else(|| ImportError::malformed("node", "joint node without identifier"))?;
        let id = self
            .table
            .id(key)
            .ok_or_else(|| ImportError::unknown_joint(key.as_str(), "node"))?;

        // Claim the slot before descending so a repeated joint is caught.
        if self.slots[id].is_some() {
            return Err(ImportError::malformed(
                "node",
                format!("joint \"{}\" appears more than once", key),
            ));
        }
        let name = self.table.name(id).unwrap_or_default().to_string();
        let mut joint = Joint::new(name, node_transform(node)?);
        joint.parent = parent;
        self.slots[id] = Some(joint);

        if let Some(node_id) = node.attributes.get("id") {
            self.table.alias(node_id, id);
        }

        let mut children = Vec::new();
        for child in document::children(node, "node").filter(|child| is_joint(child)) {
            children.push(self.visit(child, Some(id), depth + 1)?);
        }
        if let Some(joint) = self.slots[id].as_mut() {
            joint.children = children;
        }

        debug!("Joint {} \"{}\" at depth {}", id, key, depth);

        Ok(id)
    }
}

/// The local transform of a node: the product of its transformation elements in document
/// order. A node without any has the identity transform.
fn node_transform(node: &Element) -> Result<Mat4> {
    let mut transform = Mat4::IDENTITY;
    for element in document::element_children(node) {
        let values = || document::tokens::<f32>(element);
        let invalid = |expected: usize| {
            ImportError::malformed(
                element.name.as_str(),
                format!("expected {} values", expected),
            )
        };

        let local = match element.name.as_str() {
            "matrix" => document::row_major_matrix(&values()?).ok_or_else(|| invalid(16))?,
            "translate" => match values()?.as_slice() {
                &[x, y, z] => Mat4::from_translation(Vec3::new(x, y, z)),
                _ => return Err(invalid(3)),
            },
            "scale" => match values()?.as_slice() {
                &[x, y, z] => Mat4::from_scale(Vec3::new(x, y, z)),
                _ => return Err(invalid(3)),
            },
            "rotate" => match values()?.as_slice() {
                &[x, y, z, degrees] => {
                    let axis = Vec3::new(x, y, z).normalize_or_zero();
                    if axis == Vec3::ZERO {
                        Mat4::IDENTITY
                    } else {
                        Mat4::from_quat(Quat::from_axis_angle(axis, degrees.to_radians()))
                    }
                }
                _ => return Err(invalid(4)),
            },
            _ => continue,
        };
        transform = transform * local;
    }

    Ok(transform)
}
