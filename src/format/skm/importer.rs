use anyhow::{bail, Context, Result};
use glam::{Mat4, Quat, Vec2, Vec3A};

use crate::conversion::{
    Animation, Asset, Importer, Joint, JointTable, JointTransform, Keyframe, Mesh, Scene,
    Skeleton, Vertex,
};

use super::internal::{Skm, SkmJoint, SkmKeyframe, NO_PARENT};

#[derive(Default)]
pub struct SkmImporter {}

impl Importer for SkmImporter {
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()> {
        let skm = Skm::from_bytes(&asset.bytes)
            .context("Failed to deserialize the bytes of the .skm asset")?;

        let skeleton = convert_joints(&skm.joints)?;
        let frames = convert_keyframes(&skm.keyframes, &skeleton.table)?;
        let mesh = Mesh {
            name: skm.name,
            vertices: skm
                .vertices
                .iter()
                .map(|vertex| Vertex {
                    position: Vec3A::from(vertex.position),
                    normal: Vec3A::from(vertex.normal),
                    uv: Vec2::from(vertex.uv),
                    joints: vertex.joints.map(u32::from),
                    weights: vertex.weights,
                })
                .collect(),
            indices: skm.indices,
        };
        if let Some(&index) = mesh.indices.iter().find(|&&i| i as usize >= mesh.vertices.len()) {
            bail!(
                "Index {} is out of range for {} vertices",
                index,
                mesh.vertices.len()
            );
        }

        *scene = Scene {
            animation: Animation {
                name: mesh.name.clone(),
                duration: skm.duration,
                frames,
            },
            mesh,
            skeleton,
        };

        Ok(())
    }

    fn extensions(&self) -> &[&str] {
        &["skm"]
    }
}

fn convert_joints(skm_joints: &[SkmJoint]) -> Result<Skeleton> {
    let mut joints: Vec<_> = skm_joints
        .iter()
        .map(|joint| Joint::new(joint.name.as_str(), Mat4::from_cols_array(&joint.transform)))
        .collect();

    // Link the joints to their parents.
    let mut root = None;
    for (index, skm_joint) in skm_joints.iter().enumerate() {
        if skm_joint.parent == NO_PARENT {
            if root.replace(index).is_some() {
                bail!("The skeleton has more than one root joint");
            }
            continue;
        }

        let parent = usize::try_from(skm_joint.parent)
            .ok()
            .filter(|&parent| parent < joints.len())
            .with_context(|| format!("Invalid parent joint {}", skm_joint.parent))?;
        joints[index].parent = Some(parent);
        joints[parent].children.push(index);
    }
    if root.is_none() && !joints.is_empty() {
        bail!("The skeleton has no root joint");
    }

    let skeleton = Skeleton {
        table: JointTable::new(joints.iter().map(|joint| joint.name.clone()).collect()),
        joints,
        root,
    };
    if skeleton.depth_first().len() != skeleton.joint_count() {
        bail!("The joint hierarchy is not a tree");
    }

    Ok(skeleton)
}

fn convert_keyframes(skm_keyframes: &[SkmKeyframe], table: &JointTable) -> Result<Vec<Keyframe>> {
    skm_keyframes
        .iter()
        .map(|keyframe| {
            let pose = keyframe
                .transforms
                .iter()
                .map(|transform| {
                    let name = table
                        .name(transform.joint as usize)
                        .with_context(|| format!("Invalid joint {}", transform.joint))?;
                    let [x, y, z, w] = transform.rotation;

                    Ok((
                        name.to_string(),
                        JointTransform {
                            translation: Vec3A::from(transform.translation),
                            rotation: Quat::from_xyzw(x, y, z, w),
                        },
                    ))
                })
                .collect::<Result<_>>()?;

            Ok(Keyframe {
                time: keyframe.time,
                pose,
            })
        })
        .collect()
}
