use anyhow::{Context, Result};

use crate::conversion::{Asset, Exporter, Keyframe, Mesh, Scene, Skeleton};

use super::internal::{Skm, SkmJoint, SkmKeyframe, SkmTransform, SkmVertex, NO_PARENT};

#[derive(Default)]
pub struct SkmExporter {}

impl Exporter for SkmExporter {
    fn export(&self, scene: &Scene) -> Result<Vec<Asset>> {
        let skm = Skm {
            name: scene.mesh.name.clone(),
            duration: scene.animation.duration,
            vertices: convert_vertices(&scene.mesh)?,
            indices: scene.mesh.indices.clone(),
            joints: convert_joints(&scene.skeleton)?,
            keyframes: convert_keyframes(&scene.animation.frames, &scene.skeleton)?,
        };

        let name = if !scene.mesh.name.is_empty() {
            &scene.mesh.name
        } else {
            "mesh"
        };
        let asset = Asset::new(skm.to_bytes()?, format!("{}.skm", name));

        Ok(vec![asset])
    }
}

fn convert_vertices(mesh: &Mesh) -> Result<Vec<SkmVertex>> {
    mesh.vertices
        .iter()
        .map(|vertex| {
            let mut joints = [0; 3];
            for (joint, &id) in joints.iter_mut().zip(&vertex.joints) {
                *joint = u16::try_from(id).context("Joint id does not fit in 16 bits")?;
            }

            Ok(SkmVertex {
                position: vertex.position.into(),
                normal: vertex.normal.into(),
                uv: vertex.uv.into(),
                joints,
                weights: vertex.weights,
            })
        })
        .collect()
}

fn convert_joints(skeleton: &Skeleton) -> Result<Vec<SkmJoint>> {
    skeleton
        .joints
        .iter()
        .map(|joint| {
            let parent = match joint.parent {
                Some(parent) => {
                    i16::try_from(parent).context("Parent joint id does not fit in 16 bits")?
                }
                None => NO_PARENT,
            };

            Ok(SkmJoint {
                name: joint.name.clone(),
                parent,
                transform: joint.bind_transform.to_cols_array(),
            })
        })
        .collect()
}

fn convert_keyframes(frames: &[Keyframe], skeleton: &Skeleton) -> Result<Vec<SkmKeyframe>> {
    frames
        .iter()
        .map(|frame| {
            let transforms = frame
                .pose
                .iter()
                .map(|(name, transform)| {
                    let id = skeleton
                        .table
                        .id(name)
                        .with_context(|| format!("The keyframe animates unknown joint {}", name))?;

                    let rotation = transform.rotation;
                    Ok(SkmTransform {
                        joint: u16::try_from(id).context("Joint id does not fit in 16 bits")?,
                        translation: transform.translation.into(),
                        rotation: [rotation.x, rotation.y, rotation.z, rotation.w],
                    })
                })
                .collect::<Result<_>>()?;

            Ok(SkmKeyframe {
                time: frame.time,
                transforms,
            })
        })
        .collect()
}
