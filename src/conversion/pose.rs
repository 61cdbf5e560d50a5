use std::collections::BTreeMap;

use glam::Mat4;

use super::{
    scene::{Animation, Skeleton},
    transform::JointTransform,
};

/// The local transform of each animated joint at one instant, keyed by joint name.
pub type Pose = BTreeMap<String, JointTransform>;

/// What happens when the sampled time leaves `[0, duration]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWrap {
    Clamp,
    Repeat,
}

/// Interpolates the pose of `animation` at `time` seconds.
pub fn sample(animation: &Animation, time: f32, wrap: TimeWrap) -> Pose {
    let frames = &animation.frames;
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Pose::new(),
    };

    let time = match wrap {
        _ if animation.duration <= 0. || !time.is_finite() => 0.,
        TimeWrap::Clamp => time.clamp(0., animation.duration),
        TimeWrap::Repeat => time.rem_euclid(animation.duration),
    };

    if time <= first.time {
        return first.pose.clone();
    }
    if time >= last.time {
        return last.pose.clone();
    }

    // `first.time < time < last.time`, so both neighbours exist.
    let next = frames.partition_point(|frame| frame.time <= time);
    let (from, to) = (&frames[next - 1], &frames[next]);
    let span = to.time - from.time;
    let progress = if span > 0. {
        (time - from.time) / span
    } else {
        0.
    };

    let mut pose: Pose = to.pose.clone();
    for (name, transform) in &from.pose {
        let blended = match to.pose.get(name) {
            Some(target) => transform.interpolate(target, progress),
            None => *transform,
        };
        pose.insert(name.clone(), blended);
    }

    pose
}

/// Joint matrices for vertex skinning, indexed by joint id: the animated world transform of
/// each joint relative to its bind pose. Joints missing from `pose` stay in bind pose.
pub fn skinning_matrices(skeleton: &Skeleton, pose: &Pose) -> Vec<Mat4> {
    let world = skeleton.world_transforms(|_, joint| {
        pose.get(&joint.name)
            .map(JointTransform::to_matrix)
            .unwrap_or(joint.bind_transform)
    });

    world
        .iter()
        .zip(skeleton.inverse_bind_transforms())
        .map(|(world, inverse_bind)| *world * inverse_bind)
        .collect()
}
