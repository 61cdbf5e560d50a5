use std::collections::BTreeMap;

use glam::Mat4;
use log::{debug, info, warn};
use xmltree::Element;

use crate::conversion::{Animation, JointTable, JointTransform, Keyframe};

use super::{
    document::{self, Document},
    error::{ImportError, Result},
};

/// The matrix samples of one animated joint.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// The joint name, as listed in the joint table.
    pub joint: String,
    pub times: Vec<f32>,
    /// One local transform per timestamp.
    pub transforms: Vec<Mat4>,
}

/// Builds the animation timeline of the document. A document without animations yields an
/// empty timeline.
///
/// The duration is `duration` when given, otherwise the end of the first
/// `<animation_clip>`, otherwise the time of the last keyframe. It is never shorter than the
/// time of the last keyframe.
pub fn sample(document: &Document, table: &JointTable, duration: Option<f32>) -> Result<Animation> {
    let root = document.root();
    let frames = match document::children(root, "library_animations").next() {
        Some(library) => keyframes(&read_channels(document, library, table)?)?,
        None => {
            info!("The document has no animations");
            Vec::new()
        }
    };

    let clip = document::children(root, "library_animation_clips")
        .next()
        .and_then(|clips| document::children(clips, "animation_clip").next());
    let declared = match (duration, clip) {
        (Some(duration), _) => Some(duration),
        (None, Some(clip)) => clip_end(clip)?,
        (None, None) => None,
    };
    let name = clip
        .into_iter()
        .chain(document::descendants(root, "animation"))
        .find_map(|element| element.attributes.get("name").or_else(|| element.attributes.get("id")))
        .cloned()
        .unwrap_or_default();

    Ok(Animation {
        name,
        duration: resolve_duration(&frames, declared),
        frames,
    })
}

fn clip_end(clip: &Element) -> Result<Option<f32>> {
    match clip.attributes.get("end") {
        Some(end) => match end.trim().parse::<f32>() {
            Ok(end) if end.is_finite() => Ok(Some(end)),
            _ => Err(ImportError::malformed(
                "animation_clip",
                format!("invalid end \"{}\"", end),
            )),
        },
        None => Ok(None),
    }
}

/// Reads every `<channel>` below `library`, nested animation containers included.
pub fn read_channels(
    document: &Document,
    library: &Element,
    table: &JointTable,
) -> Result<Vec<Channel>> {
    document::descendants(library, "channel")
        .into_iter()
        .map(|channel| {
            let target = document::attribute(channel, "target")?;
            let node = target.split('/').next().unwrap_or_default();
            let joint = table
                .id(node)
                .and_then(|id| table.name(id))
                .ok_or_else(|| ImportError::unknown_joint(node, "channel"))?;

            let sampler = document.resolve("sampler", document::attribute(channel, "source")?)?;
            let inputs = document::inputs(sampler)?;
            let input = document::find_input(&inputs, "INPUT", "sampler")?;
            let output = document::find_input(&inputs, "OUTPUT", "sampler")?;

            let times = document::source_floats(document.resolve("source", &input.source)?)?;
            if let Some(time) = times.iter().find(|time| !time.is_finite()) {
                return Err(ImportError::malformed(
                    "source",
                    format!("invalid timestamp {} in \"{}\"", time, input.source),
                ));
            }

            let values = document::source_floats(document.resolve("source", &output.source)?)?;
            if values.len() % 16 != 0 {
                return Err(ImportError::malformed(
                    "source",
                    format!(
                        "{} values in \"{}\" are not a multiple of 16",
                        values.len(),
                        output.source
                    ),
                ));
            }
            let transforms = values
                .chunks_exact(16)
                .filter_map(document::row_major_matrix)
                .collect();

            debug!("Channel for joint \"{}\" targets \"{}\"", joint, target);

            Ok(Channel {
                joint: joint.to_string(),
                times,
                transforms,
            })
        })
        .collect()
}

/// Groups the channel samples by timestamp into one keyframe per timestamp, sorted by time.
///
/// The timestamps of the first channel are authoritative for every channel.
pub fn keyframes(channels: &[Channel]) -> Result<Vec<Keyframe>> {
    let times = match channels.first() {
        Some(channel) => &channel.times,
        None => return Ok(Vec::new()),
    };

    for channel in channels {
        if channel.transforms.len() != times.len() {
            return Err(ImportError::malformed(
                "channel",
                format!(
                    "expected {} transforms for joint \"{}\", found {}",
                    times.len(),
                    channel.joint,
                    channel.transforms.len()
                ),
            ));
        }
        if &channel.times != times {
            warn!(
                "The timestamps of joint \"{}\" differ from the first channel and are ignored",
                channel.joint
            );
        }
    }

    let mut frames: Vec<_> = times
        .iter()
        .enumerate()
        .map(|(index, &time)| Keyframe {
            time,
            pose: channels
                .iter()
                .map(|channel| {
                    let transform = JointTransform::from_matrix(&channel.transforms[index]);
                    (channel.joint.clone(), transform)
                })
                .collect::<BTreeMap<_, _>>(),
        })
        .collect();
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));

    info!(
        "Sampled {} keyframes for {} channels",
        frames.len(),
        channels.len()
    );

    Ok(frames)
}

/// Picks the timeline duration: `declared` unless it ends before the last keyframe.
pub fn resolve_duration(frames: &[Keyframe], declared: Option<f32>) -> f32 {
    let last = frames.last().map(|frame| frame.time).unwrap_or(0.);
    match declared {
        Some(duration) if duration >= last => duration,
        Some(duration) => {
            warn!(
                "The declared duration {} ends before the last keyframe at {}",
                duration, last
            );
            last
        }
        None => last,
    }
}
