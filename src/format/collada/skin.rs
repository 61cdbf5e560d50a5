use log::{info, warn};
use xmltree::Element;

use crate::conversion::MAX_INFLUENCES;

use super::{
    document::{self, Document},
    error::{check_index, ImportError, Result},
};

/// The fixed influences of a single vertex. Unused slots are `(joint 0, weight 0)`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Influences {
    pub joints: [u32; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

/// The sparse influence data of `<vertex_weights>`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VertexWeights {
    /// The number of influences of each vertex, in vertex order.
    pub vcount: Vec<usize>,
    /// Interleaved index tuples, one per influence.
    pub v: Vec<usize>,
    /// The weight values the WEIGHT indices point into.
    pub weights: Vec<f32>,
    pub joint_offset: usize,
    pub weight_offset: usize,
    /// The number of indices per influence tuple.
    pub stride: usize,
}

impl VertexWeights {
    pub fn read(document: &Document, skin: &Element) -> Result<Self> {
        let vertex_weights = document::child(skin, "vertex_weights")?;
        let inputs = document::inputs(vertex_weights)?;
        let joint = document::find_input(&inputs, "JOINT", "vertex_weights")?;
        let weight = document::find_input(&inputs, "WEIGHT", "vertex_weights")?;

        Ok(Self {
            vcount: document::tokens(document::child(vertex_weights, "vcount")?)?,
            v: document::tokens(document::child(vertex_weights, "v")?)?,
            weights: document::source_floats(document.resolve("source", &weight.source)?)?,
            joint_offset: joint.offset,
            weight_offset: weight.offset,
            stride: document::stride(&inputs),
        })
    }
}

/// Reads the skin's joint name table. The position of each name is the id of its joint.
pub fn read_joint_names(document: &Document, skin: &Element) -> Result<Vec<String>> {
    let joints = document::child(skin, "joints")?;
    let inputs = document::inputs(joints)?;
    let joint = document::find_input(&inputs, "JOINT", "joints")?;
    let source = document.resolve("source", &joint.source)?;

    let array = document::children(source, "Name_array")
        .chain(document::children(source, "IDREF_array"))
        .next()
        .ok_or_else(|| ImportError::malformed("source", "missing <Name_array>"))?;

    Ok(document::names(array))
}

/// Produces exactly [`MAX_INFLUENCES`] influences per vertex, in vertex order.
///
/// Vertices with fewer influences are padded with zero weights. Vertices with more keep the
/// first influences in file order, not the strongest ones, and have those weights
/// renormalized to sum to one.
pub fn reduce(weights: &VertexWeights, joint_count: usize) -> Result<Vec<Influences>> {
    let stride = weights.stride;
    let indices = weights
        .vcount
        .iter()
        .try_fold(0usize, |total, &count| total.checked_add(count))
        .and_then(|total| total.checked_mul(stride));
    match indices {
        Some(indices) if indices == weights.v.len() && stride > 0 => {}
        Some(indices) => {
            return Err(ImportError::malformed(
                "vertex_weights",
                format!(
                    "vcount declares {} indices, but <v> holds {} indices",
                    indices,
                    weights.v.len()
                ),
            ))
        }
        None => {
            return Err(ImportError::malformed(
                "vertex_weights",
                "vcount declares more influences than can be addressed",
            ))
        }
    }

    let mut influences = Vec::with_capacity(weights.vcount.len());
    let mut truncated = 0;
    let mut start = 0;
    for &count in &weights.vcount {
        let tuples = &weights.v[start * stride..(start + count) * stride];
        start += count;

        let mut vertex = Influences::default();
        for (slot, tuple) in tuples.chunks_exact(stride).take(MAX_INFLUENCES).enumerate() {
            let joint = check_index(
                "vertex_weights/JOINT",
                tuple[weights.joint_offset],
                joint_count,
            )?;
            let weight = check_index(
                "vertex_weights/WEIGHT",
                tuple[weights.weight_offset],
                weights.weights.len(),
            )?;

            vertex.joints[slot] = joint as u32;
            vertex.weights[slot] = weights.weights[weight];
        }

        if count > MAX_INFLUENCES {
            truncated += 1;
            let sum: f32 = vertex.weights.iter().sum();
            if sum > 0. {
                vertex.weights.iter_mut().for_each(|weight| *weight /= sum);
            }
        }

        influences.push(vertex);
    }

    info!("Parsed the influences of {} vertices", influences.len());
    if truncated > 0 {
        warn!(
            "{} vertices have more than {} influences and were truncated",
            truncated, MAX_INFLUENCES
        );
    }

    Ok(influences)
}
