use std::io::{Cursor, Read};

use anyhow::{bail, Context, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

const MAGIC: &[u8; 4] = b"SKM1";
pub const NAME_LEN: usize = 64;
/// The parent index stored for the root joint.
pub const NO_PARENT: i16 = -1;

/// Represents an SKM file. The SKM format stores a skinned mesh baked into GPU-ready buffers,
/// together with its joint hierarchy and a keyframe animation. All values are little-endian.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Skm {
    /// The name of the mesh.
    pub name: String,
    /// The duration of the animation, in seconds.
    pub duration: f32,
    pub vertices: Vec<SkmVertex>,
    /// Triangle list indices into `vertices`.
    pub indices: Vec<u32>,
    /// The joints, in id order.
    pub joints: Vec<SkmJoint>,
    /// The keyframes, in ascending time order.
    pub keyframes: Vec<SkmKeyframe>,
}

impl Skm {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);

        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            bail!("Invalid SKM header {:?}", magic);
        }

        let num_vertices = reader.read_u32::<LE>()?;
        let num_indices = reader.read_u32::<LE>()?;
        let num_joints = reader.read_u16::<LE>()?;
        let num_keyframes = reader.read_u32::<LE>()?;

        let mut skm = Self::new();
        skm.duration = reader.read_f32::<LE>()?;
        skm.name = util::read_string(&mut reader, NAME_LEN)?;

        for _ in 0..num_vertices {
            skm.vertices.push(SkmVertex::from_reader(&mut reader)?);
        }
        for _ in 0..num_indices {
            skm.indices.push(reader.read_u32::<LE>()?);
        }
        for _ in 0..num_joints {
            skm.joints.push(SkmJoint::from_reader(&mut reader)?);
        }
        for _ in 0..num_keyframes {
            skm.keyframes.push(SkmKeyframe::from_reader(&mut reader)?);
        }

        Ok(skm)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(MAGIC);
        bytes.write_u32::<LE>(u32::try_from(self.vertices.len()).context("Too many vertices")?)?;
        bytes.write_u32::<LE>(u32::try_from(self.indices.len()).context("Too many indices")?)?;
        bytes.write_u16::<LE>(u16::try_from(self.joints.len()).context("Too many joints")?)?;
        bytes.write_u32::<LE>(
            u32::try_from(self.keyframes.len()).context("Too many keyframes")?,
        )?;
        bytes.write_f32::<LE>(self.duration)?;
        util::write_string(&mut bytes, &self.name, NAME_LEN)?;

        for vertex in &self.vertices {
            vertex.to_bytes(&mut bytes)?;
        }
        for &index in &self.indices {
            bytes.write_u32::<LE>(index)?;
        }
        for joint in &self.joints {
            joint.to_bytes(&mut bytes)?;
        }
        for keyframe in &self.keyframes {
            keyframe.to_bytes(&mut bytes)?;
        }

        Ok(bytes)
    }
}

/// A skinned vertex, influenced by up to three joints.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SkmVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// UV texture coordinates, with the origin at the top left corner.
    pub uv: [f32; 2],
    /// The ids of the influencing joints. Unused slots are zero.
    pub joints: [u16; 3],
    /// The influence weights. Unused slots are zero.
    pub weights: [f32; 3],
}

impl SkmVertex {
    fn from_reader(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let mut vertex = Self::default();

        reader.read_f32_into::<LE>(&mut vertex.position)?;
        reader.read_f32_into::<LE>(&mut vertex.normal)?;
        reader.read_f32_into::<LE>(&mut vertex.uv)?;
        reader.read_u16_into::<LE>(&mut vertex.joints)?;
        reader.read_f32_into::<LE>(&mut vertex.weights)?;

        Ok(vertex)
    }

    fn to_bytes(&self, bytes: &mut Vec<u8>) -> Result<()> {
        let floats = self.position.iter().chain(&self.normal).chain(&self.uv);
        for &value in floats {
            bytes.write_f32::<LE>(value)?;
        }
        for &joint in &self.joints {
            bytes.write_u16::<LE>(joint)?;
        }
        for &weight in &self.weights {
            bytes.write_f32::<LE>(weight)?;
        }

        Ok(())
    }
}

/// A joint of the skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct SkmJoint {
    pub name: String,
    /// The id of the parent joint, or [`NO_PARENT`] for the root.
    pub parent: i16,
    /// The bind-pose transform relative to the parent, in column-major order.
    pub transform: [f32; 16],
}

impl SkmJoint {
    fn from_reader(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let name = util::read_string(reader, NAME_LEN)?;
        let parent = reader.read_i16::<LE>()?;
        let mut transform = [0.; 16];
        reader.read_f32_into::<LE>(&mut transform)?;

        Ok(Self {
            name,
            parent,
            transform,
        })
    }

    fn to_bytes(&self, bytes: &mut Vec<u8>) -> Result<()> {
        util::write_string(bytes, &self.name, NAME_LEN)?;
        bytes.write_i16::<LE>(self.parent)?;
        for &value in &self.transform {
            bytes.write_f32::<LE>(value)?;
        }

        Ok(())
    }
}

impl Default for SkmJoint {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: NO_PARENT,
            transform: glam::Mat4::IDENTITY.to_cols_array(),
        }
    }
}

/// The local transforms of the animated joints at a point in time.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SkmKeyframe {
    /// Seconds since the start of the animation.
    pub time: f32,
    pub transforms: Vec<SkmTransform>,
}

impl SkmKeyframe {
    fn from_reader(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let time = reader.read_f32::<LE>()?;
        let num_transforms = reader.read_u16::<LE>()?;

        let mut transforms = Vec::with_capacity(num_transforms as usize);
        for _ in 0..num_transforms {
            let mut transform = SkmTransform {
                joint: reader.read_u16::<LE>()?,
                ..Default::default()
            };
            reader.read_f32_into::<LE>(&mut transform.translation)?;
            reader.read_f32_into::<LE>(&mut transform.rotation)?;
            transforms.push(transform);
        }

        Ok(Self { time, transforms })
    }

    fn to_bytes(&self, bytes: &mut Vec<u8>) -> Result<()> {
        bytes.write_f32::<LE>(self.time)?;
        bytes.write_u16::<LE>(
            u16::try_from(self.transforms.len()).context("Too many transforms in a keyframe")?,
        )?;

        for transform in &self.transforms {
            bytes.write_u16::<LE>(transform.joint)?;
            for &value in transform.translation.iter().chain(&transform.rotation) {
                bytes.write_f32::<LE>(value)?;
            }
        }

        Ok(())
    }
}

/// The local transform of one joint in a keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct SkmTransform {
    pub joint: u16,
    pub translation: [f32; 3],
    /// A unit quaternion, stored as `x, y, z, w`.
    pub rotation: [f32; 4],
}

impl Default for SkmTransform {
    fn default() -> Self {
        Self {
            joint: 0,
            translation: [0.; 3],
            rotation: [0., 0., 0., 1.],
        }
    }
}

mod util {
    use std::io::{Cursor, Error, ErrorKind, Read, Result, Write};

    /// Reads a fixed-size string field. The string ends at the first zero byte, if any.
    pub fn read_string(reader: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
        let mut bytes = vec![0; len];
        reader.read_exact(&mut bytes)?;

        let end = memchr::memchr(0, &bytes).unwrap_or(len);
        bytes.truncate(end);

        String::from_utf8(bytes).map_err(|error| Error::new(ErrorKind::InvalidData, error))
    }

    /// Writes a fixed-size string field, zero-padded. Longer strings are cut at the last
    /// character boundary that fits.
    pub fn write_string(bytes: &mut Vec<u8>, string: &str, len: usize) -> Result<()> {
        let mut end = usize::min(string.len(), len);
        while !string.is_char_boundary(end) {
            end -= 1;
        }

        bytes.write_all(&string.as_bytes()[..end])?;
        bytes.resize(bytes.len() + len - end, 0);

        Ok(())
    }

}
