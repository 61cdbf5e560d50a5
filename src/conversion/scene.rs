use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec2, Vec3A};

use super::transform::JointTransform;

/// The number of joint influences stored per vertex.
pub const MAX_INFLUENCES: usize = 3;

/// Represents a skinned, animated model: one mesh, the skeleton that deforms it, and one
/// keyframe animation. It's the intermediary format between conversions.
///
/// Every part is produced together by an importer and replaced together on re-import.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scene {
    pub mesh: Mesh,
    pub skeleton: Skeleton,
    pub animation: Animation,
}

/// Represents the geometry of a skinned mesh, ready to be uploaded as a single vertex buffer
/// with a single index buffer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Mesh {
    /// The name of the mesh.
    pub name: String,
    /// The list of vertices (vertex buffer) of the geometry.
    pub vertices: Vec<Vertex>,
    /// The list of indices (index buffer) of the geometry, one per triangle corner. Every index
    /// is smaller than the number of vertices.
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Flattens the vertices into one array per attribute.
    pub fn to_buffers(&self) -> MeshBuffers {
        let count = self.vertices.len();
        let mut buffers = MeshBuffers {
            positions: Vec::with_capacity(count * 3),
            normals: Vec::with_capacity(count * 3),
            uvs: Vec::with_capacity(count * 2),
            joint_ids: Vec::with_capacity(count * MAX_INFLUENCES),
            weights: Vec::with_capacity(count * MAX_INFLUENCES),
            indices: self.indices.clone(),
        };

        for vertex in &self.vertices {
            buffers.positions.extend_from_slice(&vertex.position.to_array());
            buffers.normals.extend_from_slice(&vertex.normal.to_array());
            buffers.uvs.extend_from_slice(&vertex.uv.to_array());
            buffers.joint_ids.extend_from_slice(&vertex.joints);
            buffers.weights.extend_from_slice(&vertex.weights);
        }

        buffers
    }
}

/// The flat arrays handed to the renderer. Attribute `i` of vertex `v` is at
/// `v * components + i`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub joint_ids: Vec<u32>,
    pub weights: Vec<f32>,
    pub indices: Vec<u32>,
}

/// Represents a skinned vertex of a mesh.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// The position of the vertex in bind pose.
    pub position: Vec3A,
    /// The normal vector of the vertex.
    pub normal: Vec3A,
    /// The UV-mapping texture coordinates of the vertex.
    pub uv: Vec2,
    /// Ids of the influencing joints in the [`Skeleton`]. Unused slots hold joint 0.
    pub joints: [u32; MAX_INFLUENCES],
    /// Influence of each joint. Sums to one, or to zero for a vertex without influences.
    pub weights: [f32; MAX_INFLUENCES],
}

/// The ordered joint names of a skeleton. The position of a name is the stable id of its
/// joint. Node ids of joints can be registered as aliases so that references by either form
/// resolve to the same id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JointTable {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl JointTable {
    /// Builds the table from names in id order. A repeated name keeps its first id.
    pub fn new(names: Vec<String>) -> Self {
        let mut lookup = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            lookup.entry(name.clone()).or_insert(id);
        }

        Self { names, lookup }
    }

    /// Registers another key for an existing joint. Names already in the table are never
    /// shadowed by aliases.
    pub fn alias(&mut self, key: &str, id: usize) {
        if id < self.names.len() {
            self.lookup.entry(key.to_string()).or_insert(id);
        }
    }

    pub fn id(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A joint tree stored as an arena. Joints are indexed by their stable id; links between them
/// are ids, never references, and every joint except the root has exactly one parent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    pub table: JointTable,
    pub root: Option<usize>,
}

impl Skeleton {
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, id: usize) -> Option<&Joint> {
        self.joints.get(id)
    }

    /// Resolves a joint name or registered alias.
    pub fn find(&self, key: &str) -> Option<&Joint> {
        self.table.id(key).and_then(|id| self.joints.get(id))
    }

    /// Ids in depth-first pre-order starting at the root, so parents always come before their
    /// children. The walk visits each id at most once, even on a corrupted arena.
    pub fn depth_first(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.joints.len());
        let mut visited = vec![false; self.joints.len()];
        let mut stack: Vec<usize> = self.root.into_iter().collect();

        while let Some(id) = stack.pop() {
            match visited.get_mut(id) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }
            order.push(id);
            stack.extend(self.joints[id].children.iter().rev());
        }

        order
    }

    /// The bind pose of every joint relative to the model origin, indexed by id.
    pub fn world_bind_transforms(&self) -> Vec<Mat4> {
        self.world_transforms(|_, joint| joint.bind_transform)
    }

    /// Transforms from model space into the space of each joint in bind pose, indexed by id.
    pub fn inverse_bind_transforms(&self) -> Vec<Mat4> {
        self.world_bind_transforms()
            .iter()
            .map(|world| world.inverse())
            .collect()
    }

    /// Composes `parent_world * local` down the tree, with `local` supplied per joint.
    /// Joints unreachable from the root keep the identity.
    pub(crate) fn world_transforms(&self, local: impl Fn(usize, &Joint) -> Mat4) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.joints.len()];
        for id in self.depth_first() {
            let joint = &self.joints[id];
            let parent = joint
                .parent
                .and_then(|parent| world.get(parent).copied())
                .unwrap_or(Mat4::IDENTITY);
            world[id] = parent * local(id, joint);
        }

        world
    }
}

/// Represents a joint of the [`Skeleton`].
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// The name of the joint, as listed in the joint table.
    pub name: String,
    /// The bind pose transform, relative to the parent joint.
    pub bind_transform: Mat4,
    /// The id of the parent joint. Only the root has none.
    pub parent: Option<usize>,
    /// The ids of the children of the joint, in document order.
    pub children: Vec<usize>,
}

impl Joint {
    pub fn new(name: impl Into<String>, bind_transform: Mat4) -> Self {
        Self {
            name: name.into(),
            bind_transform,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Represents a keyframe animation sequence. Frames are sorted by time and the duration is
/// never shorter than the time of the last frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    /// Length of the animation, in seconds.
    pub duration: f32,
    pub frames: Vec<Keyframe>,
}

/// Represents a single keyframe of an animation sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    /// Seconds since the start of the animation.
    pub time: f32,
    /// The local transform of every animated joint, keyed by joint name.
    pub pose: BTreeMap<String, JointTransform>,
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use pretty_assertions::assert_eq;

    use super::*;

    fn skeleton() -> Skeleton {
        // 0 -> 2 -> 1
        let mut joints = vec![
            Joint::new("hip", Mat4::from_translation(Vec3::new(0., 1., 0.))),
            Joint::new("foot", Mat4::from_translation(Vec3::new(0., -0.5, 0.))),
            Joint::new("knee", Mat4::from_translation(Vec3::new(0., -0.5, 0.))),
        ];
        joints[0].children = vec![2];
        joints[2].parent = Some(0);
        joints[2].children = vec![1];
        joints[1].parent = Some(2);

        let mut table = JointTable::new(vec!["hip".into(), "foot".into(), "knee".into()]);
        table.alias("Armature_knee", 2);

        Skeleton {
            joints,
            table,
            root: Some(0),
        }
    }

    #[test]
    fn depth_first_order() {
        assert_eq!(vec![0, 2, 1], skeleton().depth_first());
    }

    #[test]
    fn depth_first_survives_cycles() {
        let mut skeleton = skeleton();
        skeleton.joints[1].children = vec![0];

        assert_eq!(vec![0, 2, 1], skeleton.depth_first());
    }

    #[test]
    fn world_bind_transforms() {
        let world = skeleton().world_bind_transforms();

        assert_eq!(Vec3::new(0., 1., 0.), world[0].w_axis.truncate());
        assert_eq!(Vec3::new(0., 0.5, 0.), world[2].w_axis.truncate());
        assert_eq!(Vec3::new(0., 0., 0.), world[1].w_axis.truncate());
    }

    #[test]
    fn inverse_bind_transforms() {
        let skeleton = skeleton();
        let world = skeleton.world_bind_transforms();
        let inverse = skeleton.inverse_bind_transforms();

        for (w, i) in world.iter().zip(&inverse) {
            assert!((*w * *i).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn find_by_name_and_alias() {
        let skeleton = skeleton();

        assert_eq!("knee", skeleton.find("knee").unwrap().name);
        assert_eq!("knee", skeleton.find("Armature_knee").unwrap().name);
        assert!(skeleton.find("elbow").is_none());
    }

    #[test]
    fn alias_never_shadows_name() {
        let mut table = JointTable::new(vec!["a".into(), "b".into()]);
        table.alias("a", 1);
        table.alias("c", 7);

        assert_eq!(Some(0), table.id("a"));
        assert_eq!(None, table.id("c"));
    }

    #[test]
    fn buffers() {
        let mesh = Mesh {
            name: String::from("goblin"),
            vertices: vec![
                Vertex {
                    position: Vec3A::new(1., 2., 3.),
                    normal: Vec3A::new(0., 1., 0.),
                    uv: Vec2::new(0.5, 0.25),
                    joints: [1, 0, 0],
                    weights: [1., 0., 0.],
                },
                Vertex {
                    position: Vec3A::new(4., 5., 6.),
                    normal: Vec3A::new(0., 0., 1.),
                    uv: Vec2::new(1., 0.),
                    joints: [2, 1, 0],
                    weights: [0.5, 0.5, 0.],
                },
            ],
            indices: vec![0, 1, 1],
        };

        let expected = MeshBuffers {
            positions: vec![1., 2., 3., 4., 5., 6.],
            normals: vec![0., 1., 0., 0., 0., 1.],
            uvs: vec![0.5, 0.25, 1., 0.],
            joint_ids: vec![1, 0, 0, 2, 1, 0],
            weights: vec![1., 0., 0., 0.5, 0.5, 0.],
            indices: vec![0, 1, 1],
        };

        assert_eq!(expected, mesh.to_buffers());
    }
}
