use glam::{Vec2, Vec3A};
use log::{debug, info, warn};
use xmltree::Element;

use crate::conversion::Vertex;

use super::{
    document::{self, Document, Input},
    error::{check_index, ImportError, Result},
    skin::Influences,
};

/// One of the indexed attribute streams of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    Position,
    Normal,
    TexCoord,
}

impl Semantic {
    /// The name of the `<input>` semantic that indexes this stream in a primitive.
    pub fn input_name(self) -> &'static str {
        match self {
            Semantic::Position => "VERTEX",
            Semantic::Normal => "NORMAL",
            Semantic::TexCoord => "TEXCOORD",
        }
    }
}

/// Positions, normals and UVs as stored in the file, each with its own indexing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RawAttributeStreams {
    pub positions: Vec<Vec3A>,
    pub normals: Vec<Vec3A>,
    pub uvs: Vec<Vec2>,
}

impl RawAttributeStreams {
    /// Resolves the sources referenced by a primitive's inputs. When `flip_uv_v` is set the V
    /// coordinate is stored as `1 - v`.
    pub fn read(document: &Document, inputs: &[Input], flip_uv_v: bool) -> Result<Self> {
        let vertex = document::find_input(inputs, "VERTEX", "triangles")?;
        let vertices = document.resolve("vertices", &vertex.source)?;
        let vertices_inputs = document::inputs(vertices)?;
        let position = document::find_input(&vertices_inputs, "POSITION", "vertices")?;
        let normal = document::find_input(inputs, "NORMAL", "triangles")?;
        let tex_coord = document::find_input(inputs, "TEXCOORD", "triangles")?;

        let positions = source_elements::<3>(document.resolve("source", &position.source)?)?;
        let normals = source_elements::<3>(document.resolve("source", &normal.source)?)?;
        let uvs = source_elements::<2>(document.resolve("source", &tex_coord.source)?)?;

        Ok(Self {
            positions: positions.into_iter().map(Vec3A::from).collect(),
            normals: normals.into_iter().map(Vec3A::from).collect(),
            uvs: uvs
                .into_iter()
                .map(|[u, v]| Vec2::new(u, if flip_uv_v { 1. - v } else { v }))
                .collect(),
        })
    }

    pub fn len(&self, semantic: Semantic) -> usize {
        match semantic {
            Semantic::Position => self.positions.len(),
            Semantic::Normal => self.normals.len(),
            Semantic::TexCoord => self.uvs.len(),
        }
    }

    /// The stream with the most elements. Ties prefer positions, then normals.
    pub fn canonical(&self) -> Semantic {
        let max = self.positions.len().max(self.normals.len()).max(self.uvs.len());
        if max == self.positions.len() {
            Semantic::Position
        } else if max == self.normals.len() {
            Semantic::Normal
        } else {
            Semantic::TexCoord
        }
    }
}

/// Reads the elements of a `<source>`, keeping the first `N` components of each. The element
/// stride comes from the source's accessor, or is `N` without one.
fn source_elements<const N: usize>(source: &Element) -> Result<Vec<[f32; N]>> {
    let values = document::source_floats(source)?;
    let stride = match document::children(source, "technique_common")
        .next()
        .and_then(|technique| document::children(technique, "accessor").next())
        .and_then(|accessor| accessor.attributes.get("stride"))
    {
        Some(stride) => stride.trim().parse().map_err(|_| {
            ImportError::malformed("accessor", format!("invalid stride \"{}\"", stride))
        })?,
        None => N,
    };

    if stride < N || values.len() % stride != 0 {
        return Err(ImportError::malformed(
            "source",
            format!(
                "{} values do not form elements of {} components with stride {}",
                values.len(),
                N,
                stride
            ),
        ));
    }

    Ok(values
        .chunks_exact(stride)
        .map(|chunk| {
            let mut element = [0.; N];
            element.copy_from_slice(&chunk[..N]);
            element
        })
        .collect())
}

/// The raw attribute indices of a single triangle corner.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub position: usize,
    pub normal: usize,
    pub uv: usize,
}

impl Corner {
    pub fn index(&self, semantic: Semantic) -> usize {
        match semantic {
            Semantic::Position => self.position,
            Semantic::Normal => self.normal,
            Semantic::TexCoord => self.uv,
        }
    }
}

/// The triangle corners of a mesh, three per triangle, in draw order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FaceIndexTable {
    pub corners: Vec<Corner>,
}

impl FaceIndexTable {
    /// Appends the corners of a `<triangles>` or all-triangle `<polylist>` element. The offset
    /// of each semantic inside the interleaved `<p>` stream is taken from its inputs.
    pub fn extend_from_primitive(&mut self, primitive: &Element) -> Result<()> {
        let name = primitive.name.as_str();
        let inputs = document::inputs(primitive)?;
        let stride = document::stride(&inputs);
        let offset = |semantic: Semantic| {
            document::find_input(&inputs, semantic.input_name(), name).map(|input| input.offset)
        };
        let offsets = Corner {
            position: offset(Semantic::Position)?,
            normal: offset(Semantic::Normal)?,
            uv: offset(Semantic::TexCoord)?,
        };

        if name == "polylist" {
            let vcount: Vec<usize> = document::tokens(document::child(primitive, "vcount")?)?;
            if let Some(size) = vcount.iter().find(|&&size| size != 3) {
                return Err(ImportError::malformed(
                    "polylist",
                    format!("only triangles are supported, found a polygon of {} sides", size),
                ));
            }
        }

        let p: Vec<usize> = match document::children(primitive, "p").next() {
            Some(p) => document::tokens(p)?,
            None => Vec::new(),
        };
        let count: usize = match primitive.attributes.get("count") {
            Some(count) => count.trim().parse().map_err(|_| {
                ImportError::malformed(name, format!("invalid count \"{}\"", count))
            })?,
            None => p.len() / (stride * 3).max(1),
        };
        let expected = count
            .checked_mul(3)
            .and_then(|corners| corners.checked_mul(stride))
            .ok_or_else(|| {
                ImportError::malformed(name, format!("count {} is too large", count))
            })?;
        if p.len() != expected {
            return Err(ImportError::malformed(
                name,
                format!(
                    "expected {} indices for {} triangles with stride {}, found {}",
                    expected,
                    count,
                    stride,
                    p.len()
                ),
            ));
        }

        self.corners.reserve(p.len() / stride.max(1));
        for indices in p.chunks_exact(stride.max(1)) {
            self.corners.push(Corner {
                position: indices[offsets.position],
                normal: indices[offsets.normal],
                uv: indices[offsets.uv],
            });
        }

        debug!("Read {} triangles from <{}>", count, name);

        Ok(())
    }
}

/// The vertex and index buffers of a mesh after unification.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnifiedMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

/// Converts per-attribute corner indices into one shared index per vertex.
///
/// The stream with the most elements becomes canonical: the output holds exactly one vertex
/// per canonical element, and every corner scatters its attributes into the slot addressed by
/// its canonical index. Corners that share a canonical index but disagree on another attribute
/// collapse into one vertex, the last corner winning. Slots no corner addresses keep default
/// values.
///
/// `influences` is indexed like positions.
pub fn unify(
    streams: &RawAttributeStreams,
    faces: &FaceIndexTable,
    influences: &[Influences],
) -> Result<UnifiedMesh> {
    let canonical = streams.canonical();
    let count = streams.len(canonical);
    info!(
        "Unifying {} positions, {} normals and {} texture coordinates around the {} indices",
        streams.positions.len(),
        streams.normals.len(),
        streams.uvs.len(),
        canonical.input_name()
    );

    let mut vertices = vec![Vertex::default(); count];
    let mut written = vec![false; count];
    let mut collapsed = 0;
    let mut indices = Vec::with_capacity(faces.corners.len());

    for corner in &faces.corners {
        let position = check_index("p/VERTEX", corner.position, streams.positions.len())?;
        let normal = check_index("p/NORMAL", corner.normal, streams.normals.len())?;
        let uv = check_index("p/TEXCOORD", corner.uv, streams.uvs.len())?;
        let influence = influences[check_index("vertex_weights", position, influences.len())?];
        let slot = corner.index(canonical);

        let vertex = Vertex {
            position: streams.positions[position],
            normal: streams.normals[normal],
            uv: streams.uvs[uv],
            joints: influence.joints,
            weights: influence.weights,
        };
        if written[slot] && vertices[slot] != vertex {
            collapsed += 1;
        }
        vertices[slot] = vertex;
        written[slot] = true;

        let index = u32::try_from(slot).map_err(|_| {
            ImportError::malformed("p", format!("vertex index {} does not fit 32 bits", slot))
        })?;
        indices.push(index);
    }

    if collapsed > 0 {
        warn!(
            "{} corners were collapsed into vertices with different attributes",
            collapsed
        );
    }
    let unused = written.iter().filter(|&&written| !written).count();
    if unused > 0 {
        debug!("{} of {} vertices are not referenced by any triangle", unused, count);
    }

    Ok(UnifiedMesh { vertices, indices })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn influence(joint: u32) -> Influences {
        Influences {
            joints: [joint, 0, 0],
            weights: [1., 0., 0.],
        }
    }

    fn corner(position: usize, normal: usize, uv: usize) -> Corner {
        Corner {
            position,
            normal,
            uv,
        }
    }

    #[test]
    fn canonical_stream() {
        let mut streams = RawAttributeStreams {
            positions: vec![Vec3A::ZERO; 4],
            normals: vec![Vec3A::ZERO; 4],
            uvs: vec![Vec2::ZERO; 4],
        };
        assert_eq!(Semantic::Position, streams.canonical());

        streams.uvs.push(Vec2::ZERO);
        assert_eq!(Semantic::TexCoord, streams.canonical());

        streams.normals.extend([Vec3A::ZERO; 1]);
        assert_eq!(Semantic::Normal, streams.canonical());
    }

    #[test]
    fn normal_stream_is_canonical() {
        // 5 positions, 8 normals, 8 UVs: normals win the tie with UVs.
        let streams = RawAttributeStreams {
            positions: (0..5).map(|i| Vec3A::new(i as f32, 0., 0.)).collect(),
            normals: (0..8).map(|i| Vec3A::new(0., i as f32, 0.)).collect(),
            uvs: (0..8).map(|i| Vec2::new(0., i as f32)).collect(),
        };
        let faces = FaceIndexTable {
            corners: vec![
                corner(0, 0, 0),
                corner(1, 1, 1),
                corner(2, 2, 2),
                corner(2, 3, 3),
                corner(3, 4, 4),
                corner(4, 5, 5),
            ],
        };
        let influences: Vec<_> = (0..5).map(influence).collect();

        let mesh = unify(&streams, &faces, &influences).unwrap();

        assert_eq!(8, mesh.vertices.len());
        assert_eq!(vec![0, 1, 2, 3, 4, 5], mesh.indices);
        assert_eq!(Vec3A::new(2., 0., 0.), mesh.vertices[3].position);
        assert_eq!(Vec3A::new(0., 3., 0.), mesh.vertices[3].normal);
        assert_eq!([2, 0, 0], mesh.vertices[3].joints);
        // Slots 6 and 7 are never addressed and keep their defaults.
        assert_eq!(Vertex::default(), mesh.vertices[6]);
        assert_eq!(Vertex::default(), mesh.vertices[7]);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn last_writer_wins() {
        let streams = RawAttributeStreams {
            positions: vec![Vec3A::X, Vec3A::Y],
            normals: vec![Vec3A::Z],
            uvs: vec![Vec2::new(0., 0.), Vec2::new(1., 1.)],
        };
        // Both corners share position 0 but use different UVs.
        let faces = FaceIndexTable {
            corners: vec![corner(0, 0, 0), corner(0, 0, 1), corner(1, 0, 1)],
        };
        let influences = vec![influence(0), influence(1)];

        let mesh = unify(&streams, &faces, &influences).unwrap();

        assert_eq!(2, mesh.vertices.len());
        assert_eq!(vec![0, 0, 1], mesh.indices);
        assert_eq!(Vec2::new(1., 1.), mesh.vertices[0].uv);
    }

    #[test]
    fn index_out_of_range() {
        let streams = RawAttributeStreams {
            positions: vec![Vec3A::X],
            normals: vec![Vec3A::Z],
            uvs: vec![Vec2::ZERO],
        };
        let faces = FaceIndexTable {
            corners: vec![corner(0, 1, 0)],
        };

        assert_eq!(
            Err(ImportError::out_of_range("p/NORMAL", 1, 1)),
            unify(&streams, &faces, &[influence(0)])
        );
        assert_eq!(
            Err(ImportError::out_of_range("vertex_weights", 0, 0)),
            unify(
                &streams,
                &FaceIndexTable {
                    corners: vec![corner(0, 0, 0)]
                },
                &[]
            )
        );
    }

    #[test]
    fn primitive_offsets() {
        // Offsets are declared out of the usual order.
        let triangles = Element::parse(
            r##"<triangles count="1">
                <input semantic="NORMAL" source="#n" offset="0"/>
                <input semantic="TEXCOORD" source="#t" offset="2"/>
                <input semantic="VERTEX" source="#v" offset="1"/>
                <p>10 0 20 11 1 21 12 2 22</p>
            </triangles>"##
                .as_bytes(),
        )
        .unwrap();

        let mut faces = FaceIndexTable::default();
        faces.extend_from_primitive(&triangles).unwrap();

        assert_eq!(
            vec![corner(0, 10, 20), corner(1, 11, 21), corner(2, 12, 22)],
            faces.corners
        );
    }

    #[test]
    fn primitive_missing_semantic() {
        let triangles = Element::parse(
            r##"<triangles count="1">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="NORMAL" source="#n" offset="1"/>
                <p>0 0 1 0 2 0</p>
            </triangles>"##
                .as_bytes(),
        )
        .unwrap();

        let result = FaceIndexTable::default().extend_from_primitive(&triangles);
        assert!(matches!(result, Err(ImportError::MalformedAsset { .. })));
    }

    #[test]
    fn primitive_count_mismatch() {
        let triangles = Element::parse(
            r##"<triangles count="2">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="NORMAL" source="#n" offset="0"/>
                <input semantic="TEXCOORD" source="#t" offset="0"/>
                <p>0 1 2</p>
            </triangles>"##
                .as_bytes(),
        )
        .unwrap();

        let result = FaceIndexTable::default().extend_from_primitive(&triangles);
        assert!(matches!(result, Err(ImportError::MalformedAsset { .. })));
    }

    #[test]
    fn primitive_count_overflow() {
        let triangles = Element::parse(
            r##"<triangles count="18446744073709551615">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="NORMAL" source="#n" offset="0"/>
                <input semantic="TEXCOORD" source="#t" offset="0"/>
                <p>0 0 0</p>
            </triangles>"##
                .as_bytes(),
        )
        .unwrap();

        let result = FaceIndexTable::default().extend_from_primitive(&triangles);
        assert!(matches!(result, Err(ImportError::MalformedAsset { .. })));
    }

    #[test]
    fn polylist_of_triangles() {
        let polylist = Element::parse(
            r##"<polylist count="1">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="NORMAL" source="#n" offset="1"/>
                <input semantic="TEXCOORD" source="#t" offset="1"/>
                <vcount>3</vcount>
                <p>4 0 5 1 6 2</p>
            </polylist>"##
                .as_bytes(),
        )
        .unwrap();

        let mut faces = FaceIndexTable::default();
        faces.extend_from_primitive(&polylist).unwrap();

        assert_eq!(
            vec![corner(4, 0, 0), corner(5, 1, 1), corner(6, 2, 2)],
            faces.corners
        );
    }

    #[test]
    fn polylist_of_quads() {
        let polylist = Element::parse(
            r##"<polylist count="1">
                <input semantic="VERTEX" source="#v" offset="0"/>
                <input semantic="NORMAL" source="#n" offset="0"/>
                <input semantic="TEXCOORD" source="#t" offset="0"/>
                <vcount>4</vcount>
                <p>0 1 2 3</p>
            </polylist>"##
                .as_bytes(),
        )
        .unwrap();

        let result = FaceIndexTable::default().extend_from_primitive(&polylist);
        assert!(matches!(result, Err(ImportError::MalformedAsset { .. })));
    }

    #[test]
    fn accessor_stride() {
        let source = Element::parse(
            r##"<source id="uv">
                <float_array count="6">0 1 9 0.5 0.25 9</float_array>
                <technique_common>
                    <accessor source="#uv-array" count="2" stride="3"/>
                </technique_common>
            </source>"##
                .as_bytes(),
        )
        .unwrap();

        assert_eq!(
            vec![[0., 1.], [0.5, 0.25]],
            source_elements::<2>(&source).unwrap()
        );
        assert!(source_elements::<4>(&source).is_err());
    }
}
