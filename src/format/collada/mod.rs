//! Importer of skinned and animated characters stored as COLLADA (`.dae`) documents.

use anyhow::Context;
use log::info;
use xmltree::Element;

use crate::conversion::{Asset, Importer, JointTable, Mesh, Scene};

pub use self::error::{ImportError, Result};

use self::{
    document::Document,
    geometry::{FaceIndexTable, RawAttributeStreams},
    skin::VertexWeights,
};

pub mod animation;
pub mod document;
mod error;
pub mod geometry;
pub mod skeleton;
pub mod skin;

/// Options controlling how a COLLADA document is imported.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Stores texture coordinates as `(u, 1 - v)`, moving the texture origin from the bottom
    /// left corner to the top left corner.
    pub flip_uv_v: bool,
    /// The deepest joint hierarchy accepted.
    pub max_joint_depth: usize,
    /// Overrides the animation duration declared by the document.
    pub duration: Option<f32>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            flip_uv_v: true,
            max_joint_depth: 128,
            duration: None,
        }
    }
}

#[derive(Default)]
pub struct ColladaImporter {
    options: ImportOptions,
}

impl ColladaImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }
}

impl Importer for ColladaImporter {
    fn import(&self, asset: &Asset, scene: &mut Scene) -> anyhow::Result<()> {
        *scene = parse(&asset.bytes, asset.name(), &self.options)
            .context("Failed to parse the .dae asset")?;

        Ok(())
    }

    fn extensions(&self) -> &[&str] {
        &["dae"]
    }
}

/// Parses a COLLADA document into a scene holding the skinned mesh, its skeleton and its
/// animation. `name` names the mesh, and the animation when the document names none.
pub fn parse(bytes: &[u8], name: &str, options: &ImportOptions) -> Result<Scene> {
    let document = Document::parse(bytes)?;
    let root = document.root();

    let skin = document::descendants(root, "skin")
        .into_iter()
        .find(|skin| match skin.attributes.get("source") {
            Some(source) => document.resolve("geometry", source).is_ok(),
            None => false,
        })
        .ok_or_else(|| ImportError::malformed("library_controllers", "no <skin> of a <geometry>"))?;
    let geometry = document.resolve("geometry", document::attribute(skin, "source")?)?;

    let primitives = primitives(document::child(geometry, "mesh")?)?;
    let streams = RawAttributeStreams::read(
        &document,
        &document::inputs(primitives[0])?,
        options.flip_uv_v,
    )?;
    let mut faces = FaceIndexTable::default();
    for primitive in &primitives {
        faces.extend_from_primitive(primitive)?;
    }

    let table = JointTable::new(skin::read_joint_names(&document, skin)?);
    let influences = skin::reduce(&VertexWeights::read(&document, skin)?, table.len())?;
    let unified = geometry::unify(&streams, &faces, &influences)?;

    let visual_scene = document::first_descendant(root, "library_visual_scenes")
        .and_then(|library| document::child(library, "visual_scene"))?;
    let skeleton = skeleton::build(table, visual_scene, options.max_joint_depth)?;

    let mut animation = animation::sample(&document, &skeleton.table, options.duration)?;
    if animation.name.is_empty() {
        animation.name = name.to_string();
    }

    info!(
        "Imported \"{}\": {} vertices, {} triangles, {} joints, {} keyframes over {}s",
        name,
        unified.vertices.len(),
        unified.indices.len() / 3,
        skeleton.joint_count(),
        animation.frames.len(),
        animation.duration
    );

    Ok(Scene {
        mesh: Mesh {
            name: name.to_string(),
            vertices: unified.vertices,
            indices: unified.indices,
        },
        skeleton,
        animation,
    })
}

/// The triangle primitives of a mesh, in document order. All of them must index the same
/// sources.
fn primitives(mesh: &Element) -> Result<Vec<&Element>> {
    let primitives: Vec<_> = document::element_children(mesh)
        .filter(|element| element.name == "triangles" || element.name == "polylist")
        .collect();

    let first = match primitives.first() {
        Some(first) => document::inputs(first)?,
        None => return Err(ImportError::malformed("mesh", "missing child <triangles>")),
    };
    for primitive in &primitives[1..] {
        let inputs = document::inputs(primitive)?;
        for semantic in ["VERTEX", "NORMAL", "TEXCOORD"] {
            let source = |inputs: &[document::Input]| {
                document::find_input(inputs, semantic, primitive.name.as_str())
                    .map(|input| input.source.clone())
            };
            if source(&first)? != source(&inputs)? {
                return Err(ImportError::malformed(
                    primitive.name.as_str(),
                    format!("the {} input references a different source", semantic),
                ));
            }
        }
    }

    Ok(primitives)
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec2, Vec3, Vec3A};
    use pretty_assertions::assert_eq;

    use super::*;

    /// A quad of two triangles skinned to a two joint leg, with a three keyframe animation.
    const DAE: &str = include_str!("../../../tests/data/leg.dae");

    #[test]
    fn parse_document() {
        let scene = parse(DAE.as_bytes(), "leg", &ImportOptions::default()).unwrap();

        let mesh = &scene.mesh;
        assert_eq!("leg", mesh.name);
        assert_eq!(4, mesh.vertices.len());
        assert_eq!(vec![0, 1, 2, 0, 2, 3], mesh.indices);
        assert_eq!(Vec3A::new(1., 2., 0.), mesh.vertices[2].position);
        assert_eq!(Vec3A::Z, mesh.vertices[3].normal);
        assert_eq!(Vec2::new(1., 1.), mesh.vertices[1].uv);
        assert_eq!([0, 1, 0], mesh.vertices[2].joints);
        assert_eq!([0.5, 0.5, 0.], mesh.vertices[2].weights);
        assert_eq!([1, 0, 0], mesh.vertices[3].joints);
        for vertex in &mesh.vertices {
            assert!((vertex.weights.iter().sum::<f32>() - 1.).abs() < 1e-6);
        }

        let buffers = mesh.to_buffers();
        assert_eq!(12, buffers.positions.len());
        assert_eq!(8, buffers.uvs.len());
        assert_eq!(12, buffers.joint_ids.len());
        assert_eq!(6, buffers.indices.len());

        let skeleton = &scene.skeleton;
        assert_eq!(2, skeleton.joint_count());
        assert_eq!(Some(0), skeleton.root);
        assert_eq!(vec![1], skeleton.joints[0].children);
        assert_eq!(Some(0), skeleton.joints[1].parent);
        assert!(skeleton.inverse_bind_transforms()[1]
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0., -2., 0.)), 1e-6));

        let animation = &scene.animation;
        assert_eq!("Armature", animation.name);
        assert_eq!(1., animation.duration);
        assert_eq!(3, animation.frames.len());
        for frame in &animation.frames {
            assert_eq!(
                vec!["Hip", "Knee"],
                frame.pose.keys().map(String::as_str).collect::<Vec<_>>()
            );
        }
        assert_eq!(
            Vec3A::new(0., 1.5, 0.),
            animation.frames[1].pose["Hip"].translation
        );
    }

    #[test]
    fn keep_uv_origin() {
        let options = ImportOptions {
            flip_uv_v: false,
            ..Default::default()
        };
        let scene = parse(DAE.as_bytes(), "leg", &options).unwrap();

        assert_eq!(Vec2::new(1., 0.), scene.mesh.vertices[1].uv);
    }

    #[test]
    fn duration_override() {
        let options = ImportOptions {
            duration: Some(2.5),
            ..Default::default()
        };
        let scene = parse(DAE.as_bytes(), "leg", &options).unwrap();

        assert_eq!(2.5, scene.animation.duration);
    }

    #[test]
    fn reimport_is_identical() {
        let options = ImportOptions::default();

        assert_eq!(
            parse(DAE.as_bytes(), "leg", &options).unwrap(),
            parse(DAE.as_bytes(), "leg", &options).unwrap()
        );
    }

    #[test]
    fn without_animations() {
        let start = DAE.find("<library_animations>").unwrap();
        let end = DAE.find("</library_animations>").unwrap() + "</library_animations>".len();
        let dae = format!("{}{}", &DAE[..start], &DAE[end..]);

        let scene = parse(dae.as_bytes(), "leg", &ImportOptions::default()).unwrap();

        assert!(scene.animation.frames.is_empty());
        assert_eq!(0., scene.animation.duration);
        assert_eq!("leg", scene.animation.name);
    }

    #[test]
    fn unknown_channel_target() {
        let dae = DAE.replace("Armature_Knee/transform", "Armature_Foot/transform");

        assert_eq!(
            Err(ImportError::unknown_joint("Armature_Foot", "channel")),
            parse(dae.as_bytes(), "leg", &ImportOptions::default())
        );
    }

    #[test]
    fn skin_without_geometry() {
        let dae = DAE.replace(r##"<skin source="#Leg-mesh">"##, r##"<skin source="#Arm-mesh">"##);

        assert!(matches!(
            parse(dae.as_bytes(), "leg", &ImportOptions::default()),
            Err(ImportError::MalformedAsset { .. })
        ));
    }

    #[test]
    fn weight_joint_out_of_range() {
        let dae = DAE.replace("<v>0 0 0 0 0 1 1 1 1 0</v>", "<v>0 0 0 0 0 1 1 1 2 0</v>");

        assert_eq!(
            Err(ImportError::out_of_range("vertex_weights/JOINT", 2, 2)),
            parse(dae.as_bytes(), "leg", &ImportOptions::default())
        );
    }

    const TRIANGLES: &str = r##"<triangles material="Skin-material" count="2">
          <input semantic="VERTEX" source="#Leg-mesh-vertices" offset="0"/>
          <input semantic="NORMAL" source="#Leg-mesh-normals" offset="1"/>
          <input semantic="TEXCOORD" source="#Leg-mesh-map-0" offset="2" set="0"/>
          <p>0 0 0 1 0 1 2 0 2 0 0 0 2 0 2 3 0 3</p>
        </triangles>"##;

    fn single_triangle(normals: &str, p: &str) -> String {
        format!(
            r##"<triangles material="Skin-material" count="1">
          <input semantic="VERTEX" source="#Leg-mesh-vertices" offset="0"/>
          <input semantic="NORMAL" source="#{}" offset="1"/>
          <input semantic="TEXCOORD" source="#Leg-mesh-map-0" offset="2" set="0"/>
          <p>{}</p>
        </triangles>"##,
            normals, p
        )
    }

    #[test]
    fn several_triangle_lists() {
        let triangles = format!(
            "{}{}",
            single_triangle("Leg-mesh-normals", "0 0 0 2 0 2 3 0 3"),
            single_triangle("Leg-mesh-normals", "0 0 0 1 0 1 2 0 2")
        );
        assert!(DAE.contains(TRIANGLES));
        let dae = DAE.replace(TRIANGLES, &triangles);

        let scene = parse(dae.as_bytes(), "leg", &ImportOptions::default()).unwrap();

        assert_eq!(4, scene.mesh.vertices.len());
        assert_eq!(vec![0, 2, 3, 0, 1, 2], scene.mesh.indices);
    }

    #[test]
    fn triangle_lists_with_different_sources() {
        let triangles = format!(
            "{}{}",
            single_triangle("Leg-mesh-normals", "0 0 0 1 0 1 2 0 2"),
            single_triangle("Arm-mesh-normals", "0 0 0 2 0 2 3 0 3")
        );
        let dae = DAE.replace(TRIANGLES, &triangles);

        assert!(matches!(
            parse(dae.as_bytes(), "leg", &ImportOptions::default()),
            Err(ImportError::MalformedAsset { .. })
        ));
    }

    #[test]
    fn failed_import_keeps_scene() {
        let mut scene = Scene::default();
        scene.mesh.name = String::from("previous");
        let dae = DAE.replace("<vcount>1 1 2 1 </vcount>", "<vcount>1 1 2 </vcount>");
        let asset = Asset::new(dae.into_bytes(), "leg.dae");

        assert!(ColladaImporter::default().import(&asset, &mut scene).is_err());
        assert_eq!("previous", scene.mesh.name);
    }

    #[test]
    fn import_asset() {
        let mut scene = Scene::default();
        let asset = Asset::new(DAE.as_bytes().to_vec(), "leg.dae");

        ColladaImporter::default().import(&asset, &mut scene).unwrap();

        assert_eq!("leg", scene.mesh.name);
        assert_eq!(2, scene.skeleton.joint_count());
    }
}
