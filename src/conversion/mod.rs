use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use log::{error, info, warn};

pub use self::{
    asset::Asset,
    pose::{sample, skinning_matrices, Pose, TimeWrap},
    scene::{
        Animation, Joint, JointTable, Keyframe, Mesh, MeshBuffers, Scene, Skeleton, Vertex,
        MAX_INFLUENCES,
    },
    transform::{rotation_from_matrix, JointTransform},
};

use crate::format::{
    collada::{ColladaImporter, ImportOptions},
    skm::{SkmExporter, SkmImporter},
};

mod asset;
mod pose;
mod scene;
mod transform;

/// Defines a type that can import asset files into a scene.
pub trait Importer {
    /// Imports an asset file into a scene. On failure the scene is left untouched.
    fn import(&self, asset: &Asset, scene: &mut Scene) -> Result<()>;
    /// Returns the file extensions supported by the importer. These extensions are used to
    /// select the appropriate importer given an asset file.
    ///
    /// The extension should not include the period (e.g "zip", not ".zip").
    fn extensions(&self) -> &[&str];
}

/// Defines a type that can export a scene into asset files.
pub trait Exporter {
    /// Exports a scene into one or more asset files.
    fn export(&self, scene: &Scene) -> Result<Vec<Asset>>;
}

/// Imports any supported input format and writes it with a fixed set of exporters.
pub struct Converter {
    /// The display name of the output asset format.
    pub name: &'static str,
    importers: Vec<Box<dyn Importer>>,
    exporters: Vec<Box<dyn Exporter>>,
}

impl Converter {
    /// Converts every file into `out_path`. Files that fail to import or export are reported
    /// and skipped. Returns the number of assets written.
    pub fn convert(&self, files: &[PathBuf], out_path: &Path) -> usize {
        let importers: HashMap<_, _> = self
            .importers
            .iter()
            .flat_map(|importer| {
                importer
                    .extensions()
                    .iter()
                    .map(move |ext| (ext.to_string(), importer))
            })
            .collect();

        if let Err(err) = fs::create_dir_all(out_path) {
            error!("Failed to create the output directory: {}", err);
            return 0;
        }

        let mut written = 0;
        for file in files {
            let asset = match Asset::from_path(file) {
                Ok(asset) => asset,
                Err(err) => {
                    error!("{:#}", err);
                    continue;
                }
            };

            let importer = match importers.get(&asset.extension().to_lowercase()) {
                Some(importer) => importer,
                None => {
                    warn!(
                        "Skipped \"{}.{}\": unsupported extension",
                        asset.name(),
                        asset.extension()
                    );
                    continue;
                }
            };

            let mut scene = Scene::default();
            if let Err(err) = importer.import(&asset, &mut scene) {
                error!(
                    "Failed to import \"{}.{}\": {:#}",
                    asset.name(),
                    asset.extension(),
                    err
                );
                continue;
            }
            info!("Imported \"{}.{}\"", asset.name(), asset.extension());

            for exporter in &self.exporters {
                match exporter.export(&scene) {
                    Ok(assets) => {
                        for asset in assets {
                            if write_asset(&asset, out_path) {
                                written += 1;
                            }
                        }
                    }
                    Err(err) => error!("Failed to export the scene: {:#}", err),
                }
            }
        }

        written
    }
}

/// Writes an exported asset, appending a random suffix to its name if the file already exists.
fn write_asset(asset: &Asset, out_path: &Path) -> bool {
    let mut path = out_path.join(asset.path());
    if path.exists() {
        let uid = uuid::Uuid::new_v4().to_simple().to_string();
        path = out_path.join(format!(
            "{}_{}.{}",
            asset.name(),
            &uid[..uid.len() / 2],
            asset.extension()
        ));
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("<INVALID NAME>")
        .to_string();
    match fs::write(&path, &asset.bytes) {
        Ok(_) => {
            info!("Exported \"{}\" successfully!", file_name);
            true
        }
        Err(err) => {
            error!("Failed to export \"{}\": {}", file_name, err);
            false
        }
    }
}

/// Returns all converters available. Import behavior is configured by `options`.
pub fn converters(options: &ImportOptions) -> Vec<Converter> {
    vec![Converter {
        name: ".SKM (baked skinned model)",
        importers: vec![
            Box::new(ColladaImporter::new(options.clone())),
            Box::new(SkmImporter::default()),
        ],
        exporters: vec![Box::new(SkmExporter::default())],
    }]
}
