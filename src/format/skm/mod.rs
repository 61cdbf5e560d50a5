pub use self::{exporter::SkmExporter, importer::SkmImporter};

mod exporter;
mod importer;
mod internal;
