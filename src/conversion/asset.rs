use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// An asset file held in memory: its raw bytes and the path it was read from or will be
/// written to.
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
    path: PathBuf,
}

impl Asset {
    pub fn new(bytes: Vec<u8>, path: impl Into<PathBuf>) -> Self {
        Self {
            bytes,
            path: path.into(),
        }
    }

    /// Reads the whole file at `path`. This is the only I/O performed on the import side;
    /// importers work on the loaded bytes.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read the asset \"{}\"", path.display()))?;

        Ok(Self::new(bytes, path))
    }

    /// Get a reference to the asset's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file name without its extension. Empty if the path has no valid unicode stem.
    pub fn name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    /// The extension without the period. Empty if the path has none.
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn name_and_extension() {
        let asset = Asset::new(Vec::new(), "./models/goblin.DAE");

        assert_eq!("goblin", asset.name());
        assert_eq!("DAE", asset.extension());
    }

    #[test]
    fn no_extension() {
        let asset = Asset::new(Vec::new(), "goblin");

        assert_eq!("goblin", asset.name());
        assert_eq!("", asset.extension());
    }
}
