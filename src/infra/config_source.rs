use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::application::registry::{ConfigDocument, ConfigSource, ConfigSourceError};

const SOURCE: &str = "infra::config_source";

/// Reads every `*.json` file in a directory, in file name order. A missing
/// directory holds no documents.
#[derive(Debug, Clone)]
pub struct DirectoryConfigSource {
    name: String,
    dir: PathBuf,
}

impl DirectoryConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: dir.display().to_string(),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn error(&self, err: impl std::fmt::Display) -> ConfigSourceError {
        ConfigSourceError::new(self.name.clone(), err.to_string())
    }
}

impl ConfigSource for DirectoryConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_documents(&self) -> Result<Vec<ConfigDocument>, ConfigSourceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(target = SOURCE, dir = %self.dir.display(), "definition directory is missing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.error(err)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| self.error(err))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let text = fs::read_to_string(&path)
                    .map_err(|err| self.error(format!("{}: {err}", path.display())))?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(ConfigDocument { name, text })
            })
            .collect()
    }
}
