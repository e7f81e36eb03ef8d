//! Project persistence.
//!
//! A project file is a JSON object whose only recognised field is `assets`,
//! the absolute paths of every media file the project references. Other
//! fields are ignored on load and not written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading or saving a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to access project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Asset paths must be absolute.
    #[error("Asset path is not absolute: {0}")]
    RelativePath(PathBuf),
}

impl ProjectError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The persisted part of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub assets: Vec<PathBuf>,
}

impl ProjectFile {
    pub fn new(assets: Vec<PathBuf>) -> Self {
        Self { assets }
    }

    /// Parses and validates project JSON.
    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        let project: Self = serde_json::from_str(json)?;
        project.validate()?;
        Ok(project)
    }

    /// Serializes the project as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a project file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProjectError::io(path, e))?;
        let project = Self::from_json(&json)?;
        debug!("Loaded project {} with {} assets", path.display(), project.assets.len());
        Ok(project)
    }

    /// Writes the project to disk, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        self.validate()?;
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ProjectError::io(parent, e))?;
            }
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ProjectError::io(path, e))?;
        debug!("Saved project {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<(), ProjectError> {
        match self.assets.iter().find(|p| !p.is_absolute()) {
            Some(relative) => Err(ProjectError::RelativePath(relative.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_ignored() {
        let project =
            ProjectFile::from_json(r#"{"assets":["/media/a.mkv"],"timeline":{"tracks":[]}}"#)
                .unwrap();
        assert_eq!(project.assets, vec![PathBuf::from("/media/a.mkv")]);
    }

    #[test]
    fn test_missing_assets_is_empty() {
        let project = ProjectFile::from_json("{}").unwrap();
        assert!(project.assets.is_empty());
    }

    #[test]
    fn test_relative_path_rejected() {
        let err = ProjectFile::from_json(r#"{"assets":["/ok.mkv","clips/b.mkv"]}"#).unwrap_err();
        assert!(matches!(err, ProjectError::RelativePath(p) if p == Path::new("clips/b.mkv")));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            ProjectFile::from_json("[1, 2]"),
            Err(ProjectError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/project.json");
        let project = ProjectFile::new(vec![
            PathBuf::from("/media/intro.mp4"),
            PathBuf::from("/media/clip with spaces.mkv"),
        ]);

        project.save(&path).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"assets\""));

        assert_eq!(ProjectFile::load(&path).await.unwrap(), project);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectFile::load(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::Io { .. }));
    }
}
