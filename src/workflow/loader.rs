//! Workflow file loader
//!
//! Load one workflow (YAML, or JSON for `.json` files) or every workflow in
//! a directory.

use std::path::{Path, PathBuf};

use super::Workflow;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("JSON parse error in {file}: {error}")]
    Json {
        file: String,
        error: serde_json::Error,
    },
}

pub struct WorkflowLoader;

impl WorkflowLoader {
    /// Load every `.yaml`, `.yml` and `.json` workflow in `dir`, sorted by
    /// file name. `runner.yaml` is skipped.
    pub fn load_directory(dir: &Path) -> Result<Vec<(PathBuf, Workflow)>, LoadError> {
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            // runner.yaml configures the backends, it is not a flow
            if filename == "runner.yaml" || filename == "runner.yml" {
                continue;
            }

            if matches!(extension(&path).as_deref(), Some("yaml" | "yml" | "json")) {
                paths.push(path);
            }
        }

        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let workflow = Self::load_file(&path)?;
                Ok((path, workflow))
            })
            .collect()
    }

    pub fn load_file(path: &Path) -> Result<Workflow, LoadError> {
        let content = std::fs::read_to_string(path)?;
        let file = path.display().to_string();

        if extension(path).as_deref() == Some("json") {
            Self::from_json(&content).map_err(|error| LoadError::Json { file, error })
        } else {
            Self::from_yaml(&content).map_err(|error| LoadError::Yaml { file, error })
        }
    }

    pub fn from_yaml(content: &str) -> Result<Workflow, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_json(content: &str) -> Result<Workflow, serde_json::Error> {
        serde_json::from_str(content)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
