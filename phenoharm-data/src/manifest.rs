//! Run manifest: where each study table and the relatedness matrix live.
//!
//! ```json
//! {
//!   "studies": [
//!     { "name": "study_1", "url": "https://host/pheno_study_1.txt", "path": "pheno_study_1.txt" },
//!     { "name": "study_2", "path": "local/pheno_study_2.txt" }
//!   ],
//!   "relatedness": { "url": "https://host/grm.phrm", "path": "grm.phrm" },
//!   "subject_column": "subject_id",
//!   "column_descriptions": { "height": "height in cm" }
//! }
//! ```
//!
//! Relative paths resolve against the manifest's directory. Entries with a
//! `url` are downloaded by `phenoharm fetch`; entries without one must exist
//! locally. `phenoharm-cli/manifest.json` is a template for the three-study
//! layout.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A file that may need to be downloaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteFile {
    #[serde(default)]
    pub url: Option<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudySource {
    pub name: String,
    #[serde(flatten)]
    pub file: RemoteFile,
}

fn default_subject_column() -> String {
    "subject_id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub studies: Vec<StudySource>,
    pub relatedness: RemoteFile,
    #[serde(default = "default_subject_column")]
    pub subject_column: String,
    #[serde(default)]
    pub column_descriptions: BTreeMap<String, String>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let mut manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.studies.is_empty() {
            return Err(DataError::NoStudies);
        }
        let mut names = HashSet::new();
        for study in &self.studies {
            if study.name.trim().is_empty() {
                return Err(DataError::InvalidManifest("study with empty name".into()));
            }
            if !names.insert(study.name.as_str()) {
                return Err(DataError::DuplicateStudy(study.name.clone()));
            }
        }
        Ok(())
    }

    /// Resolve a manifest path against the manifest's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn study_paths(&self) -> Vec<(String, PathBuf)> {
        self.studies
            .iter()
            .map(|s| (s.name.clone(), self.resolve(&s.file.path)))
            .collect()
    }

    pub fn relatedness_path(&self) -> PathBuf {
        self.resolve(&self.relatedness.path)
    }
}
