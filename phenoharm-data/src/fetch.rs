//! One-time download of the walkthrough's input files.
//!
//! Files are fetched sequentially with a blocking client and skipped when
//! already present. Downloads land in a `.part` sibling and are renamed
//! into place once complete.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::DataError;
use crate::manifest::{Manifest, RemoteFile};
use crate::relatedness::{sample_ids_path, RelatednessFormat};

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    AlreadyPresent,
    Downloaded { bytes: u64 },
}

pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Download `url` to `path` unless `path` already exists.
    pub fn fetch_if_missing(&self, url: Option<&str>, path: &Path) -> Result<FetchOutcome> {
        if path.exists() {
            info!("{} already present, skipping download", path.display());
            return Ok(FetchOutcome::AlreadyPresent);
        }
        let url = url.ok_or_else(|| DataError::MissingSource(path.display().to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        info!("Downloading {} -> {}", url, path.display());
        let mut resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;

        let bytes = persist(&mut resp, path)?;
        info!("Downloaded {} bytes to {}", bytes, path.display());
        Ok(FetchOutcome::Downloaded { bytes })
    }

    fn fetch_remote(&self, manifest: &Manifest, file: &RemoteFile) -> Result<(PathBuf, FetchOutcome)> {
        let path = manifest.resolve(&file.path);
        let outcome = self.fetch_if_missing(file.url.as_deref(), &path)?;
        Ok((path, outcome))
    }

    /// Fetch every study table, then the relatedness matrix (and the
    /// sample-ID sidecar of a MatrixMarket file).
    pub fn fetch_all(&self, manifest: &Manifest) -> Result<Vec<(PathBuf, FetchOutcome)>> {
        let mut results = Vec::with_capacity(manifest.studies.len() + 2);
        for study in &manifest.studies {
            results.push(self.fetch_remote(manifest, &study.file)?);
        }
        results.push(self.fetch_remote(manifest, &manifest.relatedness)?);

        let grm_path = manifest.relatedness_path();
        if RelatednessFormat::detect(&grm_path) == RelatednessFormat::MatrixMarket {
            let ids_url = manifest
                .relatedness
                .url
                .as_ref()
                .map(|u| format!("{}.sampleIDs.txt", u));
            let ids_path = sample_ids_path(&grm_path);
            let outcome = self.fetch_if_missing(ids_url.as_deref(), &ids_path)?;
            results.push((ids_path, outcome));
        }
        Ok(results)
    }
}

/// Stream `reader` into `<path>.part`, then rename it to `path`. The
/// `.part` file is removed if either step fails.
fn persist(reader: &mut impl Read, path: &Path) -> Result<u64> {
    let part = part_path(path);
    let result = write_part(reader, &part).and_then(|bytes| {
        std::fs::rename(&part, path)
            .with_context(|| format!("Failed to move {} into place", part.display()))?;
        Ok(bytes)
    });
    if result.is_err() && part.exists() {
        if let Err(e) = std::fs::remove_file(&part) {
            warn!("Could not remove partial download {}: {}", part.display(), e);
        }
    }
    result
}

fn write_part(reader: &mut impl Read, part: &Path) -> Result<u64> {
    let mut file = std::fs::File::create(part)
        .with_context(|| format!("Failed to create {}", part.display()))?;
    let bytes = std::io::copy(reader, &mut file)
        .with_context(|| format!("Failed to write {}", part.display()))?;
    file.flush()
        .with_context(|| format!("Failed to write {}", part.display()))?;
    Ok(bytes)
}

fn part_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}
