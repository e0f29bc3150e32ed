//! Persistence seams for scripts, run reports and template images.
//!
//! The engine never opens files on its own: every store is constructed by the caller and
//! passed in. [`fs`] holds the on-disk implementations, [`memory`] in-process ones.

pub mod fs;
pub mod memory;

use crate::errors::StoreError;
use crate::report::RunReport;
use crate::step::{Script, Step};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub use fs::{export_script, import_script, FsImageStore, FsReportStore, FsScriptStore};
pub use memory::{MemoryImageStore, MemoryReportStore, MemoryScriptStore};

/// A saved script with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScript {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub steps: Script,
}

/// Listing entry; steps are not kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptSummary {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub step_count: usize,
}

impl From<&StoredScript> for ScriptSummary {
    fn from(script: &StoredScript) -> Self {
        Self {
            id: script.id.clone(),
            title: script.title.clone(),
            tags: script.tags.clone(),
            created_at: script.created_at,
            step_count: script.steps.len(),
        }
    }
}

pub trait ScriptStore: Send + Sync {
    /// Persists a new script and returns its id.
    fn save(&self, steps: &[Step], title: &str, tags: &[String]) -> Result<String, StoreError>;

    fn load(&self, id: &str) -> Result<StoredScript, StoreError>;

    /// All scripts, newest first.
    fn list(&self) -> Result<Vec<ScriptSummary>, StoreError>;

    fn load_latest(&self) -> Result<Option<StoredScript>, StoreError> {
        match self.list()?.into_iter().next() {
            Some(summary) => self.load(&summary.id).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored script with its steps.
    fn load_all(&self) -> Result<Vec<StoredScript>, StoreError> {
        self.list()?
            .iter()
            .map(|summary| self.load(&summary.id))
            .collect()
    }
}

/// A saved run report with the id it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: String,
    #[serde(flatten)]
    pub report: RunReport,
}

pub trait ReportStore: Send + Sync {
    /// Persists a report and returns its id.
    fn save(&self, report: &RunReport) -> Result<String, StoreError>;

    fn load(&self, id: &str) -> Result<StoredReport, StoreError>;

    /// All reports, newest first.
    fn list(&self) -> Result<Vec<StoredReport>, StoreError>;
}

pub trait ImageStore: Send + Sync {
    /// Stores a template captured at `timestamp` (epoch seconds) and returns the path a
    /// locator should reference.
    fn save_template(&self, image: &RgbaImage, timestamp: f64) -> Result<PathBuf, StoreError>;

    fn list(&self) -> Result<Vec<PathBuf>, StoreError>;

    fn remove(&self, path: &Path) -> Result<(), StoreError>;
}

fn basename(path: &str) -> Option<&str> {
    Path::new(path).file_name().and_then(|n| n.to_str())
}

/// Scripts with an image locator whose template has file name `name`.
pub fn scripts_using<'a>(name: &str, scripts: &'a [StoredScript]) -> Vec<&'a StoredScript> {
    scripts
        .iter()
        .filter(|script| {
            script
                .steps
                .image_references()
                .any(|reference| basename(reference) == Some(name))
        })
        .collect()
}

/// Images no script refers to. References are compared by file name only, so a script
/// moved together with its images still counts.
pub fn unreferenced(images: &[PathBuf], scripts: &[StoredScript]) -> Vec<PathBuf> {
    let referenced: HashSet<&str> = scripts
        .iter()
        .flat_map(|script| script.steps.image_references())
        .filter_map(basename)
        .collect();
    images
        .iter()
        .filter(|image| {
            image
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |name| !referenced.contains(name))
        })
        .cloned()
        .collect()
}
