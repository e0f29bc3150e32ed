//! File-backed stores under a data directory.
//!
//! ```text
//! <data>/scripts/<uuid>.json
//! <data>/reports/<uuid>.json
//! <data>/recorded_images/click_<millis>.png
//! ```

use super::{ImageStore, ReportStore, ScriptStore, ScriptSummary, StoredReport, StoredScript};
use crate::errors::StoreError;
use crate::report::RunReport;
use crate::step::{Script, Step};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
}

/// Files in `dir` with the given extension. A missing directory is empty.
fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    Ok(files)
}

/// Ids become file names, so anything that could escape the directory is rejected.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}

/// Writes the step list of a script to `path` as a pretty JSON array.
pub fn export_script(script: &Script, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(script)?).map_err(|e| StoreError::io(path, e))?;
    info!("Exported {} steps to {}", script.len(), path.display());
    Ok(())
}

/// Reads steps from a JSON file: either a bare step array or a saved script document
/// with a `steps` array. The file must be valid JSON; the steps are parsed leniently.
pub fn import_script(path: &Path) -> Result<Script, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let doc: Value = serde_json::from_str(&text)?;
    let steps = match doc {
        Value::Object(mut fields) if fields.get("steps").is_some_and(Value::is_array) => {
            fields.remove("steps").unwrap_or_default()
        }
        other => other,
    };
    let script = Script::from_value_lenient(steps);
    info!("Imported {} steps from {}", script.len(), path.display());
    Ok(script)
}

#[derive(Debug, Clone)]
pub struct FsScriptStore {
    dir: PathBuf,
}

impl FsScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Reads a script document. Metadata falls back to defaults and a malformed step
    /// loads as a placeholder, so one hand-edited field never hides the rest.
    fn read_document(&self, path: &Path) -> Result<StoredScript, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let mut doc: Value = serde_json::from_str(&text)?;

        let steps = Script::from_value_lenient(
            doc.get_mut("steps").map(Value::take).unwrap_or(Value::Null),
        );
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let title = doc
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tags = doc
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let created_at = doc
            .get("created_at")
            .cloned()
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
            .unwrap_or_default();

        Ok(StoredScript {
            id,
            title,
            tags,
            created_at,
            steps,
        })
    }
}

impl ScriptStore for FsScriptStore {
    fn save(&self, steps: &[Step], title: &str, tags: &[String]) -> Result<String, StoreError> {
        ensure_dir(&self.dir)?;
        let script = StoredScript {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            tags: tags.to_vec(),
            created_at: Utc::now(),
            steps: Script::new(steps.to_vec()),
        };
        let path = self.path_for(&script.id);
        let json = serde_json::to_string_pretty(&script)?;
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;
        info!("Saved script {} ({} steps) to {}", script.id, steps.len(), path.display());
        Ok(script.id)
    }

    fn load(&self, id: &str) -> Result<StoredScript, StoreError> {
        let path = self.path_for(id);
        if !is_plain_id(id) || !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.read_document(&path)
    }

    fn list(&self) -> Result<Vec<ScriptSummary>, StoreError> {
        let mut summaries = Vec::new();
        for path in files_with_extension(&self.dir, "json")? {
            match self.read_document(&path) {
                Ok(script) => summaries.push(ScriptSummary::from(&script)),
                Err(e) => warn!("Skipping unreadable script {}: {}", path.display(), e),
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

#[derive(Debug, Clone)]
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// The id comes from the file name, so a copied or renamed report stays loadable.
    fn read_document(&self, path: &Path) -> Result<StoredReport, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let report: RunReport = serde_json::from_str(&text)?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(StoredReport { id, report })
    }
}

impl ReportStore for FsReportStore {
    fn save(&self, report: &RunReport) -> Result<String, StoreError> {
        ensure_dir(&self.dir)?;
        let stored = StoredReport {
            id: Uuid::new_v4().to_string(),
            report: report.clone(),
        };
        let path = self.path_for(&stored.id);
        fs::write(&path, serde_json::to_string_pretty(&stored)?)
            .map_err(|e| StoreError::io(&path, e))?;
        debug!("Saved report {} to {}", stored.id, path.display());
        Ok(stored.id)
    }

    fn load(&self, id: &str) -> Result<StoredReport, StoreError> {
        let path = self.path_for(id);
        if !is_plain_id(id) || !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.read_document(&path)
    }

    fn list(&self) -> Result<Vec<StoredReport>, StoreError> {
        let mut reports = Vec::new();
        for path in files_with_extension(&self.dir, "json")? {
            match self.read_document(&path) {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Skipping unreadable report {}: {}", path.display(), e),
            }
        }
        reports.sort_by(|a, b| b.report.created_at.cmp(&a.report.created_at));
        Ok(reports)
    }
}

#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageStore for FsImageStore {
    fn save_template(&self, image: &RgbaImage, timestamp: f64) -> Result<PathBuf, StoreError> {
        ensure_dir(&self.dir)?;
        let millis = (timestamp * 1000.0).round() as i64;
        let mut path = self.dir.join(format!("click_{millis}.png"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("click_{millis}_{n}.png"));
            n += 1;
        }
        image.save_with_format(&path, image::ImageFormat::Png)?;
        debug!("Saved template {}", path.display());
        Ok(path)
    }

    fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        files_with_extension(&self.dir, "png")
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))
    }
}
