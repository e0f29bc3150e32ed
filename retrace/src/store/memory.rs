//! In-process stores for tests and dry runs.

use super::{ImageStore, ReportStore, ScriptStore, ScriptSummary, StoredReport, StoredScript};
use crate::errors::StoreError;
use crate::report::RunReport;
use crate::step::{Script, Step};
use chrono::Utc;
use image::RgbaImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryScriptStore {
    scripts: Mutex<Vec<StoredScript>>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptStore for MemoryScriptStore {
    fn save(&self, steps: &[Step], title: &str, tags: &[String]) -> Result<String, StoreError> {
        let script = StoredScript {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            tags: tags.to_vec(),
            created_at: Utc::now(),
            steps: Script::new(steps.to_vec()),
        };
        let id = script.id.clone();
        self.scripts.lock().unwrap_or_else(|e| e.into_inner()).push(script);
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<StoredScript, StoreError> {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ScriptSummary>, StoreError> {
        let scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        // Insertion order is creation order.
        Ok(scripts.iter().rev().map(ScriptSummary::from).collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved reports in save order.
    pub fn reports(&self) -> Vec<RunReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|stored| stored.report.clone())
            .collect()
    }
}

impl ReportStore for MemoryReportStore {
    fn save(&self, report: &RunReport) -> Result<String, StoreError> {
        let stored = StoredReport {
            id: Uuid::new_v4().to_string(),
            report: report.clone(),
        };
        let id = stored.id.clone();
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stored);
        Ok(id)
    }

    fn load(&self, id: &str) -> Result<StoredReport, StoreError> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|stored| stored.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<StoredReport>, StoreError> {
        let reports = self.reports.lock().unwrap_or_else(|e| e.into_inner());
        Ok(reports.iter().rev().cloned().collect())
    }
}

/// Keeps templates in memory under synthetic `memory/click_<millis>.png` paths.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: Mutex<BTreeMap<PathBuf, RgbaImage>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<RgbaImage> {
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

impl ImageStore for MemoryImageStore {
    fn save_template(&self, image: &RgbaImage, timestamp: f64) -> Result<PathBuf, StoreError> {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        let millis = (timestamp * 1000.0).round() as i64;
        let mut path = PathBuf::from(format!("memory/click_{millis}.png"));
        let mut n = 1;
        while images.contains_key(&path) {
            path = PathBuf::from(format!("memory/click_{millis}_{n}.png"));
            n += 1;
        }
        images.insert(path.clone(), image.clone());
        Ok(path)
    }

    fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self
            .images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))
    }
}
