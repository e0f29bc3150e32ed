//! Record/playback engine for desktop UI test automation
//!
//! Human mouse and keyboard activity is recorded into a script of steps; playback
//! resolves each step's target on the live screen (coordinates, template images or OCR
//! text) and drives synthetic input, producing a run report.

use std::path::{Path, PathBuf};

pub mod config;
pub mod errors;
pub mod hook;
pub mod hotkeys;
pub mod input;
pub mod keys;
pub mod locator;
pub mod matching;
pub mod ocr;
pub mod playback;
pub mod report;
pub mod screen;
pub mod step;
pub mod store;
#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use errors::{
    ConfigError, HookError, InputError, LocateError, OcrError, ScreenError, StepError,
    StoreError,
};
pub use hook::{HookEvent, InputHook, TimedEvent};
pub use hotkeys::PlaybackHotkeys;
pub use input::{InputDriver, InputSynthesizer, MouseButton, RdevDriver};
pub use locator::{LocatorResolver, Resolution};
pub use matching::{Match, TemplateMatcher};
pub use ocr::{OcrEngine, TesseractOcr, TextBox};
pub use playback::{PlaybackController, PlaybackHandle, PlaybackState};
pub use report::{ReportBuilder, RunReport};
pub use screen::{Screen, Screenshot, XcapScreen};
pub use step::{Action, Locator, Point, Script, Step, Target};
pub use store::{
    FsImageStore, FsReportStore, FsScriptStore, ImageStore, ReportStore, ScriptStore,
    ScriptSummary, StoredReport, StoredScript,
};

/// Layout of the on-disk data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("recorded_images")
    }

    /// Failure screenshots.
    pub fn errors_dir(&self) -> PathBuf {
        self.root.join("errors")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn script_store(&self) -> FsScriptStore {
        FsScriptStore::new(self.scripts_dir())
    }

    pub fn report_store(&self) -> FsReportStore {
        FsReportStore::new(self.reports_dir())
    }

    pub fn image_store(&self) -> FsImageStore {
        FsImageStore::new(self.images_dir())
    }
}
