use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a locator into a screen point.
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Unsupported locator strategy: {0}")]
    UnsupportedLocatorStrategy(String),

    #[error("Template image does not exist: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Failed to read template {}: {source}", .path.display())]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Template not found on screen after {attempts} attempt(s): {}", .path.display())]
    ImageNotFound { path: PathBuf, attempts: u32 },

    #[error("OCR did not find text: {0:?}")]
    TextNotFound(String),

    #[error("OCR support is disabled")]
    OcrDisabled,

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Screen capture failed: {0}")]
    Capture(#[from] ScreenError),
}

/// Failure of a single playback step. Always caught at the step boundary.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("Step has no locator and no coordinates")]
    MissingLocator,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Step has a missing or malformed `{field}` field for action {action}")]
    InvalidStep { action: String, field: String },

    #[error("Input dispatch failed: {0}")]
    InputDispatchError(#[from] InputError),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),
}

/// Failure of a low-level input primitive.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to simulate {0}")]
    Simulate(String),

    #[error("No key mapping for {0:?}")]
    UnmappedKey(String),
}

#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("No monitor available")]
    NoMonitor,

    #[error("Platform-specific error: {0}")]
    PlatformError(String),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to run OCR engine: {0}")]
    Engine(String),

    #[error("Failed to parse OCR output: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config is not a JSON object: {0}")]
    NotAnObject(String),
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Input hook failed: {0}")]
    Listen(String),
}
