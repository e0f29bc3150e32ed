//! OCR seam used by text locators.

use crate::errors::OcrError;
use crate::step::Point;
use image::RgbaImage;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, instrument};

/// A recognized word or line with its bounding box in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl TextBox {
    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2, self.top + self.height / 2)
    }
}

/// Turns an image into text boxes, in reading order.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TextBox>, OcrError>;
}

/// First box whose text contains `needle`. No ranking: OCR order wins.
pub fn find_text<'a>(boxes: &'a [TextBox], needle: &str) -> Option<&'a TextBox> {
    boxes.iter().find(|b| b.text.contains(needle))
}

/// Runs the `tesseract` command and reads its word-level TSV output.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
    language: Option<String>,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            language: None,
        }
    }
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific tesseract binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Language pack passed as `-l`, e.g. `eng+chi_sim`.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

impl OcrEngine for TesseractOcr {
    #[instrument(level = "debug", skip(self, image))]
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TextBox>, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("retrace-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::Engine(format!("Failed to write OCR input: {e}")))?;

        let mut command = Command::new(&self.program);
        command.arg(input.path()).arg("stdout");
        if let Some(language) = &self.language {
            command.arg("-l").arg(language);
        }
        command.arg("tsv");

        let output = command.output().map_err(|e| {
            OcrError::Engine(format!("Failed to start {}: {e}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(OcrError::Engine(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let boxes = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        debug!("OCR produced {} text boxes", boxes.len());
        Ok(boxes)
    }
}

/// Parses tesseract TSV (`level page_num block_num par_num line_num word_num left top
/// width height conf text`). Rows without text are skipped.
pub fn parse_tsv(tsv: &str) -> Result<Vec<TextBox>, OcrError> {
    let mut lines = tsv.lines();
    let header = lines
        .next()
        .ok_or_else(|| OcrError::Parse("empty output".to_string()))?;
    let columns: Vec<&str> = header.split('\t').collect();
    let index = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| OcrError::Parse(format!("missing column `{name}`")))
    };
    let (left, top, width, height, conf, text) = (
        index("left")?,
        index("top")?,
        index("width")?,
        index("height")?,
        index("conf")?,
        index("text")?,
    );

    let mut boxes = Vec::new();
    for (row, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        let Some(word) = fields.get(text).map(|s| s.trim()) else {
            continue;
        };
        if word.is_empty() {
            continue;
        }
        let number = |i: usize| -> Result<i32, OcrError> {
            fields
                .get(i)
                .and_then(|s| s.trim().parse::<i32>().ok())
                .ok_or_else(|| OcrError::Parse(format!("bad geometry on row {}", row + 2)))
        };
        boxes.push(TextBox {
            text: word.to_string(),
            left: number(left)?,
            top: number(top)?,
            width: number(width)?,
            height: number(height)?,
            confidence: fields
                .get(conf)
                .and_then(|s| s.trim().parse::<f32>().ok())
                .unwrap_or(-1.0),
        });
    }
    Ok(boxes)
}
