use std::io::{Cursor, Write};
use std::process::{Command, Stdio};

use image::{DynamicImage, ImageFormat};

use super::ExtractionError;
use crate::config::OcrConfig;

/// A local OCR engine. Receives JPEG bytes and returns recognised lines in
/// reading order.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, jpeg: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Tesseract invoked as a subprocess (CPU only), reading the image from
/// stdin and writing plain text to stdout.
pub struct TesseractCli {
    command: String,
    language: String,
}

impl TesseractCli {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            language: config.language.clone(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, jpeg: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExtractionError::OcrUnavailable(format!("{}: {e}", self.command)))?;

        // stdin is closed before waiting so the child sees EOF, and the child
        // is always reaped, even when the write fails.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(jpeg),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .map_err(|e| ExtractionError::OcrProcessing(e.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", self.command, output.status)
            } else {
                stderr
            };
            return Err(ExtractionError::OcrProcessing(reason));
        }
        if let Err(e) = written {
            let reason = if stderr.is_empty() { e.to_string() } else { stderr };
            return Err(ExtractionError::OcrProcessing(reason));
        }

        Ok(split_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn split_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode any supported image, drop alpha, and re-encode as JPEG.
pub fn normalize_image(bytes: &[u8]) -> Result<Vec<u8>, ExtractionError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb).write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

pub fn extract_text(engine: &dyn OcrEngine, bytes: &[u8]) -> Result<String, ExtractionError> {
    let jpeg = normalize_image(bytes)?;
    let lines = engine.recognize(&jpeg)?;
    tracing::debug!(lines = lines.len(), "OCR finished");
    Ok(lines.join("\n"))
}
