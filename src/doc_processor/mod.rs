pub mod ocr;
pub mod pdf;
pub mod tabular;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::view::{Notice, UploadView};
use ocr::OcrEngine;

/// Extensions the upload surface accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "csv", "png", "jpg", "jpeg", "txt"];

const TRENDS_NOTICE: &str = "Once you upload more reports, we'll show your health trends here.";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("PDF parse error: {0}")]
    PdfParsing(String),

    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("Error tokenizing data. Expected {expected} fields in line {line}, saw {found}")]
    CsvFieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("No columns to parse from file")]
    EmptyCsv,

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Text encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Extraction worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for ExtractionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExtractionError::Worker(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Csv,
    Text,
    Image,
    Unsupported,
}

impl FileKind {
    /// Classify by the filename's extension, case-insensitively.
    pub fn from_filename(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "csv" => FileKind::Csv,
            "txt" => FileKind::Text,
            "png" | "jpg" | "jpeg" => FileKind::Image,
            _ => FileKind::Unsupported,
        }
    }
}

/// Raw upload; dropped once the request that carried it completes.
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Routes each upload to exactly one extraction path.
#[derive(Clone)]
pub struct DocProcessor {
    ocr: Arc<dyn OcrEngine>,
}

impl DocProcessor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    pub async fn process(&self, doc: UploadedDocument) -> UploadView {
        let kind = FileKind::from_filename(&doc.filename);
        let mut view = UploadView::new(doc.filename.clone(), kind);

        tracing::info!(filename = %doc.filename, ?kind, size = doc.bytes.len(), "Processing upload");

        match kind {
            FileKind::Pdf => self.process_pdf(doc.bytes, &mut view).await,
            FileKind::Csv => process_csv(&doc.bytes, &mut view),
            FileKind::Text => process_text(doc.bytes, &mut view),
            FileKind::Image => self.process_image(doc.bytes, &mut view).await,
            FileKind::Unsupported => {
                view.notify(Notice::warning("Unsupported file type uploaded."));
                return view;
            }
        }

        if view.has_errors() {
            tracing::warn!(filename = %view.filename, ?kind, "Extraction failed");
        }
        view.notify(Notice::info(TRENDS_NOTICE));
        view
    }

    async fn process_pdf(&self, bytes: Vec<u8>, view: &mut UploadView) {
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&bytes)).await;
        match pages.map_err(ExtractionError::from).and_then(|r| r) {
            Ok(pages) => {
                view.notify(Notice::success("Extraction complete!"));
                match pdf::join_pages(&pages) {
                    Some(text) => view.extracted_text = Some(text),
                    None => view.notify(Notice::warning("No readable text found.")),
                }
            }
            Err(e) => view.notify(Notice::error(format!("Error reading PDF file: {e}"))),
        }
    }

    async fn process_image(&self, bytes: Vec<u8>, view: &mut UploadView) {
        let engine = Arc::clone(&self.ocr);
        let text = tokio::task::spawn_blocking(move || ocr::extract_text(engine.as_ref(), &bytes)).await;
        match text.map_err(ExtractionError::from).and_then(|r| r) {
            Ok(text) => {
                view.notify(Notice::success("Text extraction complete!"));
                view.extracted_text = Some(text);
            }
            Err(e) => view.notify(Notice::error(format!("Failed to extract text: {e}"))),
        }
    }
}

fn process_csv(bytes: &[u8], view: &mut UploadView) {
    let report = match tabular::TabularReport::parse(bytes) {
        Ok(report) => report,
        Err(e) => {
            view.notify(Notice::error(format!("Error reading CSV file: {e}")));
            return;
        }
    };

    match report.to_csv() {
        Ok(csv_text) => view.extracted_text = Some(csv_text),
        Err(e) => {
            view.notify(Notice::error(format!("Error reading CSV file: {e}")));
            return;
        }
    }

    let charts = report.charts();
    view.charts = charts.charts;
    if let Some(warning) = charts.warning {
        view.notify(Notice::warning(warning));
    }
    view.table = Some(report);
}

fn process_text(bytes: Vec<u8>, view: &mut UploadView) {
    match text::decode(bytes) {
        Ok(content) => view.extracted_text = Some(content),
        Err(e) => view.notify(Notice::error(format!("Error reading text file: {e}"))),
    }
}
