//! Text extraction from uploaded PDFs: the embedded text layer first, then
//! OCR for scans. Tesseract cannot read PDF input, so scanned pages are
//! rasterized with `pdftoppm` and each page image is recognized in order.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ingest::pipeline::{DocumentReader, ExtractError};

/// Below this many non-whitespace characters the text layer is treated as
/// missing (scanned document).
const MIN_TEXT_CHARS: usize = 50;
/// Applies to each external command.
const OCR_TIMEOUT: Duration = Duration::from_secs(90);
/// Arabic first; CVs routinely mix in English names and tools.
const OCR_LANGUAGES: &str = "ara+eng";
const RASTER_DPI: &str = "300";
const PAGE_PREFIX: &str = "page";

#[derive(Clone)]
pub struct TesseractOcr {
    tesseract: String,
    pdftoppm: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(tesseract: String, pdftoppm: String) -> Self {
        Self {
            tesseract,
            pdftoppm,
            timeout: OCR_TIMEOUT,
        }
    }

    pub async fn extract_text(&self, pdf: &[u8]) -> Result<String, ExtractError> {
        let temp_dir = tempfile::Builder::new()
            .prefix("sira-ocr-")
            .tempdir()
            .map_err(|e| ExtractError::Text(format!("could not create OCR temp dir: {e}")))?;

        let input_path: PathBuf = temp_dir.path().join("resume.pdf");
        tokio::fs::write(&input_path, pdf)
            .await
            .map_err(|e| ExtractError::Text(format!("could not stage document for OCR: {e}")))?;

        let mut rasterize = Command::new(&self.pdftoppm);
        rasterize
            .arg("-r")
            .arg(RASTER_DPI)
            .arg("-png")
            .arg(&input_path)
            .arg(temp_dir.path().join(PAGE_PREFIX));
        self.run(rasterize, "pdftoppm").await?;

        let pages = page_images(temp_dir.path()).await?;
        if pages.is_empty() {
            return Err(ExtractError::NoText);
        }
        debug!("Running OCR on {} page(s)", pages.len());

        let mut text = String::new();
        for page in &pages {
            let mut recognize = Command::new(&self.tesseract);
            recognize
                .arg(page)
                .arg("stdout")
                .arg("-l")
                .arg(OCR_LANGUAGES);
            let output = self.run(recognize, "tesseract").await?;
            text.push_str(&String::from_utf8_lossy(&output));
            text.push('\n');
        }
        Ok(text)
    }

    /// Runs one external tool to completion and returns its stdout.
    async fn run(&self, mut command: Command, tool: &str) -> Result<Vec<u8>, ExtractError> {
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| ExtractError::Text(format!("{tool}: {e}")))?,
            Err(_) => return Err(ExtractError::Text(format!("{tool} timed out"))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Text(format!("{tool} failed: {}", stderr.trim())));
        }
        Ok(output.stdout)
    }
}

/// The page images `pdftoppm` wrote into `dir`, first page first.
async fn page_images(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ExtractError::Text(format!("could not list OCR pages: {e}")))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ExtractError::Text(format!("could not list OCR pages: {e}")))?
    {
        paths.push(entry.path());
    }
    Ok(page_order(paths))
}

/// `pdftoppm` zero-pads page numbers to a common width, so name order is
/// page order.
fn page_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut pages: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PAGE_PREFIX))
        })
        .collect();
    pages.sort();
    pages
}

pub fn looks_scanned(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() < MIN_TEXT_CHARS
}

/// `pdf-extract` on the blocking pool, with optional OCR fallback.
pub struct PdfTextReader {
    ocr: Option<TesseractOcr>,
}

impl PdfTextReader {
    pub fn new(ocr: Option<TesseractOcr>) -> Self {
        Self { ocr }
    }
}

#[async_trait]
impl DocumentReader for PdfTextReader {
    async fn read_text(&self, pdf: Bytes) -> Result<String, ExtractError> {
        let layer = {
            let pdf = pdf.clone();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
                .await
                .map_err(|e| ExtractError::Text(format!("text extraction panicked: {e}")))?
        };

        let text = match layer {
            Ok(text) if !looks_scanned(&text) => return Ok(text),
            Ok(text) => {
                debug!("Text layer too thin ({} chars)", text.trim().len());
                text
            }
            Err(e) => {
                warn!("pdf-extract failed: {e}");
                String::new()
            }
        };

        match &self.ocr {
            Some(ocr) => {
                info!("Falling back to OCR");
                ocr.extract_text(&pdf).await
            }
            None if !text.trim().is_empty() => Ok(text),
            None => Err(ExtractError::NoText),
        }
    }
}
