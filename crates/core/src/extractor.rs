use crate::error::IngestError;
use crate::page_markdown::{page_runs, render_page};
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Raw-text pass: one text blob per 1-based page.
#[async_trait]
pub trait PageTextExtractor: Send + Sync {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[async_trait]
impl<T: PageTextExtractor + ?Sized> PageTextExtractor for Box<T> {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        (**self).extract_pages(path).await
    }
}

pub(crate) fn document_stem(path: &Path) -> Result<String, IngestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Reads each page's content stream and renders it as markdown, aligned
/// columns becoming pipe tables.
#[derive(Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn load_pages(path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, page_id) in document.get_pages() {
            let text = match page_runs(&document, page_id) {
                Ok(runs) if !runs.is_empty() => render_page(&runs),
                Ok(_) => plain_text(&document, page_no)?,
                Err(error) => {
                    warn!(page = page_no, error = %error, "positioned text unavailable, using plain text");
                    plain_text(&document, page_no)?
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

fn plain_text(document: &Document, page_no: u32) -> Result<String, IngestError> {
    document
        .extract_text(&[page_no])
        .map_err(|error| IngestError::PdfParse(error.to_string()))
}

#[async_trait]
impl PageTextExtractor for LopdfExtractor {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load_pages(&path))
            .await
            .map_err(|error| IngestError::PdfParse(format!("pdf text task failed: {error}")))?
    }
}

/// Reads page text dumped by an external extractor as `<stem>.pages.md`,
/// pages separated by form feeds.
pub struct SidecarPageText {
    directory: Option<PathBuf>,
}

impl SidecarPageText {
    pub const SUFFIX: &'static str = "pages.md";

    /// Sidecars live in `directory`, or next to each PDF when `None`.
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory }
    }

    pub fn sidecar_path(&self, pdf: &Path) -> Result<PathBuf, IngestError> {
        let file_name = format!("{}.{}", document_stem(pdf)?, Self::SUFFIX);
        Ok(match &self.directory {
            Some(directory) => directory.join(file_name),
            None => pdf.with_file_name(file_name),
        })
    }
}

#[async_trait]
impl PageTextExtractor for SidecarPageText {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let sidecar = self.sidecar_path(path)?;
        let text = tokio::fs::read_to_string(&sidecar).await?;
        let pages = split_form_feed(&text);

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "page text sidecar has no readable text: {}",
                sidecar.display()
            )));
        }

        Ok(pages)
    }
}

/// Page `n` is the `n`th form-feed separated chunk; blank pages are skipped
/// without renumbering the rest.
pub fn split_form_feed(text: &str) -> Vec<PageText> {
    text.split('\u{000c}')
        .enumerate()
        .filter_map(|(index, chunk)| {
            let trimmed = chunk.trim_matches(|ch| ch == '\n' || ch == '\r');
            if trimmed.trim().is_empty() {
                None
            } else {
                Some(PageText {
                    number: (index + 1) as u32,
                    text: trimmed.to_string(),
                })
            }
        })
        .collect()
}
