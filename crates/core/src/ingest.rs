use crate::error::IngestError;
use crate::extractor::{document_stem, PageTextExtractor};
use crate::models::DocumentReport;
use crate::orchestrator::ReconcilePipeline;
use crate::summarize::TableToTextConverter;
use crate::traits::{LayoutExtractor, TableSummarizer};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// A single PDF, or every PDF below a folder.
pub fn collect_inputs(path: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let files = if path.is_file() {
        if is_pdf(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        }
    } else {
        discover_pdf_files(path)
    };

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            path.display()
        )));
    }

    Ok(files)
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub(crate) fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Processes `inputs` one by one and writes `<stem>.md` (and `<stem>.txt`
/// when a converter is given) into `output_dir`. A failing document is
/// recorded as skipped and the batch moves on.
pub async fn run_batch<L, R, S>(
    pipeline: &ReconcilePipeline<L, R>,
    converter: Option<&TableToTextConverter<S>>,
    inputs: &[PathBuf],
    output_dir: &Path,
) -> Result<BatchReport, IngestError>
where
    L: LayoutExtractor,
    R: PageTextExtractor,
    S: TableSummarizer,
{
    if inputs.is_empty() {
        return Err(IngestError::InvalidArgument("no input documents".to_string()));
    }

    tokio::fs::create_dir_all(output_dir).await?;

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in inputs {
        match process_one(pipeline, converter, path, output_dir).await {
            Ok(report) => documents.push(report),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipped pdf");
                skipped_files.push(SkippedPdf {
                    path: path.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        processed = documents.len(),
        skipped = skipped_files.len(),
        "batch finished"
    );

    Ok(BatchReport {
        documents,
        skipped_files,
    })
}

async fn process_one<L, R, S>(
    pipeline: &ReconcilePipeline<L, R>,
    converter: Option<&TableToTextConverter<S>>,
    path: &Path,
    output_dir: &Path,
) -> Result<DocumentReport, IngestError>
where
    L: LayoutExtractor,
    R: PageTextExtractor,
    S: TableSummarizer,
{
    let stem = document_stem(path)?;
    let processed = pipeline.process_document(path).await?;
    let mut report = processed.report;
    report.checksum = Some(digest_file(path)?);

    tokio::fs::write(output_dir.join(format!("{stem}.md")), processed.document.as_str()).await?;

    if let Some(converter) = converter {
        let artifact = converter.document_to_text(&processed.document).await?;
        report.tables_fallback = artifact.fallback_count();
        report.tables_summarized = artifact.outcomes.len() - report.tables_fallback;
        tokio::fs::write(output_dir.join(format!("{stem}.txt")), &artifact.text).await?;
    }

    Ok(report)
}
