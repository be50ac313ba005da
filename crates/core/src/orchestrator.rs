use crate::candidates::TableCandidateExtractor;
use crate::column_fix::ColumnArtifactFixer;
use crate::detector::ExtendedTableGroupDetector;
use crate::error::ReconcileError;
use crate::extractor::{PageText, PageTextExtractor};
use crate::ingest::generate_document_id;
use crate::layout::LayoutMarkdownPreprocessor;
use crate::models::{Document, DocumentReport, ExtendedTableGroup, GroupOutcome, MergedTable, PipelineOptions};
use crate::page_store::PageTextStore;
use crate::reconstruct::reconstruct;
use crate::splice::DocumentSplicer;
use crate::traits::LayoutExtractor;
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub struct ProcessedDocument {
    pub document: Document,
    pub report: DocumentReport,
}

/// Result of the extraction-free core: the spliced document and one outcome per detected group.
#[derive(Debug)]
pub struct Reconciliation {
    pub document: Document,
    pub groups: Vec<GroupOutcome>,
    pub page_count: usize,
}

pub struct ReconcilePipeline<L, R>
where
    L: LayoutExtractor,
    R: PageTextExtractor,
{
    layout: L,
    pages: R,
    options: PipelineOptions,
    fixer: ColumnArtifactFixer,
    preprocessor: LayoutMarkdownPreprocessor,
    detector: ExtendedTableGroupDetector,
    candidates: Arc<TableCandidateExtractor>,
    splicer: DocumentSplicer,
}

impl<L, R> ReconcilePipeline<L, R>
where
    L: LayoutExtractor,
    R: PageTextExtractor,
{
    pub fn new(layout: L, pages: R, options: PipelineOptions) -> Result<Self, ReconcileError> {
        Ok(Self {
            fixer: ColumnArtifactFixer::from_options(&options)?,
            preprocessor: LayoutMarkdownPreprocessor::new()?,
            detector: ExtendedTableGroupDetector::new(&options)?,
            candidates: Arc::new(TableCandidateExtractor::new(&options)?),
            splicer: DocumentSplicer::new(options.table_format),
            layout,
            pages,
            options,
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn process_document(&self, path: &Path) -> Result<ProcessedDocument, ReconcileError> {
        info!(path = %path.display(), "processing document");

        let layout = &self.layout;
        let layout_markdown = self
            .with_retry("layout", move || async move {
                layout.extract_layout(path).await.map_err(|error| error.to_string())
            })
            .await?;

        let pages = &self.pages;
        let raw_pages = self
            .with_retry("raw text", move || async move {
                pages.extract_pages(path).await.map_err(|error| error.to_string())
            })
            .await?;

        let reconciliation = self.reconcile_markdown(&layout_markdown, raw_pages).await?;

        let report = DocumentReport {
            document_id: generate_document_id(path),
            source_path: path.to_string_lossy().to_string(),
            checksum: None,
            page_count: reconciliation.page_count,
            groups: reconciliation.groups,
            tables_summarized: 0,
            tables_fallback: 0,
            processed_at: Utc::now(),
        };

        info!(
            path = %path.display(),
            reconciled = report.reconciled_groups(),
            failed = report.failed_groups(),
            "document reconciled"
        );

        Ok(ProcessedDocument {
            document: reconciliation.document,
            report,
        })
    }

    /// Detects, reconciles and splices without calling any extraction service.
    pub async fn reconcile_markdown(
        &self,
        layout_markdown: &str,
        raw_pages: Vec<PageText>,
    ) -> Result<Reconciliation, ReconcileError> {
        let store = Arc::new(PageTextStore::from_raw_pages(raw_pages, &self.fixer));
        let layout = self.preprocessor.preprocess(layout_markdown);
        let groups = self.detector.detect(&layout.markdown);

        debug!(
            layout_pages = layout.pages.len(),
            text_pages = store.len(),
            groups = groups.len(),
            "extended tables detected"
        );

        let results = self.reconcile_groups(&groups, &store).await;

        let mut outcomes = Vec::with_capacity(groups.len());
        let mut spliced_groups = Vec::new();
        let mut tables = Vec::new();

        for (group, result) in groups.into_iter().zip(results) {
            match result {
                Ok((table, candidates)) => {
                    outcomes.push(GroupOutcome::Reconciled {
                        pages: group.pages.clone(),
                        candidates,
                        rows: table.row_count(),
                        columns: table.column_count(),
                    });
                    spliced_groups.push(group);
                    tables.push(table);
                }
                Err(error) => {
                    warn!(pages = ?group.pages, error = %error, "keeping original table for group");
                    outcomes.push(GroupOutcome::Failed {
                        pages: group.pages,
                        reason: error.to_string(),
                    });
                }
            }
        }

        let document = self.splicer.splice(&layout.markdown, &spliced_groups, &tables)?;

        Ok(Reconciliation {
            document,
            groups: outcomes,
            page_count: layout.pages.len().max(store.len()),
        })
    }

    /// One blocking task per group. Results come back in group order.
    async fn reconcile_groups(
        &self,
        groups: &[ExtendedTableGroup],
        store: &Arc<PageTextStore>,
    ) -> Vec<Result<(MergedTable, usize), ReconcileError>> {
        let mut tasks = JoinSet::new();

        for (index, group) in groups.iter().cloned().enumerate() {
            let store = Arc::clone(store);
            let candidates = Arc::clone(&self.candidates);
            tasks.spawn_blocking(move || (index, reconcile_group(&candidates, &group, &store)));
        }

        let mut results: Vec<Option<Result<(MergedTable, usize), ReconcileError>>> =
            (0..groups.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(error) => warn!(error = %error, "table group task did not finish"),
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| Err(ReconcileError::GroupTask("task aborted".to_string())))
            })
            .collect()
    }

    async fn with_retry<T, F, Fut>(&self, stage: &'static str, mut call: F) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let attempts = self.options.max_extraction_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.options.extraction_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(reason)) => last_reason = reason,
                Err(_) => {
                    last_reason = format!("no answer within {:?}", self.options.extraction_timeout)
                }
            }

            warn!(stage, attempt, attempts, reason = %last_reason, "extraction attempt failed");
            if attempt < attempts {
                tokio::time::sleep(self.options.retry_backoff).await;
            }
        }

        Err(ReconcileError::ExtractionUnavailable {
            stage,
            attempts,
            reason: last_reason,
        })
    }
}

fn reconcile_group(
    candidates: &TableCandidateExtractor,
    group: &ExtendedTableGroup,
    store: &PageTextStore,
) -> Result<(MergedTable, usize), ReconcileError> {
    let (best, count) = candidates.select_for_group(group, store)?;
    debug!(
        pages = ?group.pages,
        candidates = count,
        chosen_page = best.first_page(),
        rows = best.row_count,
        "candidate selected"
    );

    let table = reconstruct(&best);
    if table.rows.is_empty() {
        return Err(ReconcileError::NoTableFound {
            pages: group.pages.clone(),
        });
    }
    Ok((table, count))
}
