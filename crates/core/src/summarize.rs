use crate::error::ReconcileError;
use crate::models::{Document, MergedTable, PipelineOptions, TableCandidate, TableTextOutcome, TextArtifact};
use crate::reconstruct::parse_grid;
use crate::splice::{apply_replacements, Replacement};
use crate::table_markup::{TableKind, TableScanner};
use crate::traits::TableSummarizer;
use std::time::Duration;
use tracing::{debug, warn};

/// Rewrites every table of a spliced document as prose for text indexing.
pub struct TableToTextConverter<S> {
    summarizer: S,
    scanner: TableScanner,
    timeout: Duration,
}

impl<S: TableSummarizer> TableToTextConverter<S> {
    pub fn new(summarizer: S, options: &PipelineOptions) -> Result<Self, ReconcileError> {
        Ok(Self {
            summarizer,
            scanner: TableScanner::new()?,
            timeout: options.summarization_timeout,
        })
    }

    pub async fn to_text(&self, table: &MergedTable) -> Result<String, ReconcileError> {
        let markdown = table.to_markdown();

        match tokio::time::timeout(self.timeout, self.summarizer.summarize(&markdown)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(error)) => Err(ReconcileError::SummarizationUnavailable(error.to_string())),
            Err(_) => Err(ReconcileError::SummarizationUnavailable(format!(
                "no answer within {:?}",
                self.timeout
            ))),
        }
    }

    /// Tables are converted one at a time in document order. A table whose
    /// summary fails stays in the artifact as markdown.
    pub async fn document_to_text(&self, document: &Document) -> Result<TextArtifact, ReconcileError> {
        let markdown = document.as_str();
        let blocks = self.scanner.find_blocks(markdown, 0..markdown.len());

        let mut replacements = Vec::with_capacity(blocks.len());
        let mut outcomes = Vec::with_capacity(blocks.len());

        for block in blocks {
            let source = &markdown[block.span.clone()];
            let table = match block.kind {
                TableKind::Html => self.scanner.parse_html(source),
                TableKind::Pipe => parse_grid(&TableCandidate::from_markdown(0, source)),
            };

            if table.rows.is_empty() {
                debug!(span = ?block.span, "skipping table without rows");
                continue;
            }

            let (text, outcome) = match self.to_text(&table).await {
                Ok(prose) => (prose, TableTextOutcome::Summarized),
                Err(error) => {
                    warn!(span = ?block.span, error = %error, "table summary failed; keeping markdown");
                    (
                        table.to_markdown(),
                        TableTextOutcome::Fallback {
                            reason: error.to_string(),
                        },
                    )
                }
            };

            replacements.push(Replacement {
                span: block.span,
                text,
            });
            outcomes.push(outcome);
        }

        Ok(TextArtifact {
            text: apply_replacements(markdown, replacements)?,
            outcomes,
        })
    }
}
