pub mod candidates;
pub mod column_fix;
pub mod detector;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod page_markdown;
pub mod page_store;
pub mod reconstruct;
pub mod services;
pub mod splice;
pub mod summarize;
pub mod table_markup;
pub mod traits;

pub use candidates::{select_best, TableCandidateExtractor};
pub use column_fix::ColumnArtifactFixer;
pub use detector::ExtendedTableGroupDetector;
pub use error::{IngestError, ReconcileError, ServiceError};
pub use extractor::{split_form_feed, LopdfExtractor, PageText, PageTextExtractor, SidecarPageText};
pub use ingest::{collect_inputs, digest_file, discover_pdf_files, run_batch, BatchReport, SkippedPdf};
pub use layout::{LayoutDocument, LayoutMarkdownPreprocessor, LayoutPage, PAGE_BREAK};
pub use models::{
    Document, DocumentReport, ExtendedTableGroup, GroupOutcome, MergedTable, PipelineOptions,
    TableCandidate, TableFormat, TableTextOutcome, TextArtifact,
};
pub use orchestrator::{ProcessedDocument, ReconcilePipeline, Reconciliation};
pub use page_markdown::{page_runs, render_page, TextRun};
pub use page_store::PageTextStore;
pub use reconstruct::{fill_columns_forward, fill_rows_forward, reconstruct};
pub use services::{ChatCompletionClient, DocumentIntelligenceClient, SidecarLayout};
pub use splice::{apply_replacements, DocumentSplicer, Replacement};
pub use summarize::TableToTextConverter;
pub use table_markup::{TableBlock, TableKind, TableScanner};
pub use traits::{LayoutExtractor, TableSummarizer};
