use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

/// Pages believed to hold one logical table split across page breaks,
/// together with the byte span of its fragments in the layout markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedTableGroup {
    pub pages: Vec<u32>,
    pub span: Range<usize>,
}

impl ExtendedTableGroup {
    pub fn first_page(&self) -> u32 {
        self.pages.first().copied().unwrap_or_default()
    }

    pub fn last_page(&self) -> u32 {
        self.pages.last().copied().unwrap_or_default()
    }

    pub fn shares_page_with(&self, other: &ExtendedTableGroup) -> bool {
        self.pages.iter().any(|page| other.pages.contains(page))
    }
}

/// A pipe-table block lifted out of raw page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCandidate {
    pub pages: Vec<u32>,
    pub lines: Vec<String>,
    pub row_count: usize,
}

impl TableCandidate {
    pub fn new(pages: Vec<u32>, lines: Vec<String>) -> Self {
        let row_count = lines
            .iter()
            .filter(|line| !crate::table_markup::is_separator_row(line))
            .count();

        Self {
            pages,
            lines,
            row_count,
        }
    }

    /// Reads a candidate out of a standalone pipe-table string.
    pub fn from_markdown(page: u32, markdown: &str) -> Self {
        let lines = markdown
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('|'))
            .map(str::to_string)
            .collect();
        Self::new(vec![page], lines)
    }

    pub fn first_page(&self) -> u32 {
        self.pages.first().copied().unwrap_or_default()
    }

    pub fn to_markdown(&self) -> String {
        self.lines.join("\n")
    }
}

/// Rectangular grid rebuilt from one candidate. Empty strings mark empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTable {
    pub rows: Vec<Vec<String>>,
    pub has_header: bool,
}

impl MergedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or_default()
    }

    pub fn is_rectangular(&self) -> bool {
        let width = self.column_count();
        self.rows.iter().all(|row| row.len() == width)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
    }
}

/// Final spliced markdown for one PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub markdown: String,
}

impl Document {
    pub fn as_str(&self) -> &str {
        &self.markdown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TableFormat {
    #[default]
    Markdown,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Reconciled {
        pages: Vec<u32>,
        candidates: usize,
        rows: usize,
        columns: usize,
    },
    Failed {
        pages: Vec<u32>,
        reason: String,
    },
}

impl GroupOutcome {
    pub fn is_reconciled(&self) -> bool {
        matches!(self, GroupOutcome::Reconciled { .. })
    }

    pub fn pages(&self) -> &[u32] {
        match self {
            GroupOutcome::Reconciled { pages, .. } | GroupOutcome::Failed { pages, .. } => pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableTextOutcome {
    Summarized,
    Fallback { reason: String },
}

/// The final document with every table turned into prose or kept as markdown.
#[derive(Debug, Clone)]
pub struct TextArtifact {
    pub text: String,
    pub outcomes: Vec<TableTextOutcome>,
}

impl TextArtifact {
    pub fn fallback_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TableTextOutcome::Fallback { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub source_path: String,
    /// sha256 of the PDF bytes, filled in by batch runs.
    #[serde(default)]
    pub checksum: Option<String>,
    pub page_count: usize,
    pub groups: Vec<GroupOutcome>,
    pub tables_summarized: usize,
    pub tables_fallback: usize,
    pub processed_at: DateTime<Utc>,
}

impl DocumentReport {
    pub fn reconciled_groups(&self) -> usize {
        self.groups.iter().filter(|group| group.is_reconciled()).count()
    }

    pub fn failed_groups(&self) -> usize {
        self.groups.len() - self.reconciled_groups()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub bullet_chars: Vec<char>,
    pub max_fragment_chars: usize,
    pub min_table_columns: usize,
    pub continuation_marker_regex: &'static str,
    pub page_number_regex: &'static str,
    pub table_format: TableFormat,
    pub extraction_timeout: Duration,
    pub max_extraction_attempts: u32,
    pub retry_backoff: Duration,
    pub summarization_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bullet_chars: vec!['•', '■', '※'],
            max_fragment_chars: 40,
            min_table_columns: 2,
            continuation_marker_regex: r"(?i)^\s*(?:<!--\s*TableContinued\s*-->|[(\[]?\s*(?:continued|계속)\s*[)\]]?)\s*$",
            page_number_regex: r"^\s*(?:[-–]\s*)?\d{1,4}(?:\s*[-–])?\s*$",
            table_format: TableFormat::Markdown,
            extraction_timeout: Duration::from_secs(180),
            max_extraction_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            summarization_timeout: Duration::from_secs(60),
        }
    }
}
