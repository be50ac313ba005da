use crate::error::ReconcileError;
use crate::models::{Document, ExtendedTableGroup, MergedTable, TableFormat};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub span: Range<usize>,
    pub text: String,
}

/// Applies replacements against the original offsets in a single pass.
/// Bytes outside the replaced spans are copied through untouched.
pub fn apply_replacements(
    markdown: &str,
    mut replacements: Vec<Replacement>,
) -> Result<String, ReconcileError> {
    replacements.sort_by_key(|replacement| (replacement.span.start, replacement.span.end));

    for replacement in &replacements {
        let span = &replacement.span;
        if span.start > span.end
            || span.end > markdown.len()
            || !markdown.is_char_boundary(span.start)
            || !markdown.is_char_boundary(span.end)
        {
            return Err(ReconcileError::InvalidSpan {
                span: span.clone(),
                len: markdown.len(),
            });
        }
    }

    for pair in replacements.windows(2) {
        if pair[0].span.end > pair[1].span.start {
            return Err(ReconcileError::SpliceConflict {
                first: pair[0].span.clone(),
                second: pair[1].span.clone(),
            });
        }
    }

    let inserted: usize = replacements.iter().map(|replacement| replacement.text.len()).sum();
    let mut output = String::with_capacity(markdown.len() + inserted);
    let mut cursor = 0;

    for replacement in &replacements {
        output.push_str(&markdown[cursor..replacement.span.start]);
        output.push_str(&replacement.text);
        cursor = replacement.span.end;
    }
    output.push_str(&markdown[cursor..]);

    Ok(output)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSplicer {
    format: TableFormat,
}

impl DocumentSplicer {
    pub fn new(format: TableFormat) -> Self {
        Self { format }
    }

    /// Replaces every group's span with its reconstructed table. `tables[i]` belongs to `groups[i]`.
    pub fn splice(
        &self,
        layout_markdown: &str,
        groups: &[ExtendedTableGroup],
        tables: &[MergedTable],
    ) -> Result<Document, ReconcileError> {
        if groups.len() != tables.len() {
            return Err(ReconcileError::InvalidArgument(format!(
                "{} table group(s) but {} reconstructed table(s)",
                groups.len(),
                tables.len()
            )));
        }

        let replacements = groups
            .iter()
            .zip(tables)
            .map(|(group, table)| Replacement {
                span: group.span.clone(),
                text: self.table_block(layout_markdown, &group.span, table),
            })
            .collect();

        Ok(Document {
            markdown: apply_replacements(layout_markdown, replacements)?,
        })
    }

    fn table_block(&self, markdown: &str, span: &Range<usize>, table: &MergedTable) -> String {
        let rendered = table.render(self.format);
        let at_line_start = span.start == 0
            || markdown
                .get(..span.start)
                .map_or(true, |before| before.ends_with('\n'));

        if at_line_start {
            rendered
        } else {
            format!("\n{rendered}")
        }
    }
}
