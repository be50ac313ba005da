use crate::error::ReconcileError;
use crate::models::{MergedTable, TableFormat};
use crate::reconstruct::pad_to_rectangle;
use regex::Regex;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Html,
    Pipe,
}

/// A table located in markdown, with the column counts of its outer rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub span: Range<usize>,
    pub kind: TableKind,
    pub first_row_columns: usize,
    pub last_row_columns: usize,
}

pub fn is_pipe_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

pub fn is_separator_row(line: &str) -> bool {
    if !is_pipe_row(line) {
        return false;
    }

    split_pipe_row(line).iter().all(|cell| {
        !cell.is_empty() && cell.contains('-') && cell.chars().all(|ch| ch == '-' || ch == ':')
    })
}

/// Splits `| a | b\|c |` into trimmed cells, honoring `\|` escapes.
pub fn split_pipe_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = match inner.strip_suffix('|') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => inner,
    };

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());

    cells
}

/// Byte span (without line terminator) and content of every line, offset by `base`.
pub(crate) fn line_spans(text: &str, base: usize) -> Vec<(Range<usize>, &str)> {
    let mut spans = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        spans.push((base + offset..base + offset + content.len(), content));
        offset += line.len();
    }

    spans
}

pub struct TableScanner {
    table_re: Regex,
    row_re: Regex,
    cell_re: Regex,
    colspan_re: Regex,
    break_re: Regex,
    tag_re: Regex,
}

impl TableScanner {
    pub fn new() -> Result<Self, ReconcileError> {
        Ok(Self {
            table_re: Regex::new(r"(?is)<table\b.*?</table\s*>")?,
            row_re: Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>")?,
            cell_re: Regex::new(r"(?is)<t([hd])\b([^>]*)>(.*?)</t[hd]\s*>")?,
            colspan_re: Regex::new(r#"(?i)colspan\s*=\s*["']?(\d+)"#)?,
            break_re: Regex::new(r"(?i)<br\s*/?>")?,
            tag_re: Regex::new(r"<[^>]+>")?,
        })
    }

    /// Every HTML and pipe table inside `within`, ordered by start offset.
    pub fn find_blocks(&self, markdown: &str, within: Range<usize>) -> Vec<TableBlock> {
        let region = &markdown[within.clone()];

        let mut blocks: Vec<TableBlock> = self
            .table_re
            .find_iter(region)
            .map(|found| {
                let (first, last) = self.html_edge_columns(found.as_str());
                TableBlock {
                    span: within.start + found.start()..within.start + found.end(),
                    kind: TableKind::Html,
                    first_row_columns: first,
                    last_row_columns: last,
                }
            })
            .collect();

        let html_spans: Vec<Range<usize>> = blocks.iter().map(|block| block.span.clone()).collect();
        let mut current: Option<TableBlock> = None;

        for (span, line) in line_spans(region, within.start) {
            let inside_html = html_spans
                .iter()
                .any(|html| span.start >= html.start && span.start < html.end);

            if !inside_html && is_pipe_row(line) {
                let columns = split_pipe_row(line).len();
                match current.as_mut() {
                    Some(block) => {
                        block.span.end = span.end;
                        if !is_separator_row(line) {
                            block.last_row_columns = columns;
                        }
                    }
                    None => {
                        current = Some(TableBlock {
                            span,
                            kind: TableKind::Pipe,
                            first_row_columns: columns,
                            last_row_columns: columns,
                        })
                    }
                }
            } else if let Some(block) = current.take() {
                blocks.push(block);
            }
        }

        if let Some(block) = current.take() {
            blocks.push(block);
        }

        blocks.sort_by_key(|block| block.span.start);
        blocks
    }

    fn html_edge_columns(&self, html: &str) -> (usize, usize) {
        let counts: Vec<usize> = self
            .row_re
            .captures_iter(html)
            .map(|row| {
                let body = row.get(1).map(|m| m.as_str()).unwrap_or_default();
                self.cell_re
                    .captures_iter(body)
                    .map(|cell| {
                        let attributes = cell.get(2).map(|m| m.as_str()).unwrap_or_default();
                        self.colspan(attributes)
                    })
                    .sum()
            })
            .collect();

        (
            counts.first().copied().unwrap_or_default(),
            counts.last().copied().unwrap_or_default(),
        )
    }

    fn colspan(&self, attributes: &str) -> usize {
        self.colspan_re
            .captures(attributes)
            .and_then(|capture| capture.get(1))
            .and_then(|value| value.as_str().parse::<usize>().ok())
            .filter(|span| *span > 0)
            .unwrap_or(1)
    }

    /// Parses an HTML table into a grid. Spanned columns after the first are left empty.
    pub fn parse_html(&self, html: &str) -> MergedTable {
        let mut has_header = false;
        let mut rows = Vec::new();

        for (index, row) in self.row_re.captures_iter(html).enumerate() {
            let body = row.get(1).map(|m| m.as_str()).unwrap_or_default();
            let mut cells = Vec::new();

            for cell in self.cell_re.captures_iter(body) {
                if index == 0 && cell.get(1).is_some_and(|tag| tag.as_str().eq_ignore_ascii_case("h")) {
                    has_header = true;
                }
                let attributes = cell.get(2).map(|m| m.as_str()).unwrap_or_default();
                let content = cell.get(3).map(|m| m.as_str()).unwrap_or_default();
                cells.push(self.cell_text(content));
                for _ in 1..self.colspan(attributes) {
                    cells.push(String::new());
                }
            }

            rows.push(cells);
        }

        MergedTable {
            rows: pad_to_rectangle(rows),
            has_header,
        }
    }

    fn cell_text(&self, content: &str) -> String {
        let with_breaks = self.break_re.replace_all(content, " ");
        let stripped = self.tag_re.replace_all(&with_breaks, "");
        decode_entities(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl MergedTable {
    pub fn render(&self, format: TableFormat) -> String {
        match format {
            TableFormat::Markdown => self.to_markdown(),
            TableFormat::Html => self.to_html(),
        }
    }

    /// Pipe table; a header table gets a separator after its first row.
    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);

        for (index, row) in self.rows.iter().enumerate() {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.replace('|', "\\|").replace('\n', "<br>"))
                .collect();
            lines.push(format!("| {} |", cells.join(" | ")));

            if index == 0 && self.has_header {
                let separator = vec!["---"; row.len()];
                lines.push(format!("| {} |", separator.join(" | ")));
            }
        }

        lines.join("\n")
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<table>\n");

        for (index, row) in self.rows.iter().enumerate() {
            let tag = if index == 0 && self.has_header { "th" } else { "td" };
            html.push_str("<tr>");
            for cell in row {
                html.push_str(&format!("<{tag}>{}</{tag}>", escape_html(cell)));
            }
            html.push_str("</tr>\n");
        }

        html.push_str("</table>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pipe_rows_split_with_escapes() {
        assert_eq!(split_pipe_row("| a | b\\|c |  |"), vec!["a", "b|c", ""]);
        assert_eq!(split_pipe_row("|x|"), vec!["x"]);
    }

    #[test]
    fn separator_rows_are_recognized() {
        assert!(is_separator_row("|---|:---:|--|"));
        assert!(!is_separator_row("| - | text |"));
        assert!(!is_separator_row("---"));
    }

    #[test]
    fn finds_html_and_pipe_blocks_in_order() -> Result<(), ReconcileError> {
        let scanner = TableScanner::new()?;
        let markdown = "intro\n| a | b |\n|---|---|\n| 1 | 2 | 3 |\ntext\n<table><tr><td colspan=\"2\">x</td><td>y</td></tr><tr><td>1</td></tr></table>\n";

        let blocks = scanner.find_blocks(markdown, 0..markdown.len());

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, TableKind::Pipe);
        assert_eq!(&markdown[blocks[0].span.clone()], "| a | b |\n|---|---|\n| 1 | 2 | 3 |");
        assert_eq!((blocks[0].first_row_columns, blocks[0].last_row_columns), (2, 3));
        assert_eq!(blocks[1].kind, TableKind::Html);
        assert_eq!((blocks[1].first_row_columns, blocks[1].last_row_columns), (3, 1));
        Ok(())
    }

    #[test]
    fn html_tables_parse_into_rectangular_grids() -> Result<(), ReconcileError> {
        let scanner = TableScanner::new()?;
        let table = scanner.parse_html(
            "<table><tr><th colspan=\"2\">Type</th><th>Rent</th></tr><tr><td>A &amp; B</td><td>1<br>2</td></tr></table>",
        );

        assert!(table.has_header);
        assert_eq!(
            table.rows,
            vec![
                vec!["Type".to_string(), String::new(), "Rent".to_string()],
                vec!["A & B".to_string(), "1 2".to_string(), String::new()],
            ]
        );
        Ok(())
    }

    #[test]
    fn markdown_rendering_escapes_pipes() {
        let table = MergedTable {
            rows: vec![
                vec!["h1".to_string(), "h2".to_string()],
                vec!["a|b".to_string(), String::new()],
            ],
            has_header: true,
        };

        assert_eq!(table.to_markdown(), "| h1 | h2 |\n| --- | --- |\n| a\\|b |  |");

        let headerless = MergedTable {
            has_header: false,
            ..table.clone()
        };
        assert_eq!(headerless.to_markdown(), "| h1 | h2 |\n| a\\|b |  |");
        assert_eq!(
            table.to_html(),
            "<table>\n<tr><th>h1</th><th>h2</th></tr>\n<tr><td>a|b</td><td></td></tr>\n</table>"
        );
    }
}
