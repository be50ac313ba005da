use crate::error::ReconcileError;
use crate::layout::{is_comment_line, paginate, LayoutPage};
use crate::models::{ExtendedTableGroup, PipelineOptions};
use crate::table_markup::{TableBlock, TableScanner};
use regex::Regex;
use tracing::debug;

#[derive(Debug, Default)]
struct PageEdges {
    number: u32,
    leading: Option<TableBlock>,
    trailing: Option<TableBlock>,
    marker_before_leading: bool,
    marker_after_trailing: bool,
}

impl PageEdges {
    fn single_table_page(&self) -> bool {
        matches!((&self.leading, &self.trailing), (Some(leading), Some(trailing)) if leading.span == trailing.span)
    }
}

pub struct ExtendedTableGroupDetector {
    scanner: TableScanner,
    continuation_re: Regex,
    min_table_columns: usize,
}

impl ExtendedTableGroupDetector {
    pub fn new(options: &PipelineOptions) -> Result<Self, ReconcileError> {
        Ok(Self {
            scanner: TableScanner::new()?,
            continuation_re: Regex::new(options.continuation_marker_regex)?,
            min_table_columns: options.min_table_columns,
        })
    }

    pub fn detect(&self, layout_markdown: &str) -> Vec<ExtendedTableGroup> {
        let edges: Vec<PageEdges> = paginate(layout_markdown)
            .iter()
            .map(|page| self.page_edges(layout_markdown, page))
            .collect();

        let mut candidates: Vec<ExtendedTableGroup> = Vec::new();
        let mut chain: Option<ExtendedTableGroup> = None;

        for pair in edges.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let (Some(trailing), Some(leading)) = (&current.trailing, &next.leading) else {
                candidates.extend(chain.take());
                continue;
            };

            if !self.continues(current, next, trailing, leading) {
                candidates.extend(chain.take());
                continue;
            }

            match chain.as_mut().filter(|_| current.single_table_page()) {
                Some(group) => {
                    group.pages.push(next.number);
                    group.span.end = leading.span.end;
                }
                None => {
                    candidates.extend(chain.take());
                    chain = Some(ExtendedTableGroup {
                        pages: vec![current.number, next.number],
                        span: trailing.span.start..leading.span.end,
                    });
                }
            }
        }
        candidates.extend(chain.take());

        resolve_overlaps(candidates)
    }

    fn continues(
        &self,
        current: &PageEdges,
        next: &PageEdges,
        trailing: &TableBlock,
        leading: &TableBlock,
    ) -> bool {
        if current.marker_after_trailing || next.marker_before_leading {
            return true;
        }

        trailing.last_row_columns >= self.min_table_columns
            && trailing.last_row_columns == leading.first_row_columns
    }

    fn page_edges(&self, markdown: &str, page: &LayoutPage) -> PageEdges {
        let blocks = self.scanner.find_blocks(markdown, page.span.clone());
        let mut edges = PageEdges {
            number: page.number,
            ..PageEdges::default()
        };

        if let Some(first) = blocks.first() {
            if let Some(marker) = self.filler_marker(&markdown[page.span.start..first.span.start]) {
                edges.leading = Some(first.clone());
                edges.marker_before_leading = marker;
            }
        }

        if let Some(last) = blocks.last() {
            if let Some(marker) = self.filler_marker(&markdown[last.span.end..page.span.end]) {
                edges.trailing = Some(last.clone());
                edges.marker_after_trailing = marker;
            }
        }

        edges
    }

    /// `None` when `text` holds real content, otherwise whether it holds a continuation marker.
    fn filler_marker(&self, text: &str) -> Option<bool> {
        let mut marker = false;

        for line in text.lines() {
            if self.continuation_re.is_match(line) {
                marker = true;
            } else if !(line.trim().is_empty() || is_comment_line(line)) {
                return None;
            }
        }

        Some(marker)
    }
}

/// Longest group wins where candidates share a page; ties go to the earlier group.
fn resolve_overlaps(mut candidates: Vec<ExtendedTableGroup>) -> Vec<ExtendedTableGroup> {
    candidates.sort_by(|left, right| {
        right
            .pages
            .len()
            .cmp(&left.pages.len())
            .then(left.first_page().cmp(&right.first_page()))
    });

    let mut accepted: Vec<ExtendedTableGroup> = Vec::new();
    for candidate in candidates {
        if candidate.pages.len() < 2 {
            continue;
        }
        if accepted.iter().any(|group| group.shares_page_with(&candidate)) {
            debug!(pages = ?candidate.pages, "dropping table group overlapped by a longer group");
            continue;
        }
        accepted.push(candidate);
    }

    accepted.sort_by_key(ExtendedTableGroup::first_page);
    accepted
}
