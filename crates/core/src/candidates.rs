use crate::error::ReconcileError;
use crate::models::{ExtendedTableGroup, PipelineOptions, TableCandidate};
use crate::page_store::PageTextStore;
use crate::table_markup::{is_pipe_row, is_separator_row, split_pipe_row};
use regex::Regex;

struct PageBlock {
    lines: Vec<String>,
    opens_page: bool,
    closes_page: bool,
}

pub struct TableCandidateExtractor {
    page_number_re: Regex,
}

impl TableCandidateExtractor {
    pub fn new(options: &PipelineOptions) -> Result<Self, ReconcileError> {
        Ok(Self {
            page_number_re: Regex::new(options.page_number_regex)?,
        })
    }

    /// All pipe tables in the group's raw text, in page order. A table that
    /// closes one page and one that opens the next page with the same column
    /// count are read as a single candidate.
    pub fn extract_candidates(
        &self,
        page_indices: &[u32],
        store: &PageTextStore,
    ) -> Result<Vec<TableCandidate>, ReconcileError> {
        let mut candidates: Vec<TableCandidate> = Vec::new();
        let mut open: Option<usize> = None;

        for (page, text) in store.texts_in_order(page_indices)? {
            let carried = open.take();
            let blocks = self.page_blocks(text);
            let block_count = blocks.len();

            for (position, block) in blocks.into_iter().enumerate() {
                let continued = match carried {
                    Some(index) if position == 0 && block.opens_page => {
                        continues_table(&candidates[index], &block.lines).then_some(index)
                    }
                    _ => None,
                };

                let index = match continued {
                    Some(index) => {
                        let merged = append_fragment(&candidates[index], page, block.lines);
                        candidates[index] = merged;
                        index
                    }
                    None => {
                        candidates.push(TableCandidate::new(vec![page], block.lines));
                        candidates.len() - 1
                    }
                };

                if position + 1 == block_count && block.closes_page {
                    open = Some(index);
                }
            }
        }

        Ok(candidates)
    }

    /// Best candidate for a detected group; an empty candidate list is an error.
    pub fn select_for_group(
        &self,
        group: &ExtendedTableGroup,
        store: &PageTextStore,
    ) -> Result<(TableCandidate, usize), ReconcileError> {
        let candidates = self.extract_candidates(&group.pages, store)?;
        let count = candidates.len();

        select_best(candidates)
            .map(|best| (best, count))
            .ok_or_else(|| ReconcileError::NoTableFound {
                pages: group.pages.clone(),
            })
    }

    fn page_blocks(&self, text: &str) -> Vec<PageBlock> {
        let lines: Vec<&str> = text.lines().collect();
        let mut blocks = Vec::new();
        let mut index = 0;

        while index < lines.len() {
            if !is_pipe_row(lines[index]) {
                index += 1;
                continue;
            }

            let start = index;
            while index < lines.len() && is_pipe_row(lines[index]) {
                index += 1;
            }

            let run = &lines[start..index];
            if run.iter().all(|line| is_separator_row(line)) {
                continue;
            }

            blocks.push(PageBlock {
                lines: run.iter().map(|line| line.trim().to_string()).collect(),
                opens_page: lines[..start].iter().all(|line| self.is_page_filler(line)),
                closes_page: lines[index..].iter().all(|line| self.is_page_filler(line)),
            });
        }

        blocks
    }

    fn is_page_filler(&self, line: &str) -> bool {
        line.trim().is_empty() || self.page_number_re.is_match(line)
    }
}

fn last_row_columns(candidate: &TableCandidate) -> usize {
    candidate
        .lines
        .iter()
        .rev()
        .find(|line| !is_separator_row(line))
        .map(|line| split_pipe_row(line).len())
        .unwrap_or_default()
}

fn continues_table(candidate: &TableCandidate, fragment: &[String]) -> bool {
    fragment
        .iter()
        .find(|line| !is_separator_row(line))
        .is_some_and(|line| split_pipe_row(line).len() == last_row_columns(candidate))
}

/// Appends a continuation, dropping its separator rows and a repeated header row.
fn append_fragment(candidate: &TableCandidate, page: u32, fragment: Vec<String>) -> TableCandidate {
    let header = candidate.lines.first().map(|line| split_pipe_row(line));
    let mut rows = fragment.into_iter().filter(|line| !is_separator_row(line)).peekable();

    if let (Some(header), Some(first)) = (&header, rows.peek()) {
        if split_pipe_row(first) == *header {
            rows.next();
        }
    }

    let mut pages = candidate.pages.clone();
    if pages.last() != Some(&page) {
        pages.push(page);
    }

    let mut lines = candidate.lines.clone();
    lines.extend(rows);
    TableCandidate::new(pages, lines)
}

/// Strictly greatest row count wins; ties keep the earliest candidate in page order.
pub fn select_best(candidates: Vec<TableCandidate>) -> Option<TableCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(current)
            if candidate.row_count < current.row_count
                || (candidate.row_count == current.row_count
                    && candidate.first_page() >= current.first_page()) =>
        {
            Some(current)
        }
        _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use pretty_assertions::assert_eq;

    fn extractor() -> TableCandidateExtractor {
        TableCandidateExtractor::new(&PipelineOptions::default()).expect("default options compile")
    }

    fn store(pages: &[(u32, &str)]) -> PageTextStore {
        PageTextStore::new(pages.iter().map(|(number, text)| PageText {
            number: *number,
            text: text.to_string(),
        }))
    }

    fn candidate_with_rows(page: u32, rows: usize) -> TableCandidate {
        let lines = (0..rows).map(|row| format!("| p{page} | r{row} |")).collect();
        TableCandidate::new(vec![page], lines)
    }

    #[test]
    fn greatest_row_count_wins_and_ties_keep_page_order() {
        let candidates = vec![
            candidate_with_rows(2, 3),
            candidate_with_rows(3, 7),
            candidate_with_rows(4, 7),
        ];

        let best = select_best(candidates).expect("non-empty candidates");

        assert_eq!(best.first_page(), 3);
        assert_eq!(best.row_count, 7);
    }

    #[test]
    fn ties_prefer_earlier_page_regardless_of_input_order() {
        let best = select_best(vec![candidate_with_rows(5, 4), candidate_with_rows(2, 4)])
            .expect("non-empty candidates");
        assert_eq!(best.first_page(), 2);
    }

    #[test]
    fn empty_candidates_select_nothing() {
        assert!(select_best(Vec::new()).is_none());
    }

    #[test]
    fn fragments_across_a_page_break_are_combined() -> Result<(), ReconcileError> {
        let pages = store(&[
            (1, "Notice\n| Type | Rent |\n|---|---|\n| A | 10 |\n| B | 20 |\n\n- 1 -\n"),
            (2, "2\n| Type | Rent |\n|---|---|\n| C | 30 |\nAfter the table\n| x | y |\n"),
        ]);

        let candidates = extractor().extract_candidates(&[1, 2], &pages)?;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].pages, vec![1, 2]);
        assert_eq!(
            candidates[0].lines,
            vec!["| Type | Rent |", "|---|---|", "| A | 10 |", "| B | 20 |", "| C | 30 |"]
        );
        assert_eq!(candidates[0].row_count, 4);
        assert_eq!(candidates[1].pages, vec![2]);
        Ok(())
    }

    #[test]
    fn differing_column_counts_stay_separate() -> Result<(), ReconcileError> {
        let pages = store(&[
            (1, "| a | b |\n| 1 | 2 |\n"),
            (2, "| a | b | c |\n| 1 | 2 | 3 |\n"),
        ]);

        let candidates = extractor().extract_candidates(&[1, 2], &pages)?;

        assert_eq!(candidates.len(), 2);
        Ok(())
    }

    #[test]
    fn separator_only_runs_are_not_candidates() -> Result<(), ReconcileError> {
        let pages = store(&[(1, "Intro\n|---|---|\n"), (2, "| --- | --- |\nText")]);
        let group = ExtendedTableGroup {
            pages: vec![1, 2],
            span: 0..0,
        };

        assert!(extractor().extract_candidates(&[1, 2], &pages)?.is_empty());
        let error = extractor().select_for_group(&group, &pages).unwrap_err();
        assert!(matches!(error, ReconcileError::NoTableFound { .. }));
        Ok(())
    }

    #[test]
    fn group_without_tables_reports_no_table_found() {
        let pages = store(&[(4, "plain text"), (5, "more text")]);
        let group = ExtendedTableGroup {
            pages: vec![4, 5],
            span: 0..0,
        };

        let error = extractor().select_for_group(&group, &pages).unwrap_err();

        assert!(matches!(error, ReconcileError::NoTableFound { pages } if pages == vec![4, 5]));
    }
}
