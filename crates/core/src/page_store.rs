use crate::column_fix::ColumnArtifactFixer;
use crate::error::ReconcileError;
use crate::extractor::PageText;
use std::collections::BTreeMap;

/// Cleaned raw text per 1-based page number. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct PageTextStore {
    pages: BTreeMap<u32, String>,
}

impl PageTextStore {
    pub fn new(pages: impl IntoIterator<Item = PageText>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| (page.number, page.text))
                .collect(),
        }
    }

    /// Runs every page through the column fixer before storing it.
    pub fn from_raw_pages(pages: impl IntoIterator<Item = PageText>, fixer: &ColumnArtifactFixer) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| (page.number, fixer.fix(&page.text)))
                .collect(),
        }
    }

    pub fn get(&self, page: u32) -> Option<&str> {
        self.pages.get(&page).map(String::as_str)
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Texts of `pages` in the order given; fails on the first unknown page.
    pub fn texts_in_order(&self, pages: &[u32]) -> Result<Vec<(u32, &str)>, ReconcileError> {
        pages
            .iter()
            .map(|page| {
                self.get(*page)
                    .map(|text| (*page, text))
                    .ok_or(ReconcileError::MissingPage(*page))
            })
            .collect()
    }
}
