//! Page requests for paged repository reads.

use serde::{Deserialize, Serialize};

use crate::config::PagingConfig;

/// A 1-based page request. Page `0` is read as page `1`; a missing page size
/// falls back to [`PagingConfig::default_page_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationFilter {
    pub page: usize,
    pub page_size: Option<usize>,
}

impl Default for PaginationFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
        }
    }
}

/// Resolved skip/take window of a [`PaginationFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: usize,
    pub take: usize,
}

impl PaginationFilter {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size: Some(page_size),
        }
    }

    /// The first page with the configured default size.
    pub fn first() -> Self {
        Self::default()
    }

    /// Resolves the window, clamping the page size to `1..=max_page_size`.
    pub fn window(&self, paging: &PagingConfig) -> PageWindow {
        let take = self
            .page_size
            .unwrap_or(paging.default_page_size)
            .clamp(1, paging.max_page_size.max(1));
        let skip = self.page.max(1).saturating_sub(1).saturating_mul(take);
        PageWindow { skip, take }
    }
}
