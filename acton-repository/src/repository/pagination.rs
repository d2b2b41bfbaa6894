//! Paginated results
//!
//! [`LengthAwarePaginator`] runs a count alongside the page query and knows
//! how many pages exist; [`Paginator`] fetches one extra row instead and
//! only knows whether another page follows.

use serde::{Deserialize, Serialize};

/// Default query-string parameter carrying the page number
pub const DEFAULT_PAGE_NAME: &str = "page";

/// One page of results plus the total row count
///
/// # Example
///
/// ```rust
/// use acton_repository::repository::LengthAwarePaginator;
///
/// let page = LengthAwarePaginator::new(vec!["a", "b"], 5, 2, 1, "page");
/// assert_eq!(page.last_page, 3);
/// assert!(page.has_more_pages());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthAwarePaginator<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Rows across every page
    pub total: u64,
    /// Page size
    pub per_page: u64,
    /// 1-indexed page number
    pub current_page: u64,
    /// Number of the last page (at least 1)
    pub last_page: u64,
    /// Query-string parameter carrying the page number
    pub page_name: String,
}

impl<T> LengthAwarePaginator<T> {
    /// Assemble a page
    pub fn new(
        items: Vec<T>,
        total: u64,
        per_page: u64,
        current_page: u64,
        page_name: impl Into<String>,
    ) -> Self {
        let last_page = if per_page == 0 {
            1
        } else {
            total.div_ceil(per_page).max(1)
        };
        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
            page_name: page_name.into(),
        }
    }

    /// Whether a page follows this one
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }

    /// Whether this page holds no rows
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One page of results without a total count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginator<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Page size
    pub per_page: u64,
    /// 1-indexed page number
    pub current_page: u64,
    /// Whether a page follows this one
    pub has_more: bool,
    /// Query-string parameter carrying the page number
    pub page_name: String,
}

impl<T> Paginator<T> {
    /// Assemble a page from up to `per_page + 1` fetched rows
    pub fn new(
        mut items: Vec<T>,
        per_page: u64,
        current_page: u64,
        page_name: impl Into<String>,
    ) -> Self {
        let has_more = items.len() as u64 > per_page;
        items.truncate(per_page as usize);
        Self {
            items,
            per_page,
            current_page,
            has_more,
            page_name: page_name.into(),
        }
    }

    /// Whether this page holds no rows
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_page_rounds_up() {
        let page = LengthAwarePaginator::new(vec![1, 2], 7, 2, 4, DEFAULT_PAGE_NAME);
        assert_eq!(page.last_page, 4);
        assert!(!page.has_more_pages());
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let page = LengthAwarePaginator::<i32>::new(Vec::new(), 0, 15, 1, DEFAULT_PAGE_NAME);
        assert_eq!(page.last_page, 1);
        assert!(page.is_empty());
    }

    #[test]
    fn test_simple_paginator_trims_lookahead_row() {
        let page = Paginator::new(vec![1, 2, 3], 2, 1, "p");
        assert!(page.has_more);
        assert_eq!(page.items, vec![1, 2]);

        let page = Paginator::new(vec![1, 2], 2, 2, "p");
        assert!(!page.has_more);
        assert_eq!(page.page_name, "p");
    }
}
