//! Sorting and pagination for list responses.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use screener_common::{PageOverflow, PaginationConfig};

/// Items with a display name to sort by.
pub trait Named {
    fn display_name(&self) -> &str;
}

impl<T: Named> Named for Arc<T> {
    fn display_name(&self) -> &str {
        (**self).display_name()
    }
}

/// Stable, case-insensitive ascending sort by display name.
pub fn sort_by_name<T: Named>(items: &mut [T]) {
    items.sort_by_cached_key(|item| item.display_name().to_lowercase());
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("per_page must be at least 1")]
    ZeroPageSize,
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
    pub overflow: PageOverflow,
}

impl PageRequest {
    /// Apply configured defaults and caps to raw query values.
    pub fn new(
        page: Option<usize>,
        per_page: Option<usize>,
        config: &PaginationConfig,
    ) -> Result<Self, PageError> {
        let per_page = per_page.unwrap_or(config.default_per_page);
        if per_page == 0 {
            return Err(PageError::ZeroPageSize);
        }
        Ok(Self {
            page: page.unwrap_or(1),
            per_page: per_page.min(config.max_per_page.max(1)),
            overflow: config.overflow,
        })
    }
}

/// One page of items.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Page actually served (differs from the request only when clamped)
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice a 1-indexed page out of `items`.
///
/// Out-of-range pages are empty, or clamped into `1..=total_pages` under
/// `PageOverflow::Clamp`.
pub fn paginate<T: Clone>(items: &[T], request: PageRequest) -> Page<T> {
    let per_page = request.per_page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page);

    let page = match request.overflow {
        PageOverflow::Clamp => request.page.clamp(1, total_pages.max(1)),
        PageOverflow::Empty => request.page,
    };

    let slice: &[T] = if page == 0 {
        &[]
    } else {
        let start = (page - 1).saturating_mul(per_page).min(total_items);
        let end = start.saturating_add(per_page).min(total_items);
        &items[start..end]
    };

    Page {
        items: slice.to_vec(),
        page,
        per_page,
        total_pages,
        total_items,
    }
}

/// Navigation block attached to paginated responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub current_page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub total_stocks: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: Option<usize>,
    pub next_page: Option<usize>,
    pub showing_from: usize,
    pub showing_to: usize,
}

impl<T> From<&Page<T>> for PaginationMeta {
    fn from(page: &Page<T>) -> Self {
        let current = page.page;
        let has_prev = current > 1;
        let has_next = current < page.total_pages;
        let (showing_from, showing_to) = if page.items.is_empty() {
            (0, 0)
        } else {
            let from = (current - 1) * page.per_page + 1;
            (from, from + page.items.len() - 1)
        };

        Self {
            current_page: current,
            per_page: page.per_page,
            total_pages: page.total_pages,
            total_stocks: page.total_items,
            has_prev,
            has_next,
            prev_page: has_prev.then(|| current - 1),
            next_page: has_next.then(|| current + 1),
            showing_from,
            showing_to,
        }
    }
}
