use serde::{Deserialize, Serialize};

use crate::config::PagingConfig;

/// One-based offset pagination as accepted on the query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Page {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn resolve(query: PageQuery, paging: &PagingConfig) -> Self {
        let limit = query
            .limit
            .unwrap_or(paging.default_page_size)
            .clamp(1, paging.max_page_size.max(1));
        Page::new(query.page.unwrap_or(1), limit)
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    pub fn limit(&self) -> usize {
        self.limit as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(1, 20)
    }
}

/// Window into a chronologically ordered sequence, addressed from the newest
/// end: page 1 holds the last `limit` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailWindow {
    pub start: usize,
    pub end: usize,
    pub has_more: bool,
}

impl TailWindow {
    pub fn compute(total: usize, page: Page) -> Self {
        let page_no = page.page as usize;
        let limit = page.limit as usize;
        let end = total.saturating_sub((page_no - 1) * limit);
        let start = total.saturating_sub(page_no * limit);
        TailWindow {
            start,
            end,
            has_more: start > 0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}
