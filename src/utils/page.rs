use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Zero-based page/size query parameters with the clamping rules the API
/// has always used: size defaults to 50, caps at 100, page floors at 0.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub size: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: 0, size: 0 }
    }
}

impl PageParams {
    pub fn resolved_page(&self) -> i64 {
        self.page.max(0)
    }

    pub fn resolved_size(&self) -> i64 {
        if self.size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.size.min(MAX_PAGE_SIZE)
        }
    }

    pub fn limit(&self) -> i64 {
        self.resolved_size()
    }

    pub fn offset(&self) -> i64 {
        self.resolved_page() * self.resolved_size()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    pub fn new(content: Vec<T>, params: &PageParams, total_elements: i64) -> Self {
        let size = params.resolved_size();
        let total_pages = if total_elements == 0 {
            0
        } else {
            (total_elements + size - 1) / size
        };
        Self {
            content,
            page: params.resolved_page(),
            size,
            total_elements,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_size_and_page() {
        let params = PageParams { page: -3, size: 500 };
        assert_eq!(params.resolved_page(), 0);
        assert_eq!(params.resolved_size(), MAX_PAGE_SIZE);

        let defaults = PageParams::default();
        assert_eq!(defaults.resolved_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(defaults.offset(), 0);
    }

    #[test]
    fn computes_offsets() {
        let params = PageParams { page: 2, size: 20 };
        assert_eq!(params.limit(), 20);
        assert_eq!(params.offset(), 40);
    }

    #[test]
    fn computes_total_pages() {
        let params = PageParams { page: 0, size: 10 };
        let page = PageResponse::new(vec![1, 2, 3], &params, 31);
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.total_elements, 31);

        let empty: PageResponse<i32> = PageResponse::new(vec![], &params, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
