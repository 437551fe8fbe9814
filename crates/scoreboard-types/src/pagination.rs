//! Pagination metadata

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: i64) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = total.max(0);
        let pages = ((total + i64::from(per_page) - 1) / i64::from(per_page)) as u32;
        Self {
            page,
            per_page,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }

    /// Row offset of the first item on this page
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_page_count() {
        let p = Pagination::new(1, 50, 101);
        assert_eq!(p.pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn last_page_has_no_next() {
        let p = Pagination::new(3, 50, 101);
        assert!(!p.has_next);
        assert!(p.has_prev);
        assert_eq!(p.offset(), 100);
    }

    #[test]
    fn clamps_zero_inputs() {
        let p = Pagination::new(0, 0, 0);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, 1);
        assert_eq!(p.pages, 0);
        assert!(!p.has_next);
    }
}
