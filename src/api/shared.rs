use serde::{Deserialize, Serialize};

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQueryParams {
    /// `(page, per_page, offset)` with the page clamped to >= 1 and
    /// `per_page` to `1..=100`.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        (page, per_page, (page - 1).saturating_mul(per_page))
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        Self {
            total,
            page,
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}
