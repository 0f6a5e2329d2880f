pub mod game;
pub mod rating;
pub mod user;

use serde::Serialize;

/// Pagination envelope shared by every list endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: u64) -> Self {
        Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1) as u64),
        }
    }
}
