use feinschmecker_core::PageRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageMeta {
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: usize,
}

/// One page of an ordered result set plus the count over the whole set.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

pub fn total_pages(total: usize, per_page: u32) -> usize {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page as usize)
}

/// Slices `[(page-1)*per_page, page*per_page)` out of `items`. Pages past the end are empty.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len();
    let per_page = request.per_page.max(1) as usize;
    let start = (request.page.max(1) as usize - 1).saturating_mul(per_page);
    let slice = items
        .into_iter()
        .skip(start)
        .take(per_page)
        .collect();
    Page {
        items: slice,
        meta: PageMeta {
            total,
            page: request.page,
            per_page: request.per_page,
            total_pages: total_pages(total, request.per_page),
        },
    }
}
