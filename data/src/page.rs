use serde::{Deserialize, Serialize};

fn default_page() -> u64 {
    0
}

fn default_size() -> u64 {
    20
}

/// Pagination + sort request, bound from query-string parameters
/// (`page`, `size`, `sort`) by the CRUD generator's `findAll` route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pageable {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_size")]
    pub size: u64,
    #[serde(default)]
    pub sort: Option<String>,
}

impl Default for Pageable {
    fn default() -> Self {
        Pageable {
            page: default_page(),
            size: default_size(),
            sort: None,
        }
    }
}

impl Pageable {
    pub fn new(page: u64, size: u64) -> Self {
        Pageable {
            page,
            size,
            sort: None,
        }
    }

    /// Row offset for this page, given `size` rows per page.
    pub fn offset(&self) -> u64 {
        self.page * self.size
    }
}

/// A page of results plus the metadata needed to render pagination links.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let size = pageable.size.max(1);
        let total_pages = total_elements.div_ceil(size);
        Page {
            content,
            page: pageable.page,
            size: pageable.size,
            total_elements,
            total_pages,
        }
    }
}
