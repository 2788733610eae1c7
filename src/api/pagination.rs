//! Page-number pagination for list endpoints
//!
//! `?page=N` (1-based) over a fixed page size. Responses carry the total
//! count and absolute `next`/`previous` links that keep the other query
//! parameters of the request.

use serde::Serialize;

/// Paginated response envelope
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid page.")]
pub struct InvalidPage;

/// Requested page and its store window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Parse the raw `page` parameter; absent means the first page
    pub fn parse(raw: Option<&str>, page_size: u64) -> Result<Self, InvalidPage> {
        let page = match raw.map(str::trim) {
            None | Some("") => 1,
            Some(value) => value.parse::<u64>().map_err(|_| InvalidPage)?,
        };
        if page == 0 || page_size == 0 {
            return Err(InvalidPage);
        }
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// An empty listing still has one (empty) page
    pub fn num_pages(&self, count: u64) -> u64 {
        count.div_ceil(self.page_size).max(1)
    }

    pub fn check_in_range(&self, count: u64) -> Result<(), InvalidPage> {
        if self.page > self.num_pages(count) {
            Err(InvalidPage)
        } else {
            Ok(())
        }
    }

    pub fn has_next(&self, count: u64) -> bool {
        self.page < self.num_pages(count)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Absolute link to `page` on `base_url`, preserving `params` in order.
/// The first page is linked without a `page` parameter.
pub fn page_link(base_url: &str, params: &[(&str, &str)], page: u64) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter().filter(|(key, _)| *key != "page") {
        query.append_pair(key, value);
    }
    if page > 1 {
        query.append_pair("page", &page.to_string());
    }

    let query = query.finish();
    if query.is_empty() {
        base_url.to_string()
    } else {
        format!("{}?{}", base_url, query)
    }
}
