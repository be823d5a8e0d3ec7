use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Raw `page` / `page_size` query parameters.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// A resolved, clamped page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn resolve(params: &PageParams, default_size: u32, max_size: u32) -> Self {
        let page = params.page.unwrap_or(1).max(1);
        let page_size = params
            .page_size
            .unwrap_or(default_size)
            .clamp(1, max_size.max(1));
        Self { page, page_size }
    }

    /// Window large enough to hold every row; used by internal aggregations.
    pub fn everything() -> Self {
        Self {
            page: 1,
            page_size: u32::MAX,
        }
    }

    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// Cuts the current window out of an already filtered and ordered collection.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let len = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        items.iter().skip(start).take(len).cloned().collect()
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, request: PageRequest, uri: &Uri) -> Self {
        let has_next = request.offset() + request.limit() < count;
        let next = has_next.then(|| page_link(uri, request.page + 1));
        let previous = (request.page > 1).then(|| page_link(uri, request.page - 1));
        Self {
            count,
            next,
            previous,
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

fn page_link(uri: &Uri, page: u32) -> String {
    let mut pairs: Vec<&str> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("page="))
        .collect();
    let page_pair = format!("page={page}");
    pairs.push(&page_pair);
    format!("{}?{}", uri.path(), pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_clamps_values() {
        let params = PageParams {
            page: Some(0),
            page_size: Some(1000),
        };
        let request = PageRequest::resolve(&params, 20, 100);
        assert_eq!(request, PageRequest { page: 1, page_size: 100 });

        let request = PageRequest::resolve(&PageParams::default(), 20, 100);
        assert_eq!(request.page_size, 20);
    }

    #[test]
    fn test_links_keep_other_parameters() {
        let uri: Uri = "/api/tickets?status=waiting&page=2&page_size=10"
            .parse()
            .unwrap();
        let request = PageRequest { page: 2, page_size: 10 };
        let page = Page::new(vec![1, 2, 3], 35, request, &uri);

        assert_eq!(
            page.next.as_deref(),
            Some("/api/tickets?status=waiting&page_size=10&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("/api/tickets?status=waiting&page_size=10&page=1")
        );
    }

    #[test]
    fn test_last_page_has_no_next() {
        let uri: Uri = "/api/queues".parse().unwrap();
        let page = Page::new(vec!['a'], 21, PageRequest { page: 2, page_size: 20 }, &uri);
        assert!(page.next.is_none());
        assert_eq!(page.previous.as_deref(), Some("/api/queues?page=1"));
    }

    #[test]
    fn test_slice_past_the_end_is_empty() {
        let items = vec![1, 2, 3];
        assert!(PageRequest { page: 3, page_size: 2 }.slice(&items).is_empty());
        assert_eq!(PageRequest { page: 2, page_size: 2 }.slice(&items), vec![3]);
        assert_eq!(PageRequest::everything().slice(&items).len(), 3);
    }
}
