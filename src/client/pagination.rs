//! Collecting every page of a list endpoint

use crate::client::ApiClient;
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Query parameter carrying the continuation cursor
pub const CURSOR_PARAM: &str = "pageCursor";
/// Query parameter carrying the offset for offset-only endpoints
pub const OFFSET_PARAM: &str = "pageOffset";
/// Query parameter carrying the page size
pub const LIMIT_PARAM: &str = "pageLimit";

/// Items of one page: the `data` array, or the body itself when it is an array
pub fn page_items(page: &Value) -> Vec<Value> {
    match page {
        Value::Array(items) => items.clone(),
        _ => page
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

#[derive(Debug, PartialEq)]
enum Next {
    Cursor(String),
    Offset { offset: u64, limit: u64 },
    Link(String),
    Done,
}

fn next_page(page: &Value, items_on_page: usize, current_offset: u64, default_limit: u64) -> Next {
    if let Some(pagination) = page.get("pagination") {
        let has_more = pagination.get("hasMore").and_then(Value::as_bool).unwrap_or(false);
        if !has_more {
            return Next::Done;
        }
        if let Some(cursor) = pagination
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
        {
            return Next::Cursor(cursor.to_string());
        }
        // Offset-only endpoints report hasMore without a cursor.
        let limit = pagination
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|l| *l > 0)
            .unwrap_or(if items_on_page > 0 { items_on_page as u64 } else { default_limit });
        let offset = pagination
            .get("offset")
            .and_then(Value::as_u64)
            .unwrap_or(current_offset);
        return Next::Offset {
            offset: offset + limit,
            limit,
        };
    }

    match page.pointer("/links/next").and_then(Value::as_str) {
        Some(next) if !next.is_empty() => Next::Link(next.to_string()),
        _ => Next::Done,
    }
}

fn set_param(query: &mut Vec<(String, String)>, name: &str, value: String) {
    query.retain(|(k, _)| k != name);
    query.push((name.to_string(), value));
}

impl ApiClient {
    /// Fetch every page of `path` and return all items in page order
    ///
    /// Stops when the server reports no more pages, when a page comes back
    /// empty, or after `api.max_pages` pages.
    pub async fn get_all_pages(&self, path: &str, query: &[(String, String)]) -> Result<Vec<Value>> {
        let max_pages = self.config().max_pages.max(1);
        let default_limit = u64::from(self.config().page_size.max(1));

        let mut items = Vec::new();
        let mut query = query.to_vec();
        let mut target = path.to_string();
        let mut offset = 0u64;

        for page_number in 1..=max_pages {
            let page = self.get(&target, &query).await?;
            let page_items = page_items(&page);
            let count = page_items.len();
            items.extend(page_items);
            debug!(path = path, page = page_number, items = count, "Fetched page");

            match next_page(&page, count, offset, default_limit) {
                Next::Done => return Ok(items),
                _ if count == 0 => {
                    debug!(path = path, "Empty page reported more results, stopping");
                    return Ok(items);
                }
                Next::Cursor(cursor) => set_param(&mut query, CURSOR_PARAM, cursor),
                Next::Offset { offset: next, limit } => {
                    offset = next;
                    set_param(&mut query, OFFSET_PARAM, next.to_string());
                    set_param(&mut query, LIMIT_PARAM, limit.to_string());
                }
                Next::Link(next) => {
                    // The link already encodes every parameter.
                    target = next;
                    query.clear();
                }
            }
        }

        warn!(path = path, max_pages = max_pages, "Pagination stopped at page limit");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_items() {
        assert_eq!(page_items(&json!({"data": [1, 2]})), vec![json!(1), json!(2)]);
        assert_eq!(page_items(&json!([3])), vec![json!(3)]);
        assert!(page_items(&json!({"other": true})).is_empty());
    }

    #[test]
    fn test_cursor_preferred_over_offset() {
        let page = json!({"data": [1], "pagination": {"cursor": "abc", "hasMore": true, "offset": 0, "limit": 1}});
        assert_eq!(next_page(&page, 1, 0, 100), Next::Cursor("abc".to_string()));
    }

    #[test]
    fn test_offset_fallback_without_cursor() {
        let page = json!({"data": [1, 2], "pagination": {"hasMore": true, "limit": 2}});
        assert_eq!(next_page(&page, 2, 4, 100), Next::Offset { offset: 6, limit: 2 });

        let page = json!({"data": [1, 2, 3], "pagination": {"hasMore": true}});
        assert_eq!(next_page(&page, 3, 0, 100), Next::Offset { offset: 3, limit: 3 });
    }

    #[test]
    fn test_termination() {
        let page = json!({"data": [1], "pagination": {"cursor": "abc", "hasMore": false}});
        assert_eq!(next_page(&page, 1, 0, 100), Next::Done);
        assert_eq!(next_page(&json!({"data": []}), 0, 0, 100), Next::Done);
    }

    #[test]
    fn test_links_next() {
        let page = json!({"data": [1], "links": {"next": "https://api.example.com/features?pageCursor=x"}});
        assert_eq!(
            next_page(&page, 1, 0, 100),
            Next::Link("https://api.example.com/features?pageCursor=x".to_string())
        );
    }

    #[test]
    fn test_set_param_replaces() {
        let mut query = vec![("pageCursor".to_string(), "a".to_string()), ("x".to_string(), "1".to_string())];
        set_param(&mut query, CURSOR_PARAM, "b".to_string());
        assert_eq!(query, vec![("x".to_string(), "1".to_string()), ("pageCursor".to_string(), "b".to_string())]);
    }
}
