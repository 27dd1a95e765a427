//! Productboard REST API client

mod api_client;
mod batch;
pub mod error_mapping;
mod pagination;

pub use api_client::{build_http_client, ApiClient, HttpMethod, API_VERSION_HEADER};
pub use batch::{query_pairs, BatchOperation, BatchResult};
pub use pagination::{page_items, CURSOR_PARAM, LIMIT_PARAM, OFFSET_PARAM};
