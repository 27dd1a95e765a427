//! Sequential batch execution with per-operation results

use crate::client::{ApiClient, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One request of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl BatchOperation {
    pub fn new<S: Into<String>>(method: HttpMethod, path: S) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Outcome of one batch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Flatten a JSON object into query pairs; strings stay unquoted, nulls are dropped
pub fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    query
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), value))
        })
        .collect()
}

impl ApiClient {
    /// Run operations one after another; a failure never stops the rest
    pub async fn batch(&self, operations: &[BatchOperation]) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(operations.len());
        for (index, operation) in operations.iter().enumerate() {
            let query = operation.query.as_ref().map(query_pairs).unwrap_or_default();
            let outcome = self
                .request(operation.method, &operation.path, &query, operation.body.as_ref())
                .await;
            match outcome {
                Ok(data) => {
                    debug!(index, method = %operation.method, path = %operation.path, "Batch operation succeeded");
                    results.push(BatchResult::ok(data));
                }
                Err(e) => {
                    warn!(index, method = %operation.method, path = %operation.path, error = %e, "Batch operation failed");
                    results.push(BatchResult::failed(e.to_string()));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs() {
        let query = json!({"status": "active", "limit": 5, "skip": null});
        let pairs = query_pairs(query.as_object().unwrap());
        assert!(pairs.contains(&("status".to_string(), "active".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_operation_deserializes_uppercase_method() {
        let op: BatchOperation = serde_json::from_value(json!({
            "method": "POST",
            "path": "/notes",
            "body": {"title": "x"}
        }))
        .unwrap();
        assert_eq!(op.method, HttpMethod::Post);
        assert!(op.query.is_none());
    }

    #[test]
    fn test_result_shape() {
        let value = serde_json::to_value(BatchResult::failed("boom")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "boom"}));
    }
}
