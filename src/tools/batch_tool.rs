//! `pb_batch`: several API calls in one tool invocation

use crate::client::{ApiClient, BatchOperation};
use crate::error::{ProductboardError, Result};
use crate::tools::{tool_success, Permission, Tool, ToolSchema};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub const BATCH_TOOL_NAME: &str = "pb_batch";

#[derive(Debug, Deserialize)]
struct BatchArguments {
    operations: Vec<BatchOperation>,
}

/// Runs operations sequentially and reports one result per operation
pub struct BatchTool {
    schema: ToolSchema,
    client: Arc<ApiClient>,
}

impl BatchTool {
    pub fn new(client: Arc<ApiClient>) -> Self {
        let schema = json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] },
                            "path": { "type": "string", "minLength": 1 },
                            "query": { "type": "object" },
                            "body": {}
                        },
                        "required": ["method", "path"]
                    }
                }
            },
            "required": ["operations"]
        });
        Self {
            schema: ToolSchema::new(schema),
            client,
        }
    }
}

#[async_trait]
impl Tool for BatchTool {
    fn name(&self) -> &str {
        BATCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute several Productboard API operations in order. A failing operation does not stop the others."
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn permission(&self) -> Permission {
        Permission::Write
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let BatchArguments { operations } = serde_json::from_value(arguments)
            .map_err(|e| ProductboardError::validation(format!("Invalid batch operations: {}", e)))?;

        let results = self.client.batch(&operations).await;
        let failed = results.iter().filter(|r| !r.success).count();
        info!(operations = results.len(), failed, "Batch executed");

        Ok(tool_success(serde_json::to_value(results)?))
    }
}
