//! Tools exposed over the protocol
//!
//! Each tool is an independent value implementing [`Tool`]. Permission is a
//! plain field; nothing is inherited.

mod api_tool;
mod batch_tool;
mod catalog;

pub use api_tool::ApiTool;
pub use batch_tool::BatchTool;
pub use catalog::build_registry;

use crate::error::{ProductboardError, Result};
use async_trait::async_trait;
use jsonschema::JSONSchema;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Access level a tool needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Write => write!(f, "write"),
            Permission::Delete => write!(f, "delete"),
        }
    }
}

/// Public description of a tool, as listed by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Input schema of a tool, compiled on first use and reused afterwards
pub struct ToolSchema {
    value: Value,
    compiled: OnceCell<std::result::Result<JSONSchema, String>>,
}

impl ToolSchema {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            compiled: OnceCell::new(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Compiled validator; a schema that fails to compile keeps failing with the same message
    pub fn compiled(&self) -> Result<&JSONSchema> {
        self.compiled
            .get_or_init(|| JSONSchema::compile(&self.value).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| ProductboardError::config(format!("Invalid JSON Schema: {}", e)))
    }
}

impl fmt::Debug for ToolSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSchema")
            .field("value", &self.value)
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

/// A callable tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Schema for the arguments object
    fn schema(&self) -> &ToolSchema;

    fn input_schema(&self) -> &Value {
        self.schema().value()
    }

    fn permission(&self) -> Permission;

    /// Run the tool. API failures are reported in the returned outcome;
    /// `Err` is reserved for failures of the tool itself.
    async fn execute(&self, arguments: Value) -> Result<Value>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema().clone(),
        }
    }

    /// Validate arguments against the input schema
    fn validate_arguments(&self, arguments: &Value) -> Result<()> {
        let schema = self.schema().compiled().map_err(|e| {
            ProductboardError::validation(format!("Cannot validate arguments for tool '{}': {}", self.name(), e))
        })?;

        let result = schema.validate(arguments);
        match result {
            Ok(()) => Ok(()),
            Err(errors) => {
                let messages: Vec<String> = errors.map(|e| format!("  - {}", e)).collect();
                Err(ProductboardError::validation(format!(
                    "Invalid arguments for tool '{}':\n{}",
                    self.name(),
                    messages.join("\n")
                )))
            }
        }
    }
}

/// `{success: true, data}`
pub fn tool_success(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

/// `{success: false, error}`
pub fn tool_failure(error: &ProductboardError) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// Tools in registration order; immutable once handed to the protocol handler
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; names must be unique and schemas must compile
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ProductboardError::config(format!("Tool '{}' is registered twice", name)));
        }
        tool.schema()
            .compiled()
            .map_err(|e| ProductboardError::config(format!("Tool '{}': {}", name, e)))?;
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
