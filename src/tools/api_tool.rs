//! Declarative pass-through tool over one API endpoint

use crate::client::{query_pairs, ApiClient, HttpMethod};
use crate::error::{ProductboardError, Result};
use crate::tools::{tool_failure, tool_success, Permission, Tool, ToolSchema};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// `{param}` placeholders in path templates
static PATH_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex pattern"));

/// Fill `{param}` placeholders from `arguments`, removing the consumed entries
pub fn render_path(template: &str, arguments: &mut Map<String, Value>) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PATH_PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = match arguments.remove(name.as_str()) {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ProductboardError::validation(format!(
                    "Missing required path parameter '{}'",
                    name.as_str()
                )))
            }
        };
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&urlencoding::encode(&value));
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Tool that maps its arguments onto one HTTP call
///
/// Path placeholders are taken from the arguments first. What remains becomes
/// query parameters for GET/DELETE and the JSON body otherwise.
pub struct ApiTool {
    name: String,
    description: String,
    schema: ToolSchema,
    permission: Permission,
    method: HttpMethod,
    path: String,
    paginated: bool,
    body_wrapper: Option<String>,
    query_names: HashMap<String, String>,
    client: Arc<ApiClient>,
}

impl ApiTool {
    pub fn new(
        name: &str,
        description: &str,
        method: HttpMethod,
        path: &str,
        input_schema: Value,
        client: Arc<ApiClient>,
    ) -> Self {
        let permission = match method {
            HttpMethod::Get => Permission::Read,
            HttpMethod::Delete => Permission::Delete,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => Permission::Write,
        };
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema: ToolSchema::new(input_schema),
            permission,
            method,
            path: path.to_string(),
            paginated: false,
            body_wrapper: None,
            query_names: HashMap::new(),
            client,
        }
    }

    /// Fetch every page instead of the first one
    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }

    /// Send the body as `{ <key>: arguments }`
    pub fn wrap_body(mut self, key: &str) -> Self {
        self.body_wrapper = Some(key.to_string());
        self
    }

    /// Send argument `argument` under the query name `query_name`
    pub fn query_name(mut self, argument: &str, query_name: &str) -> Self {
        self.query_names.insert(argument.to_string(), query_name.to_string());
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn query(&self, arguments: Map<String, Value>) -> Vec<(String, String)> {
        let renamed: Map<String, Value> = arguments
            .into_iter()
            .map(|(k, v)| match self.query_names.get(&k) {
                Some(name) => (name.clone(), v),
                None => (k, v),
            })
            .collect();
        query_pairs(&renamed)
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value> {
        let mut arguments = arguments;
        let path = render_path(&self.path, &mut arguments)?;

        match self.method {
            HttpMethod::Get if self.paginated => {
                let query = self.query(arguments);
                self.client.get_all_pages(&path, &query).await.map(Value::Array)
            }
            HttpMethod::Get | HttpMethod::Delete => {
                let query = self.query(arguments);
                let response = self.client.request(self.method, &path, &query, None).await?;
                Ok(unwrap_data(response))
            }
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
                let body = match &self.body_wrapper {
                    Some(key) => {
                        let mut wrapped = Map::new();
                        wrapped.insert(key.clone(), Value::Object(arguments));
                        Value::Object(wrapped)
                    }
                    None => Value::Object(arguments),
                };
                let response = self.client.request(self.method, &path, &[], Some(&body)).await?;
                Ok(unwrap_data(response))
            }
        }
    }
}

/// Productboard wraps single entities in `{ data: ... }`
fn unwrap_data(response: Value) -> Value {
    match response {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

#[async_trait]
impl Tool for ApiTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn permission(&self) -> Permission {
        self.permission
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ProductboardError::validation(format!(
                    "Arguments for tool '{}' must be an object, got {}",
                    self.name, other
                )))
            }
        };

        match self.call(arguments).await {
            Ok(data) => {
                debug!(tool = %self.name, "Tool call succeeded");
                Ok(tool_success(data))
            }
            Err(e) => {
                warn!(tool = %self.name, category = e.category(), error = %e, "Tool call failed");
                Ok(tool_failure(&e))
            }
        }
    }
}
