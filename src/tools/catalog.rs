//! The Productboard tool set

use crate::client::{ApiClient, HttpMethod};
use crate::error::Result;
use crate::tools::{ApiTool, BatchTool, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { "id": { "type": "string", "description": description } },
        "required": ["id"]
    })
}

fn list_schema(properties: Value) -> Value {
    json!({ "type": "object", "properties": properties })
}

fn feature_tools(client: &Arc<ApiClient>) -> Vec<ApiTool> {
    vec![
        ApiTool::new(
            "pb_feature_list",
            "List features, following pagination to the end",
            HttpMethod::Get,
            "/features",
            list_schema(json!({
                "status": { "type": "string", "description": "Only features with this status name" },
                "archived": { "type": "boolean" }
            })),
            Arc::clone(client),
        )
        .paginated()
        .query_name("status", "status.name"),
        ApiTool::new(
            "pb_feature_get",
            "Get one feature by id",
            HttpMethod::Get,
            "/features/{id}",
            id_schema("Feature id"),
            Arc::clone(client),
        ),
        ApiTool::new(
            "pb_feature_create",
            "Create a feature or subfeature",
            HttpMethod::Post,
            "/features",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "type": { "type": "string", "enum": ["feature", "subfeature"] },
                    "status": {
                        "type": "object",
                        "properties": { "id": { "type": "string" }, "name": { "type": "string" } }
                    },
                    "parent": { "type": "object" }
                },
                "required": ["name"]
            }),
            Arc::clone(client),
        )
        .wrap_body("data"),
        ApiTool::new(
            "pb_feature_update",
            "Update fields of an existing feature",
            HttpMethod::Patch,
            "/features/{id}",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "archived": { "type": "boolean" },
                    "status": { "type": "object" },
                    "timeframe": { "type": "object" }
                },
                "required": ["id"]
            }),
            Arc::clone(client),
        )
        .wrap_body("data"),
        ApiTool::new(
            "pb_feature_delete",
            "Delete a feature",
            HttpMethod::Delete,
            "/features/{id}",
            id_schema("Feature id"),
            Arc::clone(client),
        ),
    ]
}

fn note_tools(client: &Arc<ApiClient>) -> Vec<ApiTool> {
    vec![
        ApiTool::new(
            "pb_note_list",
            "List customer feedback notes",
            HttpMethod::Get,
            "/notes",
            list_schema(json!({
                "term": { "type": "string", "description": "Full-text search term" },
                "last": { "type": "string", "description": "Relative window such as 7d" }
            })),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_note_create",
            "Create a customer feedback note",
            HttpMethod::Post,
            "/notes",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "minLength": 1 },
                    "content": { "type": "string" },
                    "customer_email": { "type": "string" },
                    "display_url": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["title", "content"]
            }),
            Arc::clone(client),
        ),
    ]
}

fn hierarchy_tools(client: &Arc<ApiClient>) -> Vec<ApiTool> {
    vec![
        ApiTool::new(
            "pb_product_list",
            "List products",
            HttpMethod::Get,
            "/products",
            list_schema(json!({})),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_component_list",
            "List components",
            HttpMethod::Get,
            "/components",
            list_schema(json!({})),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_component_create",
            "Create a component under a product or component",
            HttpMethod::Post,
            "/components",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "description": { "type": "string" },
                    "parent": { "type": "object" }
                },
                "required": ["name", "parent"]
            }),
            Arc::clone(client),
        )
        .wrap_body("data"),
    ]
}

fn workspace_tools(client: &Arc<ApiClient>) -> Vec<ApiTool> {
    vec![
        ApiTool::new(
            "pb_company_list",
            "List companies",
            HttpMethod::Get,
            "/companies",
            list_schema(json!({
                "term": { "type": "string" }
            })),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_user_list",
            "List users",
            HttpMethod::Get,
            "/users",
            list_schema(json!({})),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_objective_list",
            "List objectives",
            HttpMethod::Get,
            "/objectives",
            list_schema(json!({})),
            Arc::clone(client),
        )
        .paginated(),
        ApiTool::new(
            "pb_release_list",
            "List releases",
            HttpMethod::Get,
            "/releases",
            list_schema(json!({})),
            Arc::clone(client),
        )
        .paginated(),
    ]
}

/// Register every tool against one shared client
pub fn build_registry(client: Arc<ApiClient>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    let api_tools = feature_tools(&client)
        .into_iter()
        .chain(note_tools(&client))
        .chain(hierarchy_tools(&client))
        .chain(workspace_tools(&client));
    for tool in api_tools {
        registry.register(Arc::new(tool))?;
    }
    registry.register(Arc::new(BatchTool::new(client)))?;

    debug!(tools = registry.len(), "Tool registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::startup::Application;
    use crate::tools::Permission;
    use secrecy::Secret;

    async fn registry() -> Arc<ToolRegistry> {
        let mut config = Config::default();
        config.auth.token = Some(Secret::new("test-token".to_string()));
        let app = Application::build(config).await.unwrap();
        Arc::clone(app.handler.registry())
    }

    #[tokio::test]
    async fn test_registry_lists_every_tool_once() {
        let registry = registry().await;
        let names = registry.names();
        assert_eq!(names.len(), 15);
        assert_eq!(names.first(), Some(&"pb_feature_list"));
        assert_eq!(names.last(), Some(&"pb_batch"));
        for name in ["pb_note_create", "pb_component_create", "pb_release_list"] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_permissions_follow_http_method() {
        let registry = registry().await;
        let permission = |name: &str| registry.get(name).unwrap().permission();
        assert_eq!(permission("pb_feature_list"), Permission::Read);
        assert_eq!(permission("pb_feature_update"), Permission::Write);
        assert_eq!(permission("pb_feature_delete"), Permission::Delete);
        assert_eq!(permission("pb_batch"), Permission::Write);
    }

    #[tokio::test]
    async fn test_schemas_reject_missing_required_fields() {
        let registry = registry().await;
        let create = registry.get("pb_feature_create").unwrap();
        assert!(create.validate_arguments(&json!({"name": "Dark mode"})).is_ok());
        let err = create.validate_arguments(&json!({})).unwrap_err();
        assert!(err.to_string().contains("pb_feature_create"));
    }
}
