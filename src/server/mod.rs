//! MCP JSON-RPC surface over the controller forwarder.
//!
//! One [`Dispatcher`] serves both transports: the stdio loop in
//! [`stdio`] and the HTTP gateway in [`crate::gateway`]. Every catalog
//! endpoint is exposed as a tool and as a readable `sdwan:///` resource;
//! three composite tools cover live-status commands, EIP cache lookups,
//! and auto-pagination.
//!
//! # Extension
//! New controller endpoints need only a catalog row; the dispatcher picks
//! them up in `tools/list`, `tools/call`, and the resource surface
//! without further wiring.

pub mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::catalog::{self, value_as_string};
use crate::commands;
use crate::forwarder::{filter_query, Method, RequestForwarder};
use crate::paginate::{self, PageFetcher, PageRequest};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "sdwan-mcp";

const DEFAULT_PAGE_LIMIT: u64 = 25;
const DEFAULT_MAX_RECORDS: u64 = 1000;

// ── JSON-RPC envelope ────────────────────────────────────────────────────

/// Incoming JSON-RPC request. `id` is absent for notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct McpRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: i64,
    pub message: String,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────

/// Stateless request dispatcher shared by both transports.
pub struct Dispatcher {
    forwarder: Arc<RequestForwarder>,
}

/// Adapts the forwarder to the pagination loop.
struct ForwarderPages<'a>(&'a RequestForwarder);

#[async_trait]
impl PageFetcher for ForwarderPages<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> anyhow::Result<Value> {
        let mut query = vec![
            ("offset".to_string(), request.offset.to_string()),
            ("limit".to_string(), request.limit.to_string()),
        ];
        if let Some(fields) = &request.fields {
            query.push(("fields".to_string(), fields.clone()));
        }
        self.0
            .forward(&request.path, Method::Get, &query, None)
            .await
    }
}

impl Dispatcher {
    pub fn new(forwarder: Arc<RequestForwarder>) -> Self {
        Self { forwarder }
    }

    /// Handle one request. Notifications return `None` (no response on
    /// the wire).
    pub async fn handle(&self, request: McpRequest) -> Option<McpResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "Ignoring notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => McpResponse::success(id, self.initialize_result()),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": self.tool_list() })),
            "tools/call" => self.tools_call(id, &request.params).await,
            "resources/templates/list" => {
                McpResponse::success(id, json!({ "resourceTemplates": self.resource_templates() }))
            }
            "resources/read" => self.resources_read(id, &request.params).await,
            other => {
                McpResponse::error(id, -32601, format!("Method not found: {other}"))
            }
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn tool_list(&self) -> Vec<Value> {
        let mut tools: Vec<Value> = catalog::ENDPOINTS
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.title,
                    "inputSchema": spec.input_schema(),
                })
            })
            .collect();

        tools.push(json!({
            "name": "appliance_live_status",
            "description": "Run a live operational-status command against an appliance",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "appliance": { "type": "string", "description": "Appliance name" },
                    "command": {
                        "type": "string",
                        "description": "Command reference",
                        "enum": commands::live_status().references(),
                    },
                    "org": { "type": "string", "description": "Organization name, required by per-org commands" },
                    "fetch": { "type": "string", "description": "Fetch mode, e.g. 'all'" },
                    "filters": { "type": "string", "description": "Optional response filter expression" }
                },
                "required": ["appliance", "command"]
            }
        }));
        tools.push(json!({
            "name": "eip_cache_lookup",
            "description": "Query the EIP agent cache through the portal API",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Cache query reference",
                        "enum": commands::eip_cache().references(),
                    },
                    "org": { "type": "string", "description": "Organization name, required by per-org queries" }
                },
                "required": ["command"]
            }
        }));
        tools.push(json!({
            "name": "fetch_all_records",
            "description": "Fetch every record of a paged collection endpoint, following offsets automatically",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Paged endpoint path, e.g. /vnms/assets/asset" },
                    "fields": { "type": "string", "description": "Comma-separated field selector" },
                    "offset": { "type": "integer", "description": "Starting offset (default 0)" },
                    "limit": { "type": "integer", "description": "Page size (default 25)" },
                    "max_records": { "type": "integer", "description": "Record ceiling (default 1000)" }
                },
                "required": ["path"]
            }
        }));
        tools
    }

    async fn tools_call(&self, id: Value, params: &Value) -> McpResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return McpResponse::error(id, -32602, "tools/call requires a 'name' parameter");
        };
        let empty = Map::new();
        let args = params
            .get("arguments")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        tracing::info!(tool = name, "Tool call");

        let outcome = match name {
            "appliance_live_status" => self.call_live_status(args).await,
            "eip_cache_lookup" => self.call_eip_cache(args).await,
            "fetch_all_records" => self.call_fetch_all(args).await,
            other => match catalog::find(other) {
                Some(spec) => self.call_catalog(spec, args).await,
                None => {
                    return McpResponse::error(id, -32602, format!("Unknown tool: {other}"));
                }
            },
        };

        match outcome {
            Ok(payload) => McpResponse::success(id, tool_result(&payload, false)),
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "Tool call failed");
                McpResponse::success(id, tool_result(&json!({ "error": err.to_string() }), true))
            }
        }
    }

    async fn call_catalog(
        &self,
        spec: &catalog::EndpointSpec,
        args: &Map<String, Value>,
    ) -> anyhow::Result<Value> {
        let path = spec.build_path(args)?;
        let query = spec.query_from(args);
        self.forwarder.forward(&path, Method::Get, &query, None).await
    }

    async fn call_live_status(&self, args: &Map<String, Value>) -> anyhow::Result<Value> {
        let appliance = require_str(args, "appliance")?;
        let reference = require_str(args, "command")?;
        let org = args.get("org").and_then(Value::as_str);

        let resolved = match commands::live_status().resolve(reference, org) {
            Ok(resolved) => resolved,
            // Resolution failures are answers, not faults: the payload
            // enumerates what the caller should have sent.
            Err(err) => return Ok(err.to_payload()),
        };

        // The resolved command carries pre-encoded %2F segments; it must
        // ride in the path verbatim, never through query encoding.
        let path = format!("/vnms/dashboard/appliance/{appliance}/live?command={resolved}");
        let query = filter_query(&[
            ("fetch", args.get("fetch").map(value_as_string)),
            ("filters", args.get("filters").map(value_as_string)),
        ]);

        self.forwarder.forward(&path, Method::Get, &query, None).await
    }

    async fn call_eip_cache(&self, args: &Map<String, Value>) -> anyhow::Result<Value> {
        let reference = require_str(args, "command")?;
        let org = args.get("org").and_then(Value::as_str);

        let resolved = match commands::eip_cache().resolve(reference, org) {
            Ok(resolved) => resolved,
            Err(err) => return Ok(err.to_payload()),
        };

        let path = format!("/portalapi/v1/{resolved}");
        self.forwarder.forward(&path, Method::Get, &[], None).await
    }

    async fn call_fetch_all(&self, args: &Map<String, Value>) -> anyhow::Result<Value> {
        let path = require_str(args, "path")?;
        if !path.starts_with('/') {
            anyhow::bail!("'path' must start with '/'");
        }
        let fields = args.get("fields").and_then(Value::as_str);
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let max_records = args
            .get("max_records")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_RECORDS);

        let pages = ForwarderPages(self.forwarder.as_ref());
        let aggregate =
            paginate::fetch_all(&pages, path, fields, offset, limit, max_records).await?;
        Ok(aggregate.into_payload())
    }

    // ── Resources ────────────────────────────────────────────────────────

    fn resource_templates(&self) -> Vec<Value> {
        catalog::ENDPOINTS
            .iter()
            .map(|spec| {
                let mut template = format!("sdwan:///{}", spec.name);
                let params: Vec<&str> = spec
                    .path_params
                    .iter()
                    .chain(spec.query_params.iter())
                    .copied()
                    .collect();
                if !params.is_empty() {
                    template.push_str(&format!("{{?{}}}", params.join(",")));
                }
                json!({
                    "uriTemplate": template,
                    "name": spec.name,
                    "description": spec.title,
                    "mimeType": "application/json",
                })
            })
            .collect()
    }

    async fn resources_read(&self, id: Value, params: &Value) -> McpResponse {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return McpResponse::error(id, -32602, "resources/read requires a 'uri' parameter");
        };

        match self.read_resource(uri).await {
            Ok(text) => McpResponse::success(
                id,
                json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": text,
                    }]
                }),
            ),
            Err(err) => McpResponse::error(id, -32002, format!("Resource read failed: {err}")),
        }
    }

    async fn read_resource(&self, uri: &str) -> anyhow::Result<String> {
        let (name, args) = parse_resource_uri(uri)?;
        let spec = catalog::find(&name)
            .ok_or_else(|| anyhow::anyhow!("unknown endpoint '{name}'"))?;

        let path = spec.build_path(&args)?;
        let query = spec.query_from(&args);
        self.forwarder
            .forward_raw(&path, Method::Get, &query, None)
            .await
    }
}

/// Split a `sdwan:///{endpoint}?{params}` URI into the endpoint name and
/// its arguments.
fn parse_resource_uri(uri: &str) -> anyhow::Result<(String, Map<String, Value>)> {
    let rest = uri
        .strip_prefix("sdwan:///")
        .ok_or_else(|| anyhow::anyhow!("unsupported URI scheme in '{uri}'"))?;

    let (name, query) = match rest.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (rest, None),
    };
    if name.is_empty() {
        anyhow::bail!("empty endpoint name in '{uri}'");
    }

    let mut args = Map::new();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            args.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    Ok((name.to_string(), args))
}

/// Wrap a tool payload in the MCP content envelope.
fn tool_result(payload: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credentials, SessionManager};
    use std::time::Duration;

    // No test below reaches the network: the session points at TEST-NET-1
    // and only pre-dispatch paths are exercised.
    fn dispatcher() -> Dispatcher {
        let creds = Credentials {
            base_url: "https://192.0.2.1:9182".into(),
            client_id: "voae_rest".into(),
            client_secret: "secret".into(),
            username: "admin".into(),
            password: "pw".into(),
        };
        let session =
            Arc::new(SessionManager::new(creds, true, Duration::from_secs(30)).unwrap());
        let forwarder =
            Arc::new(RequestForwarder::new(session, true, Duration::from_secs(30)).unwrap());
        Dispatcher::new(forwarder)
    }

    fn request(method: &str, params: Value) -> McpRequest {
        McpRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server() {
        let resp = dispatcher()
            .handle(request("initialize", json!({})))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let req = McpRequest {
            jsonrpc: "2.0".into(),
            id: None,
            method: "notifications/initialized".into(),
            params: json!({}),
        };
        assert!(dispatcher().handle(req).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_rpc_error() {
        let resp = dispatcher()
            .handle(request("prompts/list", json!({})))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_list_includes_catalog_and_composites() {
        let resp = dispatcher()
            .handle(request("tools/list", json!({})))
            .await
            .unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), catalog::ENDPOINTS.len() + 3);

        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"appliance_live_status"));
        assert!(names.contains(&"eip_cache_lookup"));
        assert!(names.contains(&"fetch_all_records"));
        assert!(names.contains(&"get_all_assets"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let resp = dispatcher()
            .handle(request(
                "tools/call",
                json!({"name": "reboot_appliance", "arguments": {}}),
            ))
            .await
            .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32602);
        assert!(err.message.contains("reboot_appliance"));
    }

    #[tokio::test]
    async fn bad_command_reference_recovers_with_available_list() {
        let resp = dispatcher()
            .handle(request(
                "tools/call",
                json!({
                    "name": "appliance_live_status",
                    "arguments": {"appliance": "branch-1", "command": "not-a-command"}
                }),
            ))
            .await
            .unwrap();

        // Recovered payload, not a transport failure.
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("not-a-command"));
        assert!(payload["available"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "interfaces-brief"));
    }

    #[tokio::test]
    async fn missing_tool_argument_is_tool_error() {
        let resp = dispatcher()
            .handle(request(
                "tools/call",
                json!({"name": "appliance_live_status", "arguments": {"command": "interfaces-brief"}}),
            ))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("appliance"));
    }

    #[tokio::test]
    async fn fetch_all_rejects_relative_path() {
        let resp = dispatcher()
            .handle(request(
                "tools/call",
                json!({"name": "fetch_all_records", "arguments": {"path": "vnms/assets/asset"}}),
            ))
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn resource_templates_cover_the_catalog() {
        let resp = dispatcher()
            .handle(request("resources/templates/list", json!({})))
            .await
            .unwrap();
        let templates = resp.result.unwrap()["resourceTemplates"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(templates.len(), catalog::ENDPOINTS.len());
        assert!(templates
            .iter()
            .all(|t| t["uriTemplate"].as_str().unwrap().starts_with("sdwan:///")));
    }

    #[test]
    fn resource_uri_parses_name_and_args() {
        let (name, args) =
            parse_resource_uri("sdwan:///get_all_assets?limit=25&organization=ACME").unwrap();
        assert_eq!(name, "get_all_assets");
        assert_eq!(args["limit"], "25");
        assert_eq!(args["organization"], "ACME");
    }

    #[test]
    fn resource_uri_rejects_foreign_scheme() {
        assert!(parse_resource_uri("https://example.com/x").is_err());
        assert!(parse_resource_uri("sdwan:///").is_err());
    }

    #[tokio::test]
    async fn read_unknown_resource_is_error() {
        let resp = dispatcher()
            .handle(request(
                "resources/read",
                json!({"uri": "sdwan:///no_such_endpoint"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, -32002);
    }
}
