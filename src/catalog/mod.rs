//! Data-driven catalog of the controller's read-only REST endpoints.
//!
//! Every catalog entry becomes an MCP tool and a readable resource. Adding
//! an endpoint means adding one row to [`ENDPOINTS`]; path building, query
//! assembly, and schema generation all derive from the row.
//!
//! # Extension
//! Rows carry only GET endpoints today. If the controller surface grows
//! mutating operations, extend [`EndpointSpec`] with a method field and
//! thread it through [`crate::forwarder::Method`].

use serde_json::{json, Map, Value};

/// One read-only controller endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    /// Tool name, snake_case, unique within the catalog.
    pub name: &'static str,
    /// Human-readable description surfaced in tool listings.
    pub title: &'static str,
    /// Path template; `{param}` segments are filled from arguments.
    pub path: &'static str,
    /// Parameters substituted into the path. All required.
    pub path_params: &'static [&'static str],
    /// Parameters appended to the query string. All optional; empty
    /// values are omitted from the request.
    pub query_params: &'static [&'static str],
}

pub static ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        name: "get_all_appliance_status",
        title: "Status of every appliance known to the controller",
        path: "/nextgen/appliance/status",
        path_params: &[],
        query_params: &["limit", "offset"],
    },
    EndpointSpec {
        name: "get_appliance_status",
        title: "Status of a single appliance by id",
        path: "/nextgen/appliance/status/{id}",
        path_params: &["id"],
        query_params: &["byName"],
    },
    EndpointSpec {
        name: "get_device_template_listing",
        title: "Templates associated with a device",
        path: "/nextgen/appliance/template_listing/{deviceName}",
        path_params: &["deviceName"],
        query_params: &["tenant"],
    },
    EndpointSpec {
        name: "get_appliance_locations",
        title: "Geographic locations of all appliances",
        path: "/vnms/dashboard/appliance/location",
        path_params: &[],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_routing_instances",
        title: "Routing instances configured on an appliance",
        path: "/vnms/appliance/{applianceName}/routing-instances",
        path_params: &["applianceName"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_all_appliances",
        title: "All appliances, filterable by type and tags",
        path: "/vnms/appliance/appliance",
        path_params: &[],
        query_params: &["offset", "limit", "type", "tags"],
    },
    EndpointSpec {
        name: "get_all_appliances_lite",
        title: "Lightweight appliance listing",
        path: "/vnms/appliance/appliance/lite",
        path_params: &[],
        query_params: &["filterString", "limit", "offset", "org", "tags"],
    },
    EndpointSpec {
        name: "search_appliance_by_name",
        title: "Search appliances by name fragment",
        path: "/vnms/appliance/applianceByName",
        path_params: &[],
        query_params: &["name", "limit", "offset"],
    },
    EndpointSpec {
        name: "get_appliances_summary",
        title: "Summary counts across all appliances",
        path: "/vnms/appliance/summary",
        path_params: &[],
        query_params: &["filterByName"],
    },
    EndpointSpec {
        name: "get_audit_logs",
        title: "Controller audit log entries",
        path: "/vnms/audit/logs",
        path_params: &[],
        query_params: &["limit", "offset", "searchKey"],
    },
    EndpointSpec {
        name: "get_device_workflows",
        title: "All device workflows",
        path: "/vnms/sdwan/workflow/devices",
        path_params: &[],
        query_params: &["filters", "limit", "offset", "orgname"],
    },
    EndpointSpec {
        name: "get_device_workflow",
        title: "One device workflow by device name",
        path: "/vnms/sdwan/workflow/devices/device/{deviceName}",
        path_params: &["deviceName"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_template_workflows",
        title: "All template workflows",
        path: "/vnms/sdwan/workflow/templates",
        path_params: &[],
        query_params: &["limit", "offset", "orgname", "searchKeyword"],
    },
    EndpointSpec {
        name: "get_template_workflow",
        title: "One template workflow by name",
        path: "/vnms/sdwan/workflow/templates/template/{templateworkflowName}",
        path_params: &["templateworkflowName"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_template_bind_data",
        title: "Bind-data header and device count for a template",
        path: "/vnms/sdwan/workflow/binddata/devices/header/template/{templateName}",
        path_params: &["templateName"],
        query_params: &["organization"],
    },
    EndpointSpec {
        name: "get_device_groups",
        title: "All device groups",
        path: "/nextgen/deviceGroup",
        path_params: &[],
        query_params: &["filters", "limit", "offset", "organization"],
    },
    EndpointSpec {
        name: "get_device_group",
        title: "One device group by name",
        path: "/nextgen/deviceGroup/{deviceGroupName}",
        path_params: &["deviceGroupName"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_model_numbers",
        title: "Hardware model numbers known to the controller",
        path: "/nextgen/deviceGroup/modelNumbers",
        path_params: &[],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_all_assets",
        title: "Inventory of all assets",
        path: "/vnms/assets/asset",
        path_params: &[],
        query_params: &["filters", "limit", "offset", "organization"],
    },
    EndpointSpec {
        name: "get_appliance_hardware",
        title: "Hardware details of an appliance by UUID",
        path: "/vnms/dashboard/appliance/{uuid}/hardware",
        path_params: &["uuid"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_appliance_alarms_summary",
        title: "Alarm summary for one organization",
        path: "/vnms/fault/alarms/summary/{org}",
        path_params: &["org"],
        query_params: &[],
    },
    EndpointSpec {
        name: "get_alarms",
        title: "Controller fault alarms",
        path: "/vnms/fault/alarms",
        path_params: &[],
        query_params: &["limit", "offset", "org"],
    },
];

/// Look up a catalog entry by tool name.
pub fn find(name: &str) -> Option<&'static EndpointSpec> {
    ENDPOINTS.iter().find(|e| e.name == name)
}

impl EndpointSpec {
    /// Fill the path template from `args`, failing fast with the name of
    /// the first missing path parameter.
    pub fn build_path(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
        let mut path = self.path.to_string();
        for param in self.path_params {
            let value = args
                .get(*param)
                .map(value_as_string)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("missing required path parameter '{param}' for {}", self.name)
                })?;
            path = path.replace(&format!("{{{param}}}"), &value);
        }
        Ok(path)
    }

    /// Collect query parameters present in `args`. Absent and empty
    /// values are omitted rather than sent blank.
    pub fn query_from(&self, args: &Map<String, Value>) -> Vec<(String, String)> {
        self.query_params
            .iter()
            .filter_map(|param| {
                let value = args.get(*param).map(value_as_string)?;
                if value.trim().is_empty() {
                    None
                } else {
                    Some(((*param).to_string(), value))
                }
            })
            .collect()
    }

    /// JSON schema for this endpoint's tool arguments. Path parameters are
    /// required strings; query parameters are optional.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.path_params {
            properties.insert(
                (*param).to_string(),
                json!({ "type": "string", "description": format!("Path parameter '{param}'") }),
            );
        }
        for param in self.query_params {
            let schema = if matches!(*param, "limit" | "offset") {
                json!({ "type": "integer", "description": format!("Query parameter '{param}'") })
            } else {
                json!({ "type": "string", "description": format!("Query parameter '{param}'") })
            };
            properties.insert((*param).to_string(), schema);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.path_params,
        })
    }
}

/// Stringify an argument the way it appears on the wire. Numbers pass
/// through without quotes so `limit=25` stays numeric.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
