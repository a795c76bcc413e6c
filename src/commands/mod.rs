//! Short-form command references for the controller's command endpoints.
//!
//! Two independent tables exist because two unrelated backend sub-APIs
//! consume them. The appliance live-status family wants its command segments
//! joined with literal `%2F` (the dashboard endpoint decodes them itself),
//! while the EIP cache family on the portal sub-API takes plain `/` paths.
//! The encoding difference is a backend quirk; it is preserved per table and
//! must not be normalized away.
//!
//! Resolution failures are not programmer errors: they come from an
//! agent-supplied reference, so the error payload enumerates every valid key
//! to let the caller self-correct.

use serde_json::{json, Value};
use thiserror::Error;

/// Placeholder substituted with the caller's org/tenant name.
const ORG_PLACEHOLDER: &str = "{org}";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown command reference: {reference}")]
    UnknownReference {
        reference: String,
        available: Vec<&'static str>,
    },
    #[error("command reference {reference} requires an org name")]
    MissingContext { reference: String },
}

impl ResolveError {
    /// Structured payload for the MCP caller; resolver failures are recovered
    /// locally, never surfaced as protocol errors.
    pub fn to_payload(&self) -> Value {
        match self {
            ResolveError::UnknownReference {
                reference,
                available,
            } => json!({
                "error": format!("Unknown command reference: {reference}"),
                "available": available,
            }),
            ResolveError::MissingContext { reference } => json!({
                "error": format!("Command reference '{reference}' requires an org name; pass the `org` argument"),
            }),
        }
    }
}

/// One named, static table of command templates.
pub struct CommandSet {
    name: &'static str,
    entries: &'static [(&'static str, &'static str)],
}

impl CommandSet {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Sorted list of every valid reference in this set.
    pub fn references(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.iter().map(|(k, _)| *k).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a short reference into the backend command string,
    /// substituting the org placeholder when the template carries one.
    pub fn resolve(&self, reference: &str, org: Option<&str>) -> Result<String, ResolveError> {
        let template = self
            .entries
            .iter()
            .find(|(k, _)| *k == reference)
            .map(|(_, v)| *v)
            .ok_or_else(|| ResolveError::UnknownReference {
                reference: reference.to_string(),
                available: self.references(),
            })?;

        if !template.contains(ORG_PLACEHOLDER) {
            return Ok(template.to_string());
        }

        let org = org
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| ResolveError::MissingContext {
                reference: reference.to_string(),
            })?;

        Ok(template.replace(ORG_PLACEHOLDER, org))
    }
}

// ── Appliance live-status family ─────────────────────────────────
//
// Consumed by /vnms/dashboard/appliance/{name}/live?command=<resolved>.
// Segments are pre-encoded with %2F and must reach the wire untouched.

const LIVE_STATUS_ENTRIES: &[(&str, &str)] = &[
    ("interfaces-brief", "interfaces%2Fbrief"),
    ("interfaces-detail", "interfaces%2Fdetail"),
    ("system-details", "system%2Fdetails"),
    ("system-uptime", "system%2Fuptime"),
    ("bgp-summary", "orgs%2Forg-{org}%2Fbgp%2Fneighbors%2Fsummary"),
    ("route-table", "orgs%2Forg-{org}%2Froute-table"),
    ("ike-status", "orgs%2Forg-{org}%2Fipsec%2Fike"),
    ("ipsec-sa", "orgs%2Forg-{org}%2Fipsec%2Fsa"),
    ("sdwan-sessions", "orgs%2Forg-{org}%2Fsdwan%2Fsessions"),
    ("sdwan-path-status", "orgs%2Forg-{org}%2Fsdwan%2Fpath-status"),
    ("dhcp-leases", "orgs%2Forg-{org}%2Fdhcp%2Fleases"),
];

static LIVE_STATUS: CommandSet = CommandSet {
    name: "live-status",
    entries: LIVE_STATUS_ENTRIES,
};

/// Live-status command table (`%2F`-encoded segments).
pub fn live_status() -> &'static CommandSet {
    &LIVE_STATUS
}

// ── EIP cache family ─────────────────────────────────────────────
//
// Consumed by the portal sub-API under /portalapi/v1/<resolved>; plain
// slashes, encoded normally by the HTTP client.

const EIP_CACHE_ENTRIES: &[(&str, &str)] = &[
    ("eip-cache-brief", "eip/cache/{org}/brief"),
    ("eip-cache-detail", "eip/cache/{org}/detail"),
    ("eip-cache-stale", "eip/cache/{org}/stale"),
    ("eip-agent-summary", "eip/agents/{org}/summary"),
    ("eip-profile-list", "eip/profiles"),
    ("eip-object-list", "eip/objects"),
];

static EIP_CACHE: CommandSet = CommandSet {
    name: "eip-cache",
    entries: EIP_CACHE_ENTRIES,
};

/// EIP cache command table (plain-slash segments, portal sub-API).
pub fn eip_cache() -> &'static CommandSet {
    &EIP_CACHE
}
