// Wire messages and the protocol-code registry.
//
// Field names follow the DOTS CBOR vocabulary verbatim (kebab-case, plus the
// historical upper-case FQDN/URI keys), so every struct carries explicit
// serde renames. The registry is the single place a new endpoint is added:
// it binds a protocol code to the URI path it is mounted under and to the
// request schema the codec constructs for it.

use serde::{Deserialize, Serialize};

// =============================================================================
// REGISTRY
// =============================================================================

/// Closed set of protocol codes the server dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Hello,
    MitigationRequest,
    SessionConfiguration,
    CreateIdentifiers,
    InstallFilteringRule,
}

/// Request payload schema the codec instantiates for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSchema {
    Hello,
    Mitigation,
    SignalConfig,
    /// Data-channel payloads are decoded generically; their semantics live
    /// in a sibling service.
    Opaque,
}

/// Response payload variant an endpoint answers with when it has a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    Hello,
    MitigationStatus,
    Configuration,
    /// Acknowledgement-only endpoints never attach a body.
    None,
}

/// One registry row: protocol code, URI path suffix, request and response
/// schemas.
#[derive(Debug, Clone, Copy)]
pub struct MessageEntry {
    pub code: Code,
    pub path: &'static str,
    pub schema: RequestSchema,
    pub response: ResponseSchema,
}

pub const MESSAGE_TYPES: &[MessageEntry] = &[
    MessageEntry {
        code: Code::Hello,
        path: "hello",
        schema: RequestSchema::Hello,
        response: ResponseSchema::Hello,
    },
    MessageEntry {
        code: Code::MitigationRequest,
        path: "mitigation_request",
        schema: RequestSchema::Mitigation,
        response: ResponseSchema::MitigationStatus,
    },
    MessageEntry {
        code: Code::SessionConfiguration,
        path: "session_configuration",
        schema: RequestSchema::SignalConfig,
        response: ResponseSchema::Configuration,
    },
    MessageEntry {
        code: Code::CreateIdentifiers,
        path: "create_identifiers",
        schema: RequestSchema::Opaque,
        response: ResponseSchema::None,
    },
    MessageEntry {
        code: Code::InstallFilteringRule,
        path: "install_filtering_rule",
        schema: RequestSchema::Opaque,
        response: ResponseSchema::None,
    },
];

impl Code {
    pub fn entry(self) -> &'static MessageEntry {
        // Indexed by declaration order; the registry test pins the mapping.
        let idx = match self {
            Code::Hello => 0,
            Code::MitigationRequest => 1,
            Code::SessionConfiguration => 2,
            Code::CreateIdentifiers => 3,
            Code::InstallFilteringRule => 4,
        };
        &MESSAGE_TYPES[idx]
    }

    pub fn path(self) -> &'static str {
        self.entry().path
    }
}

/// Resolve a URI path suffix back to its registry entry.
pub fn entry_by_path(path: &str) -> Option<&'static MessageEntry> {
    let path = path.trim_start_matches('/');
    MESSAGE_TYPES.iter().find(|e| e.path == path)
}

// =============================================================================
// SIGNAL CHANNEL: MITIGATION
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MitigationRequest {
    #[serde(rename = "mitigation-scope", default)]
    pub mitigation_scope: MitigationScopePayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MitigationScopePayload {
    #[serde(rename = "scope", default)]
    pub scopes: Vec<Scope>,
    /// Optional sub-key for customers running several operational clients.
    #[serde(rename = "client-identifier", default, skip_serializing_if = "Option::is_none")]
    pub client_identifier: Option<String>,
}

impl MitigationRequest {
    /// Client identifier carried in the request, or the authenticated peer's
    /// Common Name when absent.
    pub fn effective_client_identifier(&self, peer_common_name: &str) -> String {
        match &self.mitigation_scope.client_identifier {
            Some(id) if !id.is_empty() => id.clone(),
            _ => peer_common_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scope {
    #[serde(rename = "mitigation-id", default)]
    pub mitigation_id: i64,
    /// Individual addresses; carried on the wire, not part of the model's
    /// target set.
    #[serde(rename = "target-ip", default)]
    pub target_ip: Vec<String>,
    #[serde(rename = "target-prefix", default)]
    pub target_prefix: Vec<String>,
    #[serde(rename = "target-port-range", default)]
    pub target_port_range: Vec<TargetPortRange>,
    #[serde(rename = "target-protocol", default)]
    pub target_protocol: Vec<i32>,
    #[serde(rename = "FQDN", default)]
    pub fqdn: Vec<String>,
    #[serde(rename = "URI", default)]
    pub uri: Vec<String>,
    #[serde(rename = "alias-name", default)]
    pub alias_name: Vec<String>,
    #[serde(rename = "lifetime", default)]
    pub lifetime: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetPortRange {
    #[serde(rename = "lower-port", default)]
    pub lower_port: i32,
    #[serde(rename = "upper-port", default)]
    pub upper_port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MitigationResponse {
    #[serde(rename = "mitigation-scope")]
    pub mitigation_scope: MitigationScopeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MitigationScopeStatus {
    #[serde(rename = "scope")]
    pub scopes: Vec<ScopeStatus>,
}

/// Per-mitigation status row returned on GET. The status and counter fields
/// are fixed interop placeholders until telemetry lands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeStatus {
    #[serde(rename = "mitigation-id")]
    pub mitigation_id: i64,
    /// UNIX seconds of the protection start, 0 when nothing is running.
    #[serde(rename = "mitigation-start")]
    pub mitigation_start: f64,
    #[serde(rename = "lifetime")]
    pub lifetime: i64,
    #[serde(rename = "status")]
    pub status: i32,
    #[serde(rename = "bytes-dropped")]
    pub bytes_dropped: i64,
    #[serde(rename = "bps-dropped")]
    pub bps_dropped: i64,
    #[serde(rename = "pkts-dropped")]
    pub pkts_dropped: i64,
    #[serde(rename = "pps-dropped")]
    pub pps_dropped: i64,
    #[serde(rename = "target-protocol")]
    pub target_protocol: Vec<i32>,
}

// =============================================================================
// SIGNAL CHANNEL: SESSION CONFIGURATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalConfigRequest {
    #[serde(rename = "session-id", default)]
    pub session_id: i64,
    #[serde(rename = "heartbeat-interval", default)]
    pub heartbeat_interval: i64,
    #[serde(rename = "missing-hb-allowed", default)]
    pub missing_hb_allowed: i64,
    #[serde(rename = "max-retransmit", default)]
    pub max_retransmit: i64,
    #[serde(rename = "ack-timeout", default)]
    pub ack_timeout: i64,
    #[serde(rename = "ack-random-factor", default)]
    pub ack_random_factor: f64,
    #[serde(rename = "trigger-mitigation", default)]
    pub trigger_mitigation: bool,
}

/// {min, max, current} triple for one negotiated parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    #[serde(rename = "min-value")]
    pub min_value: T,
    #[serde(rename = "max-value")]
    pub max_value: T,
    #[serde(rename = "current-value")]
    pub current_value: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationResponse {
    #[serde(rename = "heartbeat-interval")]
    pub heartbeat_interval: ConfigValue<i64>,
    #[serde(rename = "missing-hb-allowed")]
    pub missing_hb_allowed: ConfigValue<i64>,
    #[serde(rename = "max-retransmit")]
    pub max_retransmit: ConfigValue<i64>,
    #[serde(rename = "ack-timeout")]
    pub ack_timeout: ConfigValue<i64>,
    #[serde(rename = "ack-random-factor")]
    pub ack_random_factor: ConfigValue<f64>,
    #[serde(rename = "trigger-mitigation")]
    pub trigger_mitigation: bool,
}

// =============================================================================
// HELLO
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HelloRequest {
    #[serde(rename = "message", default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloResponse {
    #[serde(rename = "message")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_paths() {
        assert_eq!(Code::MitigationRequest.path(), "mitigation_request");
        assert_eq!(Code::SessionConfiguration.path(), "session_configuration");
        assert_eq!(
            entry_by_path("/mitigation_request").map(|e| e.code),
            Some(Code::MitigationRequest)
        );
        assert_eq!(
            entry_by_path("hello").map(|e| e.schema),
            Some(RequestSchema::Hello)
        );
        assert!(entry_by_path("no_such_endpoint").is_none());
    }

    #[test]
    fn test_registry_is_closed_and_unambiguous() {
        for entry in MESSAGE_TYPES {
            assert_eq!(entry.code.entry().code, entry.code);
            assert_eq!(entry.code.entry().path, entry.path);
        }
        let mut paths: Vec<_> = MESSAGE_TYPES.iter().map(|e| e.path).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), MESSAGE_TYPES.len());
    }

    #[test]
    fn test_effective_client_identifier_falls_back_to_peer() {
        let mut req = MitigationRequest::default();
        assert_eq!(req.effective_client_identifier("client.example"), "client.example");

        req.mitigation_scope.client_identifier = Some("ops-team-2".to_string());
        assert_eq!(req.effective_client_identifier("client.example"), "ops-team-2");
    }
}
