// Customer tenancy model. A customer is identified at the transport layer by
// the Common Name in its peer certificate and carries the admission policy
// every mitigation scope is checked against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::mitigation_scope::{PortRange, Prefix};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    /// Common Name of the peer certificate this customer authenticates with.
    pub common_name: String,
    pub policy: CustomerPolicy,
}

/// Per-customer admission policy. Scopes must stay inside these bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPolicy {
    /// Address space the customer may ask to have acted on
    pub allowed_prefixes: Vec<Prefix>,
    /// Port ranges the customer may target
    pub allowed_port_ranges: Vec<PortRange>,
    /// IP protocol numbers the customer may target
    pub allowed_protocols: BTreeSet<u8>,
    /// Domains (and their subdomains) the customer may name
    pub allowed_fqdn_patterns: Vec<String>,
    /// URI prefixes the customer may name
    pub allowed_uri_patterns: Vec<String>,
    /// Aliases registered for this customer over the data channel
    pub allowed_aliases: BTreeSet<String>,
    /// Cap on concurrently held mitigation ids per client identifier
    pub max_concurrent_mitigations: u32,
    /// Longest lifetime the customer may request (seconds)
    pub max_mitigation_lifetime: i64,
}

impl CustomerPolicy {
    pub fn allows_prefix(&self, prefix: &Prefix) -> bool {
        self.allowed_prefixes.iter().any(|p| p.contains(prefix))
    }

    pub fn allows_port_range(&self, range: &PortRange) -> bool {
        self.allowed_port_ranges.iter().any(|r| r.covers(range))
    }

    pub fn allows_protocol(&self, protocol: u8) -> bool {
        self.allowed_protocols.contains(&protocol)
    }

    /// FQDN matches when equal to a pattern or a subdomain of one.
    pub fn allows_fqdn(&self, fqdn: &str) -> bool {
        self.allowed_fqdn_patterns.iter().any(|pattern| {
            fqdn == pattern
                || fqdn
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|head| head.ends_with('.'))
        })
    }

    /// URI matches on an allowed prefix.
    pub fn allows_uri(&self, uri: &str) -> bool {
        self.allowed_uri_patterns
            .iter()
            .any(|pattern| uri.starts_with(pattern.as_str()))
    }

    pub fn allows_alias(&self, alias: &str) -> bool {
        self.allowed_aliases.contains(alias)
    }
}
