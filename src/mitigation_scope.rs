// Mitigation scope model: the declarative description of traffic a customer
// wants acted on. Built from the wire representation, normalized, then run
// through the policy validator before anything touches a blocker.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::warn;

use crate::errors::{DotsError, Result};
use crate::messages;

// =============================================================================
// PREFIX
// =============================================================================

/// CIDR prefix (IPv4 or IPv6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Prefix {
    /// Parse "addr/len" CIDR notation.
    pub fn parse(cidr: &str) -> Result<Self> {
        let (addr_part, len_part) = cidr
            .split_once('/')
            .ok_or_else(|| DotsError::MalformedRequest(format!("not a CIDR prefix: {cidr}")))?;
        let addr = IpAddr::from_str(addr_part)
            .map_err(|_| DotsError::MalformedRequest(format!("invalid address: {addr_part}")))?;
        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| DotsError::MalformedRequest(format!("invalid prefix length: {len_part}")))?;

        let max_len = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max_len {
            return Err(DotsError::MalformedRequest(format!(
                "prefix length {prefix_len} exceeds {max_len} for {addr_part}"
            )));
        }
        Ok(Self { addr, prefix_len })
    }

    /// Whether `other` is entirely contained in this prefix.
    pub fn contains(&self, other: &Prefix) -> bool {
        if other.prefix_len < self.prefix_len {
            return false;
        }
        match (self.addr, other.addr) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u32 << (32 - self.prefix_len)
                };
                (u32::from(addr) & mask) == (u32::from(net) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u128 << (128 - self.prefix_len)
                };
                (u128::from(addr) & mask) == (u128::from(net) & mask)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

// =============================================================================
// PORT RANGE
// =============================================================================

/// Inclusive port range. `upper == 0` on the wire means a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub lower: u16,
    pub upper: u16,
}

impl PortRange {
    pub fn new(lower: u16, upper: u16) -> Self {
        Self { lower, upper }
    }

    /// Build from wire values, normalizing `upper == 0` to `upper = lower`.
    pub fn from_wire(range: &messages::TargetPortRange) -> Result<Self> {
        let (lower, upper) = (range.lower_port, range.upper_port);
        if !(0..=0xffff).contains(&lower) || !(0..=0xffff).contains(&upper) {
            return Err(DotsError::MalformedRequest(format!(
                "invalid port number. lower:{lower}, upper:{upper}"
            )));
        }
        if upper == 0 {
            Ok(Self::new(lower as u16, lower as u16))
        } else if lower <= upper {
            Ok(Self::new(lower as u16, upper as u16))
        } else {
            Err(DotsError::MalformedRequest(format!(
                "invalid port number. lower:{lower}, upper:{upper}"
            )))
        }
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &PortRange) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }
}

// =============================================================================
// MITIGATION SCOPE
// =============================================================================

/// Validated, normalized mitigation scope bound to a (customer, client) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationScope {
    pub mitigation_id: i64,
    pub customer_id: i64,
    pub client_identifier: String,
    pub target_prefix: Vec<Prefix>,
    pub target_port_range: Vec<PortRange>,
    pub target_protocol: BTreeSet<u8>,
    pub fqdn: BTreeSet<String>,
    pub uri: BTreeSet<String>,
    pub alias_name: BTreeSet<String>,
    /// Seconds the mitigation stays active; always positive once built.
    pub lifetime: i64,
}

impl MitigationScope {
    /// Build the model scope from its wire form. A non-positive lifetime is
    /// coerced to the server default; the wire contract would rather see a
    /// 4.00 for an explicit zero, but deployed clients send it.
    pub fn from_wire(
        scope: &messages::Scope,
        customer_id: i64,
        client_identifier: &str,
        default_lifetime: i64,
    ) -> Result<Self> {
        let target_prefix = scope
            .target_prefix
            .iter()
            .map(|cidr| Prefix::parse(cidr))
            .collect::<Result<Vec<_>>>()?;

        let target_port_range = scope
            .target_port_range
            .iter()
            .map(PortRange::from_wire)
            .collect::<Result<Vec<_>>>()?;

        let mut target_protocol = BTreeSet::new();
        for &proto in &scope.target_protocol {
            let proto = u8::try_from(proto).map_err(|_| {
                DotsError::MalformedRequest(format!("invalid protocol number: {proto}"))
            })?;
            target_protocol.insert(proto);
        }

        let lifetime = if scope.lifetime <= 0 {
            warn!(
                mitigation_id = scope.mitigation_id,
                requested = scope.lifetime,
                coerced = default_lifetime,
                "non-positive lifetime coerced to server default"
            );
            default_lifetime
        } else {
            scope.lifetime
        };

        Ok(Self {
            mitigation_id: scope.mitigation_id,
            customer_id,
            client_identifier: client_identifier.to_string(),
            target_prefix,
            target_port_range,
            target_protocol,
            fqdn: scope.fqdn.iter().cloned().collect(),
            uri: scope.uri.iter().cloned().collect(),
            alias_name: scope.alias_name.iter().cloned().collect(),
            lifetime,
        })
    }

    /// At least one target field must be populated for the scope to mean
    /// anything.
    pub fn has_target(&self) -> bool {
        !self.target_prefix.is_empty()
            || !self.target_port_range.is_empty()
            || !self.target_protocol.is_empty()
            || !self.fqdn.is_empty()
            || !self.uri.is_empty()
            || !self.alias_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Scope, TargetPortRange};

    fn wire_scope() -> Scope {
        Scope {
            mitigation_id: 12345,
            target_prefix: vec!["192.0.2.0/24".to_string()],
            target_port_range: vec![TargetPortRange {
                lower_port: 443,
                upper_port: 0,
            }],
            target_protocol: vec![6],
            lifetime: 3600,
            ..Default::default()
        }
    }

    #[test]
    fn test_prefix_parse_and_contains() {
        let net = Prefix::parse("192.0.2.0/24").unwrap();
        assert!(net.contains(&Prefix::parse("192.0.2.128/25").unwrap()));
        assert!(net.contains(&Prefix::parse("192.0.2.7/32").unwrap()));
        assert!(!net.contains(&Prefix::parse("192.0.3.0/24").unwrap()));
        // A narrower prefix never contains a wider one
        assert!(!net.contains(&Prefix::parse("192.0.0.0/16").unwrap()));
    }

    #[test]
    fn test_prefix_parse_v6() {
        let net = Prefix::parse("2001:db8::/32").unwrap();
        assert!(net.contains(&Prefix::parse("2001:db8:1::/48").unwrap()));
        assert!(!net.contains(&Prefix::parse("2001:db9::/48").unwrap()));
        // Families never mix
        assert!(!net.contains(&Prefix::parse("192.0.2.0/24").unwrap()));
    }

    #[test]
    fn test_prefix_parse_rejects_garbage() {
        assert!(Prefix::parse("192.0.2.0").is_err());
        assert!(Prefix::parse("not-an-ip/24").is_err());
        assert!(Prefix::parse("192.0.2.0/33").is_err());
        assert!(Prefix::parse("2001:db8::/129").is_err());
    }

    #[test]
    fn test_port_range_zero_upper_normalized() {
        let range = PortRange::from_wire(&TargetPortRange {
            lower_port: 443,
            upper_port: 0,
        })
        .unwrap();
        assert_eq!(range, PortRange::new(443, 443));
    }

    #[test]
    fn test_port_range_inverted_rejected() {
        let result = PortRange::from_wire(&TargetPortRange {
            lower_port: 8080,
            upper_port: 80,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_port_range_out_of_bounds_rejected() {
        assert!(PortRange::from_wire(&TargetPortRange {
            lower_port: -1,
            upper_port: 80,
        })
        .is_err());
        assert!(PortRange::from_wire(&TargetPortRange {
            lower_port: 80,
            upper_port: 70000,
        })
        .is_err());
    }

    #[test]
    fn test_from_wire_builds_normalized_scope() {
        let scope = MitigationScope::from_wire(&wire_scope(), 1, "client.example", 1800).unwrap();
        assert_eq!(scope.mitigation_id, 12345);
        assert_eq!(scope.target_port_range, vec![PortRange::new(443, 443)]);
        assert!(scope.target_protocol.contains(&6));
        assert_eq!(scope.lifetime, 3600);
        assert!(scope.has_target());
    }

    #[test]
    fn test_from_wire_coerces_lifetime() {
        let mut wire = wire_scope();
        wire.lifetime = 0;
        let scope = MitigationScope::from_wire(&wire, 1, "client.example", 1800).unwrap();
        assert_eq!(scope.lifetime, 1800);

        wire.lifetime = -5;
        let scope = MitigationScope::from_wire(&wire, 1, "client.example", 1800).unwrap();
        assert_eq!(scope.lifetime, 1800);
    }

    #[test]
    fn test_empty_scope_has_no_target() {
        let scope =
            MitigationScope::from_wire(&Scope::default(), 1, "client.example", 1800).unwrap();
        assert!(!scope.has_target());
    }
}
