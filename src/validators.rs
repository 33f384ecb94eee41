// Admissibility checks. Both validators are pure functions returning only a
// boolean; callers translate rejection into the protocol error code. Every
// rejection is logged with the offending field so operators can tell a policy
// mismatch from a client bug.

use tracing::warn;

use crate::config::SignalConfigurationParameter;
use crate::customer::Customer;
use crate::mitigation_scope::MitigationScope;
use crate::session_config::SignalSessionConfiguration;

/// Check a mitigation scope against its customer's policy.
pub fn validate_mitigation_scope(scope: &MitigationScope, customer: &Customer) -> bool {
    if scope.mitigation_id <= 0 {
        warn!(
            mitigation_id = scope.mitigation_id,
            "mitigation id must be positive"
        );
        return false;
    }

    if !scope.has_target() {
        warn!(
            mitigation_id = scope.mitigation_id,
            "scope carries no target field"
        );
        return false;
    }

    let policy = &customer.policy;

    for prefix in &scope.target_prefix {
        if !policy.allows_prefix(prefix) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                prefix = %prefix,
                "target prefix outside customer's address ranges"
            );
            return false;
        }
    }

    for range in &scope.target_port_range {
        if !policy.allows_port_range(range) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                lower = range.lower,
                upper = range.upper,
                "target port range outside customer's allowed ports"
            );
            return false;
        }
    }

    for &protocol in &scope.target_protocol {
        if !policy.allows_protocol(protocol) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                protocol,
                "target protocol not allowed for customer"
            );
            return false;
        }
    }

    for fqdn in &scope.fqdn {
        if !policy.allows_fqdn(fqdn) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                fqdn = fqdn.as_str(),
                "FQDN outside customer's permitted domains"
            );
            return false;
        }
    }

    for uri in &scope.uri {
        if !policy.allows_uri(uri) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                uri = uri.as_str(),
                "URI outside customer's permitted patterns"
            );
            return false;
        }
    }

    for alias in &scope.alias_name {
        if !policy.allows_alias(alias) {
            warn!(
                mitigation_id = scope.mitigation_id,
                customer_id = customer.id,
                alias = alias.as_str(),
                "alias not registered for customer"
            );
            return false;
        }
    }

    if scope.lifetime <= 0 || scope.lifetime > policy.max_mitigation_lifetime {
        warn!(
            mitigation_id = scope.mitigation_id,
            lifetime = scope.lifetime,
            max = policy.max_mitigation_lifetime,
            "lifetime outside policy"
        );
        return false;
    }

    true
}

/// Check a session configuration against the server's parameter bands.
pub fn validate_session_configuration(
    config: &SignalSessionConfiguration,
    parameter: &SignalConfigurationParameter,
) -> bool {
    if config.session_id <= 0 {
        warn!(session_id = config.session_id, "session id must be positive");
        return false;
    }

    let checks = [
        (
            "heartbeat-interval",
            config.heartbeat_interval,
            parameter.heartbeat_interval,
        ),
        (
            "missing-hb-allowed",
            config.missing_hb_allowed,
            parameter.missing_hb_allowed,
        ),
        (
            "max-retransmit",
            config.max_retransmit,
            parameter.max_retransmit,
        ),
        ("ack-timeout", config.ack_timeout, parameter.ack_timeout),
    ];
    for (name, value, range) in checks {
        if !range.contains(value) {
            warn!(
                parameter = name,
                value,
                min = range.min,
                max = range.max,
                "session parameter outside server band"
            );
            return false;
        }
    }

    if !parameter.ack_random_factor.contains(config.ack_random_factor) {
        warn!(
            parameter = "ack-random-factor",
            value = config.ack_random_factor,
            min = parameter.ack_random_factor.min,
            max = parameter.ack_random_factor.max,
            "session parameter outside server band"
        );
        return false;
    }

    true
}
