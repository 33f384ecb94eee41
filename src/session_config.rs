// Per-customer signal-channel session configuration. These values gate the
// heartbeat and retransmission behavior negotiated with each client; at most
// one configuration is current per customer.

use serde::{Deserialize, Serialize};

use crate::config::SignalConfigurationDefault;
use crate::messages::SignalConfigRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSessionConfiguration {
    /// Client-assigned identifier for this configuration
    pub session_id: i64,
    pub heartbeat_interval: i64,
    pub missing_hb_allowed: i64,
    pub max_retransmit: i64,
    pub ack_timeout: i64,
    pub ack_random_factor: f64,
    /// If false, mitigation starts only when the signal channel is lost.
    pub trigger_mitigation: bool,
}

impl SignalSessionConfiguration {
    pub fn from_wire(request: &SignalConfigRequest) -> Self {
        Self {
            session_id: request.session_id,
            heartbeat_interval: request.heartbeat_interval,
            missing_hb_allowed: request.missing_hb_allowed,
            max_retransmit: request.max_retransmit,
            ack_timeout: request.ack_timeout,
            ack_random_factor: request.ack_random_factor,
            trigger_mitigation: request.trigger_mitigation,
        }
    }

    /// Configuration assumed for a customer that never PUT one.
    pub fn from_defaults(defaults: &SignalConfigurationDefault) -> Self {
        Self {
            session_id: 0,
            heartbeat_interval: defaults.heartbeat_interval,
            missing_hb_allowed: defaults.missing_hb_allowed,
            max_retransmit: defaults.max_retransmit,
            ack_timeout: defaults.ack_timeout,
            ack_random_factor: defaults.ack_random_factor,
            trigger_mitigation: defaults.trigger_mitigation,
        }
    }
}
