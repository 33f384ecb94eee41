use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub lifecycle: LifecycleConfig,
    /// Admissible bands for every session-configuration parameter, reported
    /// back to clients as {min, max} on GET.
    pub signal_configuration_parameter: SignalConfigurationParameter,
    /// Session-configuration values assumed before a client PUTs its own.
    pub signal_configuration_default: SignalConfigurationDefault,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the DTLS endpoints bind to
    pub bind_address: String,
    /// Signal channel port (mitigation requests, heartbeats)
    pub signal_channel_port: u16,
    /// Data channel port (identifiers, filtering rules)
    pub data_channel_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Lifetime applied when a mitigation request carries none (seconds)
    pub default_mitigation_lifetime: i64,
    /// Hard cap on requested mitigation lifetimes (seconds)
    pub max_mitigation_lifetime: i64,
}

/// Inclusive band for one integer session parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: i64,
    pub max: i64,
}

impl ParameterRange {
    pub fn contains(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Inclusive band for one real-valued session parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FloatParameterRange {
    pub min: f64,
    pub max: f64,
}

impl FloatParameterRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfigurationParameter {
    pub heartbeat_interval: ParameterRange,
    pub missing_hb_allowed: ParameterRange,
    pub max_retransmit: ParameterRange,
    pub ack_timeout: ParameterRange,
    pub ack_random_factor: FloatParameterRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfigurationDefault {
    pub heartbeat_interval: i64,
    pub missing_hb_allowed: i64,
    pub max_retransmit: i64,
    pub ack_timeout: i64,
    pub ack_random_factor: f64,
    pub trigger_mitigation: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                bind_address: "0.0.0.0".to_string(),
                signal_channel_port: 4646,
                data_channel_port: 4647,
            },
            lifecycle: LifecycleConfig {
                default_mitigation_lifetime: 3600,
                max_mitigation_lifetime: 86_400,
            },
            signal_configuration_parameter: SignalConfigurationParameter {
                heartbeat_interval: ParameterRange { min: 15, max: 240 },
                missing_hb_allowed: ParameterRange { min: 3, max: 9 },
                max_retransmit: ParameterRange { min: 2, max: 15 },
                ack_timeout: ParameterRange { min: 1, max: 30 },
                ack_random_factor: FloatParameterRange { min: 1.0, max: 4.0 },
            },
            signal_configuration_default: SignalConfigurationDefault {
                heartbeat_interval: 30,
                missing_hb_allowed: 5,
                max_retransmit: 3,
                ack_timeout: 2,
                ack_random_factor: 1.5,
                trigger_mitigation: true,
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.signal_channel_port == 0 || self.network.data_channel_port == 0 {
            anyhow::bail!("Invalid port: cannot be 0");
        }
        if self.network.signal_channel_port == self.network.data_channel_port {
            anyhow::bail!("Signal and data channels cannot share a port");
        }
        if self.lifecycle.default_mitigation_lifetime <= 0 {
            anyhow::bail!("default_mitigation_lifetime must be positive");
        }
        if self.lifecycle.max_mitigation_lifetime < self.lifecycle.default_mitigation_lifetime {
            anyhow::bail!("max_mitigation_lifetime below the default lifetime");
        }
        let p = &self.signal_configuration_parameter;
        for (name, range) in [
            ("heartbeat_interval", p.heartbeat_interval),
            ("missing_hb_allowed", p.missing_hb_allowed),
            ("max_retransmit", p.max_retransmit),
            ("ack_timeout", p.ack_timeout),
        ] {
            if range.min > range.max || range.min < 0 {
                anyhow::bail!("Invalid {} range [{}, {}]", name, range.min, range.max);
            }
        }
        if p.ack_random_factor.min < 1.0 || p.ack_random_factor.min > p.ack_random_factor.max {
            anyhow::bail!("ack_random_factor band must start at 1.0 or above");
        }
        Ok(())
    }
}
