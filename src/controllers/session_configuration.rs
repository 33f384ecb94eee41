// Controller for the session_configuration endpoint. PUT replaces the
// customer's signaling parameters atomically; GET reports the server's
// admissible band next to the current value for every parameter.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::codec::{Body, Request};
use crate::config::{SignalConfigurationDefault, SignalConfigurationParameter};
use crate::controllers::{Controller, Response, ResponseCode};
use crate::customer::Customer;
use crate::errors::Result;
use crate::messages::{ConfigValue, ConfigurationResponse};
use crate::repository::Repository;
use crate::session_config::SignalSessionConfiguration;
use crate::validators::validate_session_configuration;

pub struct SessionConfigurationController {
    repository: Arc<dyn Repository>,
    parameter: SignalConfigurationParameter,
    defaults: SignalConfigurationDefault,
}

impl SessionConfigurationController {
    pub fn new(
        repository: Arc<dyn Repository>,
        parameter: SignalConfigurationParameter,
        defaults: SignalConfigurationDefault,
    ) -> Self {
        Self {
            repository,
            parameter,
            defaults,
        }
    }

    fn configuration_response(&self, current: &SignalSessionConfiguration) -> ConfigurationResponse {
        let p = &self.parameter;
        ConfigurationResponse {
            heartbeat_interval: ConfigValue {
                min_value: p.heartbeat_interval.min,
                max_value: p.heartbeat_interval.max,
                current_value: current.heartbeat_interval,
            },
            missing_hb_allowed: ConfigValue {
                min_value: p.missing_hb_allowed.min,
                max_value: p.missing_hb_allowed.max,
                current_value: current.missing_hb_allowed,
            },
            max_retransmit: ConfigValue {
                min_value: p.max_retransmit.min,
                max_value: p.max_retransmit.max,
                current_value: current.max_retransmit,
            },
            ack_timeout: ConfigValue {
                min_value: p.ack_timeout.min,
                max_value: p.ack_timeout.max,
                current_value: current.ack_timeout,
            },
            ack_random_factor: ConfigValue {
                min_value: p.ack_random_factor.min,
                max_value: p.ack_random_factor.max,
                current_value: current.ack_random_factor,
            },
            trigger_mitigation: current.trigger_mitigation,
        }
    }
}

#[async_trait]
impl Controller for SessionConfigurationController {
    async fn get(&self, _request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let current = match self
            .repository
            .get_current_signal_session_configuration(customer.id)
            .await
        {
            Ok(Some(config)) => config,
            Ok(None) => SignalSessionConfiguration::from_defaults(&self.defaults),
            Err(e) => {
                error!(customer_id = customer.id, error = %e,
                       "session configuration load failed");
                return Ok(Response::empty(ResponseCode::BadRequest));
            }
        };

        Ok(Response::with_body(
            ResponseCode::Content,
            Body::SessionConfig(self.configuration_response(&current)),
        ))
    }

    async fn put(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::SessionConfig(payload)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        debug!(
            payload = %serde_json::to_string(payload).unwrap_or_default(),
            "[PUT] receive message"
        );

        let config = SignalSessionConfiguration::from_wire(payload);
        if !validate_session_configuration(&config, &self.parameter) {
            return Ok(Response::empty(ResponseCode::BadRequest));
        }

        if let Err(e) = self
            .repository
            .create_signal_session_configuration(&config, customer.id)
            .await
        {
            error!(customer_id = customer.id, error = %e,
                   "session configuration store failed");
            return Ok(Response::empty(ResponseCode::BadRequest));
        }

        info!(
            customer_id = customer.id,
            session_id = config.session_id,
            "session configuration replaced"
        );
        Ok(Response::empty(ResponseCode::Created))
    }

    async fn delete(&self, _request: Option<&Request>, customer: &Customer) -> Result<Response> {
        if let Err(e) = self
            .repository
            .delete_signal_session_configuration_by_customer_id(customer.id)
            .await
        {
            error!(customer_id = customer.id, error = %e,
                   "session configuration delete failed");
            return Ok(Response::empty(ResponseCode::InternalServerError));
        }
        Ok(Response::empty(ResponseCode::Deleted))
    }
}
