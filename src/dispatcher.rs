// Dispatcher: binds transport PDUs to controllers.
//
// The CoAP/DTLS stack is a thin external transport; it hands this module the
// decoded PDU plus the peer certificate's Common Name and sends whatever PDU
// comes back. Per request the dispatcher echoes message-id and token,
// authenticates the peer, decodes the payload through the registry's schema,
// invokes the controller verb and encodes the reply. It keeps no state of
// its own.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::blocker::{blocker_map, Blocker};
use crate::blocker_selection::BlockerSelectionService;
use crate::codec;
use crate::config::ServerConfig;
use crate::controllers::{
    Controller, CreateIdentifiersController, HelloController, InstallFilteringRuleController,
    MessageType, MitigationRequestController, Response, ResponseCode,
    SessionConfigurationController,
};
use crate::customer::Customer;
use crate::errors::{DotsError, Result};
use crate::messages::Code;
use crate::repository::Repository;

/// CoAP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

/// Inbound PDU as delivered by the transport.
#[derive(Debug, Clone)]
pub struct RequestPdu {
    pub message_id: u16,
    pub token: Vec<u8>,
    pub method: Method,
    pub uri_path: String,
    pub payload: Vec<u8>,
}

/// Outbound PDU handed back to the transport. `code` is the raw CoAP code
/// byte (class << 5 | detail).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePdu {
    pub message_id: u16,
    pub token: Vec<u8>,
    pub message_type: MessageType,
    pub code: u8,
    pub payload: Vec<u8>,
}

pub struct Dispatcher {
    repository: Arc<dyn Repository>,
    resources: HashMap<&'static str, (Code, Arc<dyn Controller>)>,
}

impl Dispatcher {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            resources: HashMap::new(),
        }
    }

    /// Mount a controller at the registry path of `code`, answering all four
    /// verbs.
    pub fn add_handler(&mut self, code: Code, controller: Arc<dyn Controller>) {
        self.resources.insert(code.path(), (code, controller));
    }

    /// Dispatcher for the signal channel: hello, mitigation_request,
    /// session_configuration.
    pub fn signal_channel(
        repository: Arc<dyn Repository>,
        blockers: Vec<Arc<dyn Blocker>>,
        config: &ServerConfig,
    ) -> Self {
        let selection = BlockerSelectionService::spawn(blockers.clone());
        let mut dispatcher = Self::new(repository.clone());
        dispatcher.add_handler(Code::Hello, Arc::new(HelloController));
        dispatcher.add_handler(
            Code::MitigationRequest,
            Arc::new(MitigationRequestController::new(
                repository.clone(),
                blocker_map(&blockers),
                selection,
                config.lifecycle.default_mitigation_lifetime,
            )),
        );
        dispatcher.add_handler(
            Code::SessionConfiguration,
            Arc::new(SessionConfigurationController::new(
                repository,
                config.signal_configuration_parameter.clone(),
                config.signal_configuration_default.clone(),
            )),
        );
        dispatcher
    }

    /// Dispatcher for the data channel: hello, create_identifiers,
    /// install_filtering_rule.
    pub fn data_channel(repository: Arc<dyn Repository>) -> Self {
        let mut dispatcher = Self::new(repository);
        dispatcher.add_handler(Code::Hello, Arc::new(HelloController));
        dispatcher.add_handler(Code::CreateIdentifiers, Arc::new(CreateIdentifiersController));
        dispatcher.add_handler(
            Code::InstallFilteringRule,
            Arc::new(InstallFilteringRuleController),
        );
        dispatcher
    }

    /// Resolve the peer to a customer. A session without a Common Name, an
    /// unknown Common Name and a failed lookup all count as unauthenticated.
    async fn authenticate(&self, peer_common_name: Option<&str>) -> Result<Customer> {
        let Some(common_name) = peer_common_name else {
            warn!("peer session carries no Common Name");
            return Err(DotsError::Unauthenticated);
        };
        info!(common_name, "peer authenticated");

        match self.repository.get_customer_by_common_name(common_name).await {
            Ok(Some(customer)) if customer.id != 0 => Ok(customer),
            Ok(_) => {
                warn!(common_name, "customer not found");
                Err(DotsError::Unauthenticated)
            }
            Err(e) => {
                warn!(common_name, error = %e, "customer lookup failed");
                Err(DotsError::Unauthenticated)
            }
        }
    }

    /// Handle one inbound request. The response always carries the request's
    /// message-id and token.
    pub async fn handle(
        &self,
        request: &RequestPdu,
        peer_common_name: Option<&str>,
    ) -> ResponsePdu {
        let mut response = ResponsePdu {
            message_id: request.message_id,
            token: request.token.clone(),
            message_type: MessageType::NonConfirmable,
            code: ResponseCode::NotFound.to_coap(),
            payload: Vec::new(),
        };

        info!(message_id = request.message_id, path = request.uri_path.as_str(),
              "Incoming Request");

        let Some((code, controller)) = self
            .resources
            .get(request.uri_path.trim_start_matches('/'))
        else {
            warn!(path = request.uri_path.as_str(), "no resource at path");
            return response;
        };

        let customer = match self.authenticate(peer_common_name).await {
            Ok(customer) => customer,
            Err(e) => {
                response.code = e.response_code().to_coap();
                return response;
            }
        };

        let decoded = match codec::decode_request(*code, &request.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!(error = %e, "request decode failed");
                response.code = ResponseCode::InternalServerError.to_coap();
                return response;
            }
        };

        let result: Result<Response> = match request.method {
            Method::Get => controller.get(decoded.as_ref(), &customer).await,
            Method::Put => controller.put(decoded.as_ref(), &customer).await,
            Method::Post => controller.post(decoded.as_ref(), &customer).await,
            Method::Delete => controller.delete(decoded.as_ref(), &customer).await,
        };
        let controller_response = match result {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "controller returned error");
                response.code = ResponseCode::InternalServerError.to_coap();
                return response;
            }
        };

        let payload = match codec::encode_body(*code, controller_response.body.as_ref()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "response encode failed");
                response.code = ResponseCode::InternalServerError.to_coap();
                return response;
            }
        };

        response.message_type = controller_response.message_type;
        response.code = controller_response.code.to_coap();
        response.payload = payload;
        response
    }
}
