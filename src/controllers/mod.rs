// Controllers implement the verb semantics behind each endpoint. The
// dispatcher hands them the decoded request (or None for an empty payload)
// and the authenticated customer; they answer with a typed Response or an
// error the dispatcher flattens to 5.00.

use async_trait::async_trait;
use std::fmt;

use crate::codec::{Body, Request};
use crate::customer::Customer;
use crate::errors::{DotsError, Result};

pub mod data_channel;
pub mod hello;
pub mod mitigation_request;
pub mod session_configuration;

pub use data_channel::{CreateIdentifiersController, InstallFilteringRuleController};
pub use hello::HelloController;
pub use mitigation_request::MitigationRequestController;
pub use session_configuration::SessionConfigurationController;

// =============================================================================
// RESPONSE
// =============================================================================

/// CoAP message type; the core always answers NonConfirmable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
}

/// CoAP-shaped response codes (3-bit class, 5-bit detail).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    Forbidden,
    NotFound,
    PreconditionFailed,
    InternalServerError,
}

impl ResponseCode {
    /// Raw CoAP code byte: class << 5 | detail.
    pub fn to_coap(self) -> u8 {
        let (class, detail) = self.class_detail();
        (class << 5) | detail
    }

    fn class_detail(self) -> (u8, u8) {
        match self {
            ResponseCode::Created => (2, 1),
            ResponseCode::Deleted => (2, 2),
            ResponseCode::Changed => (2, 4),
            ResponseCode::Content => (2, 5),
            ResponseCode::BadRequest => (4, 0),
            ResponseCode::Forbidden => (4, 3),
            ResponseCode::NotFound => (4, 4),
            ResponseCode::PreconditionFailed => (4, 12),
            ResponseCode::InternalServerError => (5, 0),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.class_detail();
        write!(f, "{class}.{detail:02}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message_type: MessageType,
    pub code: ResponseCode,
    pub body: Option<Body>,
}

impl Response {
    pub fn empty(code: ResponseCode) -> Self {
        Self {
            message_type: MessageType::NonConfirmable,
            code,
            body: None,
        }
    }

    pub fn with_body(code: ResponseCode, body: Body) -> Self {
        Self {
            message_type: MessageType::NonConfirmable,
            code,
            body: Some(body),
        }
    }
}

/// Turn a protocol-visible error into its response. Blocker, storage and
/// internal failures propagate instead, so the dispatcher reports them as
/// 5.00.
pub(crate) fn protocol_reply(err: DotsError) -> Result<Response> {
    match err {
        DotsError::Blocker(_) | DotsError::Storage(_) | DotsError::Internal(_) => Err(err),
        other => Ok(Response::empty(other.response_code())),
    }
}

// =============================================================================
// CONTROLLER TRAIT
// =============================================================================

/// Verb handlers for one endpoint. The default answer for an unimplemented
/// verb is 4.00.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn get(&self, _request: Option<&Request>, _customer: &Customer) -> Result<Response> {
        Ok(Response::empty(ResponseCode::BadRequest))
    }

    async fn put(&self, _request: Option<&Request>, _customer: &Customer) -> Result<Response> {
        Ok(Response::empty(ResponseCode::BadRequest))
    }

    async fn post(&self, _request: Option<&Request>, _customer: &Customer) -> Result<Response> {
        Ok(Response::empty(ResponseCode::BadRequest))
    }

    async fn delete(&self, _request: Option<&Request>, _customer: &Customer) -> Result<Response> {
        Ok(Response::empty(ResponseCode::BadRequest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coap_code_bytes() {
        assert_eq!(ResponseCode::Created.to_coap(), 0x41);
        assert_eq!(ResponseCode::Deleted.to_coap(), 0x42);
        assert_eq!(ResponseCode::Changed.to_coap(), 0x44);
        assert_eq!(ResponseCode::Content.to_coap(), 0x45);
        assert_eq!(ResponseCode::BadRequest.to_coap(), 0x80);
        assert_eq!(ResponseCode::Forbidden.to_coap(), 0x83);
        assert_eq!(ResponseCode::NotFound.to_coap(), 0x84);
        assert_eq!(ResponseCode::PreconditionFailed.to_coap(), 0x8c);
        assert_eq!(ResponseCode::InternalServerError.to_coap(), 0xa0);
    }

    #[test]
    fn test_code_display_is_dotted() {
        assert_eq!(ResponseCode::Created.to_string(), "2.01");
        assert_eq!(ResponseCode::PreconditionFailed.to_string(), "4.12");
        assert_eq!(ResponseCode::InternalServerError.to_string(), "5.00");
    }

    #[test]
    fn test_protocol_reply_hides_storage_errors() {
        let reply = protocol_reply(DotsError::NotFound("mitigation 1".into())).unwrap();
        assert_eq!(reply.code, ResponseCode::NotFound);

        assert!(protocol_reply(DotsError::Internal("oops".into())).is_err());
    }
}
