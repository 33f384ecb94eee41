// Error taxonomy for the DOTS server core.
//
// Every fallible path in the crate funnels into `DotsError`. Controllers
// translate the protocol-visible kinds into CoAP response codes; everything
// else surfaces as 5.00 at the dispatcher.

use thiserror::Error;

use crate::controllers::ResponseCode;

#[derive(Debug, Error)]
pub enum DotsError {
    /// The payload decoded but its contents are not a usable request
    /// (bad CIDR, inverted port range, out-of-range protocol number).
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The transport session carried no usable peer identity.
    #[error("peer is not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    /// The entity exists but is not in a state the operation requires.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The request is well-formed but the customer's policy rejects it.
    #[error("rejected by policy")]
    ValidationRejected,

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("blocker failure: {0}")]
    Blocker(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DotsError {
    /// CoAP response code this error maps to when a controller chooses to
    /// answer instead of propagating.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            DotsError::MalformedRequest(_) => ResponseCode::BadRequest,
            DotsError::Unauthenticated => ResponseCode::Forbidden,
            DotsError::NotFound(_) => ResponseCode::NotFound,
            DotsError::PreconditionFailed(_) => ResponseCode::PreconditionFailed,
            DotsError::ValidationRejected => ResponseCode::BadRequest,
            DotsError::Blocker(_) | DotsError::Storage(_) | DotsError::Internal(_) => {
                ResponseCode::InternalServerError
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DotsError>;
