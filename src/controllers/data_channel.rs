// Data-channel sibling endpoints. Identifier and filtering-rule semantics
// live in a separate service; these controllers share the dispatch model and
// acknowledge well-formed submissions.

use async_trait::async_trait;
use tracing::info;

use crate::codec::Request;
use crate::controllers::{Controller, Response, ResponseCode};
use crate::customer::Customer;
use crate::errors::Result;

pub struct CreateIdentifiersController;

#[async_trait]
impl Controller for CreateIdentifiersController {
    async fn put(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        self.post(request, customer).await
    }

    async fn post(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Opaque(_)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        info!(customer_id = customer.id, "identifiers submission acknowledged");
        Ok(Response::empty(ResponseCode::Created))
    }
}

pub struct InstallFilteringRuleController;

#[async_trait]
impl Controller for InstallFilteringRuleController {
    async fn put(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        self.post(request, customer).await
    }

    async fn post(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Opaque(_)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        info!(customer_id = customer.id, "filtering rule submission acknowledged");
        Ok(Response::empty(ResponseCode::Created))
    }
}
