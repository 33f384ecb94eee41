// Liveness endpoint: echoes the client's message back.

use async_trait::async_trait;
use tracing::debug;

use crate::codec::{Body, Request};
use crate::controllers::{Controller, Response, ResponseCode};
use crate::customer::Customer;
use crate::errors::Result;
use crate::messages::HelloResponse;

pub struct HelloController;

impl HelloController {
    fn echo(request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Hello(hello)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        debug!(
            customer_id = customer.id,
            message = hello.message.as_str(),
            "hello received"
        );
        Ok(Response::with_body(
            ResponseCode::Content,
            Body::Hello(HelloResponse {
                message: hello.message.clone(),
            }),
        ))
    }
}

#[async_trait]
impl Controller for HelloController {
    async fn get(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        Self::echo(request, customer)
    }

    async fn put(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        Self::echo(request, customer)
    }

    async fn post(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        Self::echo(request, customer)
    }

    async fn delete(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        Self::echo(request, customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::tests::test_policy;
    use crate::messages::HelloRequest;

    fn test_customer() -> Customer {
        Customer {
            id: 1,
            name: "test-customer".to_string(),
            common_name: "client.example".to_string(),
            policy: test_policy(),
        }
    }

    #[tokio::test]
    async fn test_hello_echoes_message() {
        let controller = HelloController;
        let request = Request::Hello(HelloRequest {
            message: "ping".to_string(),
        });

        let response = controller
            .post(Some(&request), &test_customer())
            .await
            .unwrap();
        assert_eq!(response.code, ResponseCode::Content);
        assert_eq!(
            response.body,
            Some(Body::Hello(HelloResponse {
                message: "ping".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_hello_without_payload_is_bad_request() {
        let controller = HelloController;
        let response = controller.get(None, &test_customer()).await.unwrap();
        assert_eq!(response.code, ResponseCode::BadRequest);
    }
}
