// Shared fixtures for the end-to-end tests: a provisioned customer, an
// instrumented blocker driver and PDU builders.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dots_server::blocker::Blocker;
use dots_server::customer::{Customer, CustomerPolicy};
use dots_server::dispatcher::{Method, RequestPdu};
use dots_server::errors::{DotsError, Result};
use dots_server::mitigation_scope::{MitigationScope, PortRange, Prefix};
use dots_server::protection::Protection;
use dots_server::repository::{Repository, SqliteRepository};

pub const TEST_COMMON_NAME: &str = "client.example";

pub fn test_customer() -> Customer {
    Customer {
        id: 1,
        name: "test-customer".to_string(),
        common_name: TEST_COMMON_NAME.to_string(),
        policy: CustomerPolicy {
            allowed_prefixes: vec![Prefix::parse("192.0.2.0/24").unwrap()],
            allowed_port_ranges: vec![PortRange::new(0, 65535)],
            allowed_protocols: [6u8, 17].into_iter().collect(),
            allowed_fqdn_patterns: vec!["example.com".to_string()],
            allowed_uri_patterns: vec!["https://example.com/".to_string()],
            allowed_aliases: ["web-servers".to_string()].into_iter().collect(),
            max_concurrent_mitigations: 16,
            max_mitigation_lifetime: 86_400,
        },
    }
}

pub async fn repo_with_customer() -> Arc<SqliteRepository> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
    repo.register_customer(&test_customer()).await.unwrap();
    repo
}

/// Blocker driver that persists protections like a real one and counts
/// every capability call; `fail_execute` and `fail_stop` make the matching
/// capability refuse.
pub struct CountingBlocker {
    id: i64,
    capacity: u32,
    repository: Arc<dyn Repository>,
    pub fail_execute: AtomicBool,
    pub fail_stop: AtomicBool,
    pub execute_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub unregister_calls: AtomicUsize,
}

impl CountingBlocker {
    pub fn new(id: i64, capacity: u32, repository: Arc<dyn Repository>) -> Arc<Self> {
        Arc::new(Self {
            id,
            capacity,
            repository,
            fail_execute: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            execute_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Blocker for CountingBlocker {
    fn id(&self) -> i64 {
        self.id
    }

    fn driver_type(&self) -> &str {
        "counting"
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn can_enforce(&self, _scope: &MitigationScope) -> bool {
        true
    }

    async fn register_protection(&self, scope: &MitigationScope) -> Result<Protection> {
        let mut protection = Protection::new(
            scope.customer_id,
            &scope.client_identifier,
            scope.mitigation_id,
            self.id,
        );
        protection.id = self.repository.create_protection(&protection).await?;
        Ok(protection)
    }

    async fn execute_protection(&self, protection: &mut Protection) -> Result<()> {
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(DotsError::Blocker("execute refused".to_string()));
        }
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        protection.start();
        self.repository.update_protection(protection).await
    }

    async fn stop_protection(&self, protection: &mut Protection) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(DotsError::Blocker("stop refused".to_string()));
        }
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        protection.finish();
        self.repository.update_protection(protection).await
    }

    async fn unregister_protection(&self, protection: &Protection) -> Result<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.repository.delete_protection(protection.id).await
    }
}

pub fn cbor<T: Serialize>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).unwrap();
    buf
}

pub fn pdu(method: Method, path: &str, payload: Vec<u8>) -> RequestPdu {
    RequestPdu {
        message_id: 0x1234,
        token: vec![0xde, 0xad, 0xbe, 0xef],
        method,
        uri_path: path.to_string(),
        payload,
    }
}
