// Blocker abstraction: one enforcement device (BGP speaker, firewall, …)
// behind a uniform capability set. Driver plugins live outside this crate;
// the null driver below accepts every scope and enforces nothing, which is
// all the core needs to exercise the protection lifecycle.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::mitigation_scope::MitigationScope;
use crate::protection::Protection;
use crate::repository::Repository;

/// Capability set every enforcement device exposes.
#[async_trait]
pub trait Blocker: Send + Sync {
    fn id(&self) -> i64;

    fn driver_type(&self) -> &str;

    /// Concurrent protections this device can host.
    fn capacity(&self) -> u32;

    /// Whether this driver can enforce the scope's target set.
    fn can_enforce(&self, scope: &MitigationScope) -> bool;

    /// Bind a scope to this device, yielding a (not yet running) protection.
    async fn register_protection(&self, scope: &MitigationScope) -> Result<Protection>;

    /// Start enforcement for a registered protection.
    async fn execute_protection(&self, protection: &mut Protection) -> Result<()>;

    /// Stop enforcement; the protection stays registered but disabled.
    async fn stop_protection(&self, protection: &mut Protection) -> Result<()>;

    /// Remove a protection from the device entirely.
    async fn unregister_protection(&self, protection: &Protection) -> Result<()>;
}

/// Lookup table from blocker id to device, for resolving the blocker a
/// stored protection points at.
pub type BlockerMap = Arc<HashMap<i64, Arc<dyn Blocker>>>;

pub fn blocker_map(blockers: &[Arc<dyn Blocker>]) -> BlockerMap {
    Arc::new(blockers.iter().map(|b| (b.id(), b.clone())).collect())
}

// =============================================================================
// NULL DRIVER
// =============================================================================

/// Driver that tracks protection state without touching the network.
pub struct NullBlocker {
    id: i64,
    capacity: u32,
    repository: Arc<dyn Repository>,
}

impl NullBlocker {
    pub fn new(id: i64, capacity: u32, repository: Arc<dyn Repository>) -> Self {
        Self {
            id,
            capacity,
            repository,
        }
    }
}

#[async_trait]
impl Blocker for NullBlocker {
    fn id(&self) -> i64 {
        self.id
    }

    fn driver_type(&self) -> &str {
        "null"
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
        debug!(
            blocker_id = self.id,
            mitigation_id = scope.mitigation_id,
            protection_id = protection.id,
            "protection registered"
        );
        Ok(protection)
    }

    async fn execute_protection(&self, protection: &mut Protection) -> Result<()> {
        protection.start();
        self.repository.update_protection(protection).await?;
        info!(
            blocker_id = self.id,
            mitigation_id = protection.mitigation_id,
            protection_id = protection.id,
            "protection executing"
        );
        Ok(())
    }

    async fn stop_protection(&self, protection: &mut Protection) -> Result<()> {
        protection.finish();
        self.repository.update_protection(protection).await?;
        info!(
            blocker_id = self.id,
            mitigation_id = protection.mitigation_id,
            protection_id = protection.id,
            "protection stopped"
        );
        Ok(())
    }

    async fn unregister_protection(&self, protection: &Protection) -> Result<()> {
        self.repository.delete_protection(protection.id).await?;
        debug!(
            blocker_id = self.id,
            protection_id = protection.id,
            "protection unregistered"
        );
        Ok(())
    }
}
