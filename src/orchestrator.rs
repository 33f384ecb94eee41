// Mitigation orchestrator: turns one validated mitigation request into
// running protections, or into nothing at all.
//
// Every scope is posted to the blocker selection service; assignments come
// back in completion order over two channels. The fan-in loop consumes
// whichever channel fires first. After the first failure the loop keeps
// draining outstanding selections (their capacity must be handed back) but
// registers no further protections, so everything that was registered is in
// the rollback list when rollback runs.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::blocker::Blocker;
use crate::blocker_selection::{BlockerSelectionService, SELECTION_QUEUE_DEPTH};
use crate::customer::Customer;
use crate::errors::{DotsError, Result};
use crate::messages;
use crate::mitigation_scope::MitigationScope;
use crate::protection::Protection;
use crate::validators::validate_mitigation_scope;

#[derive(Clone)]
pub struct MitigationOrchestrator {
    selection: BlockerSelectionService,
}

impl MitigationOrchestrator {
    pub fn new(selection: BlockerSelectionService) -> Self {
        Self { selection }
    }

    /// Validate every scope in the request, obtain a blocker for each, then
    /// register and execute the protections. Any failure rolls back every
    /// protection registered for this request and surfaces the first error.
    pub async fn run(
        &self,
        request: &messages::MitigationRequest,
        customer: &Customer,
        client_identifier: &str,
        default_lifetime: i64,
    ) -> Result<()> {
        // Phase 1: nothing is committed yet, so a bad scope aborts the whole
        // batch outright.
        let mut scopes = Vec::with_capacity(request.mitigation_scope.scopes.len());
        for wire in &request.mitigation_scope.scopes {
            let scope =
                MitigationScope::from_wire(wire, customer.id, client_identifier, default_lifetime)?;
            if !validate_mitigation_scope(&scope, customer) {
                return Err(DotsError::ValidationRejected);
            }
            scopes.push(scope);
        }

        // Phase 2: fan out to the selection service.
        let (reply_tx, mut reply_rx) = mpsc::channel(SELECTION_QUEUE_DEPTH);
        let (err_tx, mut err_rx) = mpsc::channel(SELECTION_QUEUE_DEPTH);
        let mut counter = scopes.len();
        for scope in scopes {
            self.selection
                .enqueue(scope, reply_tx.clone(), err_tx.clone())
                .await?;
        }
        drop(reply_tx);
        drop(err_tx);

        // Phase 3: fan in. Exactly `counter` answers will arrive across the
        // two channels, in completion order.
        let mut rollback: Vec<(Arc<dyn Blocker>, Protection)> = Vec::new();
        let mut first_error: Option<DotsError> = None;

        while counter > 0 {
            tokio::select! {
                Some(pair) = reply_rx.recv() => {
                    counter -= 1;
                    if first_error.is_some() {
                        // Already failing: hand the slot straight back.
                        self.selection.release(pair.blocker.id()).await;
                        continue;
                    }
                    let mitigation_id = pair.scope.mitigation_id;
                    match pair.blocker.register_protection(&pair.scope).await {
                        Ok(mut protection) => {
                            let executed = pair.blocker.execute_protection(&mut protection).await;
                            // Registered either way, so it must be eligible
                            // for rollback even when execute failed.
                            rollback.push((pair.blocker.clone(), protection));
                            if let Err(e) = executed {
                                error!(
                                    mitigation_id,
                                    blocker_id = pair.blocker.id(),
                                    error = %e,
                                    "ExecuteProtection failed"
                                );
                                first_error = Some(e);
                            }
                        }
                        Err(e) => {
                            error!(
                                mitigation_id,
                                blocker_id = pair.blocker.id(),
                                error = %e,
                                "RegisterProtection failed"
                            );
                            self.selection.release(pair.blocker.id()).await;
                            first_error = Some(e);
                        }
                    }
                }
                Some(e) = err_rx.recv() => {
                    counter -= 1;
                    warn!(error = %e, "blocker selection rejected scope");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                else => {
                    // Both channels closed with answers outstanding: the
                    // selection service died under us.
                    if first_error.is_none() {
                        first_error = Some(DotsError::Internal(
                            "blocker selection ended prematurely".to_string(),
                        ));
                    }
                    break;
                }
            }
        }

        // Phase 4: compensate if anything failed.
        let Some(err) = first_error else {
            debug!(protections = rollback.len(), "mitigation batch committed");
            return Ok(());
        };

        warn!(
            protections = rollback.len(),
            error = %err,
            "mitigation batch failed, rolling back"
        );
        for (blocker, protection) in rollback {
            if let Err(e) = blocker.unregister_protection(&protection).await {
                // Keep the original failure as the reported error.
                error!(
                    protection_id = protection.id,
                    blocker_id = blocker.id(),
                    error = %e,
                    "rollback UnregisterProtection failed"
                );
            }
            self.selection.release(blocker.id()).await;
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::tests::test_policy;
    use crate::messages::{MitigationRequest, MitigationScopePayload, Scope};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls {
        registered: Vec<i64>,
        executed: Vec<i64>,
        unregistered: Vec<i64>,
    }

    struct ScriptedBlocker {
        id: i64,
        capacity: u32,
        fail_register: bool,
        fail_execute: bool,
        next_protection_id: AtomicI64,
        calls: Mutex<Calls>,
    }

    impl ScriptedBlocker {
        fn new(id: i64, capacity: u32) -> Self {
            Self {
                id,
                capacity,
                fail_register: false,
                fail_execute: false,
                next_protection_id: AtomicI64::new(1),
                calls: Mutex::new(Calls::default()),
            }
        }

        fn calls(&self) -> Calls {
            let calls = self.calls.lock().unwrap();
            Calls {
                registered: calls.registered.clone(),
                executed: calls.executed.clone(),
                unregistered: calls.unregistered.clone(),
            }
        }
    }

    #[async_trait]
    impl Blocker for ScriptedBlocker {
        fn id(&self) -> i64 {
            self.id
        }
        fn driver_type(&self) -> &str {
            "scripted"
        }
        fn capacity(&self) -> u32 {
            self.capacity
        }
        fn can_enforce(&self, _scope: &MitigationScope) -> bool {
            true
        }
        async fn register_protection(&self, scope: &MitigationScope) -> Result<Protection> {
            if self.fail_register {
                return Err(DotsError::Blocker("register refused".to_string()));
            }
            let mut protection = Protection::new(
                scope.customer_id,
                &scope.client_identifier,
                scope.mitigation_id,
                self.id,
            );
            protection.id = self.next_protection_id.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().registered.push(protection.id);
            Ok(protection)
        }
        async fn execute_protection(&self, protection: &mut Protection) -> Result<()> {
            if self.fail_execute {
                return Err(DotsError::Blocker("execute refused".to_string()));
            }
            protection.start();
            self.calls.lock().unwrap().executed.push(protection.id);
            Ok(())
        }
        async fn stop_protection(&self, protection: &mut Protection) -> Result<()> {
            protection.finish();
            Ok(())
        }
        async fn unregister_protection(&self, protection: &Protection) -> Result<()> {
            self.calls.lock().unwrap().unregistered.push(protection.id);
            Ok(())
        }
    }

    fn test_customer() -> Customer {
        Customer {
            id: 1,
            name: "test-customer".to_string(),
            common_name: "client.example".to_string(),
            policy: test_policy(),
        }
    }

    fn request_with_ids(ids: &[i64]) -> MitigationRequest {
        MitigationRequest {
            mitigation_scope: MitigationScopePayload {
                scopes: ids
                    .iter()
                    .map(|&id| Scope {
                        mitigation_id: id,
                        target_prefix: vec!["192.0.2.0/24".to_string()],
                        target_protocol: vec![6],
                        lifetime: 3600,
                        ..Default::default()
                    })
                    .collect(),
                client_identifier: None,
            },
        }
    }

    #[tokio::test]
    async fn test_successful_batch_executes_all() {
        let blocker = Arc::new(ScriptedBlocker::new(1, 10));
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection);

        orchestrator
            .run(&request_with_ids(&[10, 11, 12]), &test_customer(), "client.example", 3600)
            .await
            .unwrap();

        let calls = blocker.calls();
        assert_eq!(calls.registered.len(), 3);
        assert_eq!(calls.executed.len(), 3);
        assert!(calls.unregistered.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_before_selection() {
        let blocker = Arc::new(ScriptedBlocker::new(1, 10));
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection);

        // Prefix outside the customer's allowed ranges
        let mut request = request_with_ids(&[10]);
        request.mitigation_scope.scopes[0].target_prefix = vec!["198.51.100.0/24".to_string()];

        let err = orchestrator
            .run(&request, &test_customer(), "client.example", 3600)
            .await
            .unwrap_err();
        assert!(matches!(err, DotsError::ValidationRejected));
        assert!(blocker.calls().registered.is_empty());
    }

    #[tokio::test]
    async fn test_execute_failure_rolls_back_registered_protections() {
        let mut failing = ScriptedBlocker::new(1, 10);
        failing.fail_execute = true;
        let blocker = Arc::new(failing);
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection.clone());

        let err = orchestrator
            .run(&request_with_ids(&[10, 11]), &test_customer(), "client.example", 3600)
            .await
            .unwrap_err();
        assert!(matches!(err, DotsError::Blocker(_)));

        let calls = blocker.calls();
        // Every registered protection was unregistered again
        assert_eq!(calls.registered, calls.unregistered);
        assert!(calls.executed.is_empty());
    }

    #[tokio::test]
    async fn test_register_failure_leaves_nothing_behind() {
        let mut failing = ScriptedBlocker::new(1, 10);
        failing.fail_register = true;
        let blocker = Arc::new(failing);
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection);

        let err = orchestrator
            .run(&request_with_ids(&[10]), &test_customer(), "client.example", 3600)
            .await
            .unwrap_err();
        assert!(matches!(err, DotsError::Blocker(_)));

        let calls = blocker.calls();
        assert!(calls.registered.is_empty());
        assert!(calls.unregistered.is_empty());
    }

    #[tokio::test]
    async fn test_selection_error_drains_and_rolls_back() {
        // Capacity 1: first scope lands, second is rejected, first must be
        // rolled back.
        let blocker = Arc::new(ScriptedBlocker::new(1, 1));
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection.clone());

        let err = orchestrator
            .run(&request_with_ids(&[10, 11]), &test_customer(), "client.example", 3600)
            .await
            .unwrap_err();
        assert!(matches!(err, DotsError::Blocker(_)));

        let calls = blocker.calls();
        assert_eq!(calls.registered, calls.unregistered);

        // Rollback released the capacity: a fresh single-scope batch lands.
        orchestrator
            .run(&request_with_ids(&[12]), &test_customer(), "client.example", 3600)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rollback_releases_capacity_for_late_assignments() {
        let blocker = Arc::new(ScriptedBlocker::new(1, 2));
        let selection = BlockerSelectionService::spawn(vec![blocker.clone()]);
        let orchestrator = MitigationOrchestrator::new(selection.clone());

        // Three scopes against capacity 2: one selection error, two
        // assignments. All capacity must be back afterwards.
        let err = orchestrator
            .run(&request_with_ids(&[10, 11, 12]), &test_customer(), "client.example", 3600)
            .await
            .unwrap_err();
        assert!(matches!(err, DotsError::Blocker(_)));

        orchestrator
            .run(&request_with_ids(&[20, 21]), &test_customer(), "client.example", 3600)
            .await
            .unwrap();
    }
}
