// Controller for the mitigation_request endpoint.
//
// PUT drives the full pipeline: persist the scope, then let the orchestrator
// obtain blockers and start protections. Operations on one mitigation id are
// serialized through the repository's per-key lock so an update's
// cancel-then-create reads as atomic to concurrent GETs.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::blocker::BlockerMap;
use crate::blocker_selection::BlockerSelectionService;
use crate::codec::{Body, Request};
use crate::controllers::{protocol_reply, Controller, Response, ResponseCode};
use crate::customer::Customer;
use crate::errors::{DotsError, Result};
use crate::messages::{self, MitigationResponse, MitigationScopeStatus, ScopeStatus};
use crate::mitigation_scope::MitigationScope;
use crate::orchestrator::MitigationOrchestrator;
use crate::protection::Protection;
use crate::repository::Repository;
use crate::validators::validate_mitigation_scope;

pub struct MitigationRequestController {
    repository: Arc<dyn Repository>,
    blockers: BlockerMap,
    selection: BlockerSelectionService,
    orchestrator: MitigationOrchestrator,
    default_lifetime: i64,
}

impl MitigationRequestController {
    pub fn new(
        repository: Arc<dyn Repository>,
        blockers: BlockerMap,
        selection: BlockerSelectionService,
        default_lifetime: i64,
    ) -> Self {
        let orchestrator = MitigationOrchestrator::new(selection.clone());
        Self {
            repository,
            blockers,
            selection,
            orchestrator,
            default_lifetime,
        }
    }

    /// Load every (scope, active protection) pair the request names; with no
    /// scopes in the request, every mitigation id of the client.
    async fn load_mitigations(
        &self,
        request: &messages::MitigationRequest,
        customer: &Customer,
        client_identifier: &str,
    ) -> Result<Vec<(MitigationScope, Option<Protection>)>> {
        let ids: Vec<i64> = if request.mitigation_scope.scopes.is_empty() {
            let ids = self
                .repository
                .get_mitigation_ids(customer.id, client_identifier)
                .await?;
            if ids.is_empty() {
                warn!(
                    customer_id = customer.id,
                    client_identifier,
                    "no mitigation ids for this client identifier"
                );
            } else {
                info!(customer_id = customer.id, ?ids, "found mitigation ids");
            }
            ids
        } else {
            request
                .mitigation_scope
                .scopes
                .iter()
                .map(|s| s.mitigation_id)
                .collect()
        };

        let mut pairs = Vec::with_capacity(ids.len());
        for mitigation_id in ids {
            let scope = self
                .repository
                .get_mitigation_scope(customer.id, client_identifier, mitigation_id)
                .await?;
            let Some(scope) = scope else {
                warn!(mitigation_id, "mitigation scope not found");
                continue;
            };
            let protection = self
                .repository
                .get_active_protection_by_mitigation_id(customer.id, client_identifier, mitigation_id)
                .await?;
            pairs.push((scope, protection));
        }
        Ok(pairs)
    }

    /// Stop the active protection of every listed mitigation id. All ids are
    /// checked before the first blocker is told anything.
    async fn cancel_mitigations(
        &self,
        mitigation_ids: &[i64],
        customer: &Customer,
        client_identifier: &str,
    ) -> Result<()> {
        let mut protections = Vec::with_capacity(mitigation_ids.len());

        for &mitigation_id in mitigation_ids {
            if mitigation_id == 0 {
                warn!(mitigation_id, "invalid mitigation id");
                return Err(DotsError::NotFound(format!("mitigation {mitigation_id}")));
            }
            let scope = self
                .repository
                .get_mitigation_scope(customer.id, client_identifier, mitigation_id)
                .await?;
            if scope.is_none() {
                warn!(mitigation_id, "mitigation scope not found");
                return Err(DotsError::NotFound(format!("mitigation {mitigation_id}")));
            }
            let protection = self
                .repository
                .get_active_protection_by_mitigation_id(customer.id, client_identifier, mitigation_id)
                .await?;
            let Some(protection) = protection else {
                warn!(mitigation_id, "protection not found");
                return Err(DotsError::NotFound(format!(
                    "protection for mitigation {mitigation_id}"
                )));
            };
            if !protection.is_enabled {
                error!(
                    mitigation_id,
                    is_enabled = protection.is_enabled,
                    started_at = ?protection.started_at,
                    finished_at = ?protection.finished_at,
                    "protection status error"
                );
                return Err(DotsError::PreconditionFailed(format!(
                    "protection for mitigation {mitigation_id} is not enabled"
                )));
            }
            protections.push(protection);
        }

        for mut protection in protections {
            let blocker = self
                .blockers
                .get(&protection.blocker_id)
                .cloned()
                .ok_or_else(|| {
                    DotsError::Internal(format!("unknown blocker id {}", protection.blocker_id))
                })?;
            blocker.stop_protection(&mut protection).await.map_err(|e| {
                error!(
                    mitigation_id = protection.mitigation_id,
                    blocker_id = protection.blocker_id,
                    error = %e,
                    "StopProtection failed"
                );
                DotsError::Blocker(format!("blocker refused to stop protection: {e}"))
            })?;
            self.selection.release(protection.blocker_id).await;
        }

        Ok(())
    }
}

#[async_trait]
impl Controller for MitigationRequestController {
    async fn get(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Mitigation(req)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        debug!(
            payload = %serde_json::to_string(req).unwrap_or_default(),
            "[GET] receive message"
        );

        let client_identifier = req.effective_client_identifier(&customer.common_name);
        // Lookup failures degrade to an empty status list rather than failing
        // the whole call.
        let pairs = match self.load_mitigations(req, customer, &client_identifier).await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(error = %e, "loadMitigations failed");
                Vec::new()
            }
        };

        let scopes = pairs
            .into_iter()
            .map(|(scope, protection)| ScopeStatus {
                mitigation_id: scope.mitigation_id,
                mitigation_start: protection
                    .and_then(|p| p.started_at)
                    .unwrap_or(0) as f64,
                lifetime: scope.lifetime,
                // Placeholder values required for interop
                status: 2,
                bytes_dropped: 0,
                bps_dropped: 0,
                pkts_dropped: 0,
                pps_dropped: 0,
                target_protocol: scope.target_protocol.iter().map(|&p| p as i32).collect(),
            })
            .collect();

        Ok(Response::with_body(
            ResponseCode::Content,
            Body::Mitigation(MitigationResponse {
                mitigation_scope: MitigationScopeStatus { scopes },
            }),
        ))
    }

    async fn put(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Mitigation(req)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        debug!(
            payload = %serde_json::to_string(req).unwrap_or_default(),
            "[PUT] receive message"
        );

        // Exactly one scope per PUT
        if req.mitigation_scope.scopes.len() != 1 {
            return Ok(Response::empty(ResponseCode::BadRequest));
        }
        let wire_scope = &req.mitigation_scope.scopes[0];
        let client_identifier = req.effective_client_identifier(&customer.common_name);

        let key_lock = self.repository.mitigation_lock(
            customer.id,
            &client_identifier,
            wire_scope.mitigation_id,
        );
        let _guard = key_lock.lock().await;

        let current = self
            .repository
            .get_mitigation_scope(customer.id, &client_identifier, wire_scope.mitigation_id)
            .await?;

        let scope = match MitigationScope::from_wire(
            wire_scope,
            customer.id,
            &client_identifier,
            self.default_lifetime,
        ) {
            Ok(scope) => scope,
            Err(e) => return protocol_reply(e),
        };
        if !validate_mitigation_scope(&scope, customer) {
            return Ok(Response::empty(ResponseCode::BadRequest));
        }

        match current {
            None => {
                // Create
                let held = self
                    .repository
                    .get_mitigation_ids(customer.id, &client_identifier)
                    .await?;
                if held.len() >= customer.policy.max_concurrent_mitigations as usize {
                    warn!(
                        customer_id = customer.id,
                        held = held.len(),
                        max = customer.policy.max_concurrent_mitigations,
                        "concurrent mitigation cap reached"
                    );
                    return Ok(Response::empty(ResponseCode::BadRequest));
                }

                self.repository.create_mitigation_scope(&scope).await?;

                if let Err(e) = self
                    .orchestrator
                    .run(req, customer, &client_identifier, self.default_lifetime)
                    .await
                {
                    error!(
                        mitigation_id = scope.mitigation_id,
                        error = %e,
                        "mitigation create failed"
                    );
                    // Nothing of this request may survive the failure.
                    if let Err(cleanup) = self
                        .repository
                        .delete_mitigation_scope(
                            customer.id,
                            &client_identifier,
                            scope.mitigation_id,
                        )
                        .await
                    {
                        error!(
                            mitigation_id = scope.mitigation_id,
                            error = %cleanup,
                            "scope cleanup after failed create"
                        );
                    }
                    return protocol_reply(e);
                }

                info!(
                    customer_id = customer.id,
                    mitigation_id = scope.mitigation_id,
                    "mitigation created"
                );
                Ok(Response::empty(ResponseCode::Created))
            }
            Some(current) => {
                // Update: stop the running protection, then rebuild.
                if let Err(e) = self
                    .cancel_mitigations(&[current.mitigation_id], customer, &client_identifier)
                    .await
                {
                    error!(
                        mitigation_id = current.mitigation_id,
                        error = %e,
                        "cancel before update failed"
                    );
                    return protocol_reply(e);
                }

                self.repository.create_mitigation_scope(&scope).await?;

                if let Err(e) = self
                    .orchestrator
                    .run(req, customer, &client_identifier, self.default_lifetime)
                    .await
                {
                    error!(
                        mitigation_id = scope.mitigation_id,
                        error = %e,
                        "mitigation update failed"
                    );
                    return protocol_reply(e);
                }

                info!(
                    customer_id = customer.id,
                    mitigation_id = scope.mitigation_id,
                    "mitigation updated"
                );
                Ok(Response::empty(ResponseCode::Changed))
            }
        }
    }

    async fn delete(&self, request: Option<&Request>, customer: &Customer) -> Result<Response> {
        let Some(Request::Mitigation(req)) = request else {
            return Ok(Response::empty(ResponseCode::BadRequest));
        };
        debug!(
            payload = %serde_json::to_string(req).unwrap_or_default(),
            "[DELETE] receive message"
        );

        let client_identifier = req.effective_client_identifier(&customer.common_name);
        let mut ids: Vec<i64> = req
            .mitigation_scope
            .scopes
            .iter()
            .map(|s| s.mitigation_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        // Hold every key lock for the duration; sorted order keeps
        // concurrent DELETEs from deadlocking each other.
        let mut guards = Vec::with_capacity(ids.len());
        for &id in &ids {
            let lock = self
                .repository
                .mitigation_lock(customer.id, &client_identifier, id);
            guards.push(lock.lock_owned().await);
        }

        if let Err(e) = self
            .cancel_mitigations(&ids, customer, &client_identifier)
            .await
        {
            return protocol_reply(e);
        }

        for &id in &ids {
            self.repository
                .delete_mitigation_scope(customer.id, &client_identifier, id)
                .await?;
        }

        info!(customer_id = customer.id, ?ids, "mitigations deleted");
        Ok(Response::empty(ResponseCode::Deleted))
    }
}
