// Blocker selection service: a single-writer task owning the authoritative
// blocker load map. Callers enqueue a scope with a reply channel and an error
// channel; the task answers on exactly one of them. Capacity is decremented
// when a blocker is handed out and returned by an explicit release, so the
// map never needs a lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::blocker::Blocker;
use crate::errors::{DotsError, Result};
use crate::mitigation_scope::MitigationScope;

/// Queue bound for the service mailbox and the per-request channels.
pub const SELECTION_QUEUE_DEPTH: usize = 10;

/// Successful assignment: the scope paired with the blocker that will host it.
#[derive(Clone)]
pub struct ScopeBlockerPair {
    pub scope: MitigationScope,
    pub blocker: Arc<dyn Blocker>,
}

enum Command {
    Select {
        scope: MitigationScope,
        reply: mpsc::Sender<ScopeBlockerPair>,
        error: mpsc::Sender<DotsError>,
    },
    Release {
        blocker_id: i64,
    },
}

#[derive(Clone)]
pub struct BlockerSelectionService {
    tx: mpsc::Sender<Command>,
}

impl BlockerSelectionService {
    /// Start the selection task over a fixed set of blockers.
    pub fn spawn(blockers: Vec<Arc<dyn Blocker>>) -> Self {
        let (tx, rx) = mpsc::channel(SELECTION_QUEUE_DEPTH);
        tokio::spawn(run(blockers, rx));
        Self { tx }
    }

    /// Submit a scope for blocker assignment. The answer arrives on `reply`
    /// or `error`, never both.
    pub async fn enqueue(
        &self,
        scope: MitigationScope,
        reply: mpsc::Sender<ScopeBlockerPair>,
        error: mpsc::Sender<DotsError>,
    ) -> Result<()> {
        self.tx
            .send(Command::Select {
                scope,
                reply,
                error,
            })
            .await
            .map_err(|_| DotsError::Internal("blocker selection service is gone".to_string()))
    }

    /// Return one unit of capacity to a blocker after its protection stopped
    /// or was unregistered.
    pub async fn release(&self, blocker_id: i64) {
        // Nothing to do if the service already shut down.
        let _ = self.tx.send(Command::Release { blocker_id }).await;
    }
}

async fn run(blockers: Vec<Arc<dyn Blocker>>, mut rx: mpsc::Receiver<Command>) {
    let mut load: HashMap<i64, u32> = blockers.iter().map(|b| (b.id(), 0)).collect();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Select {
                scope,
                reply,
                error,
            } => {
                let chosen = blockers
                    .iter()
                    .filter(|b| b.can_enforce(&scope))
                    .filter(|b| load.get(&b.id()).copied().unwrap_or(0) < b.capacity())
                    .min_by_key(|b| (load.get(&b.id()).copied().unwrap_or(0), b.id()))
                    .cloned();

                match chosen {
                    Some(blocker) => {
                        let blocker_id = blocker.id();
                        *load.entry(blocker_id).or_insert(0) += 1;
                        debug!(
                            blocker_id,
                            mitigation_id = scope.mitigation_id,
                            load = load[&blocker_id],
                            "blocker assigned"
                        );
                        let pair = ScopeBlockerPair { scope, blocker };
                        if reply.send(pair).await.is_err() {
                            // Requester is gone; hand the slot back.
                            if let Some(l) = load.get_mut(&blocker_id) {
                                *l = l.saturating_sub(1);
                            }
                        }
                    }
                    None => {
                        warn!(
                            mitigation_id = scope.mitigation_id,
                            "no blocker compatible with scope or all at capacity"
                        );
                        let _ = error
                            .send(DotsError::Blocker(
                                "no blocker available for scope".to_string(),
                            ))
                            .await;
                    }
                }
            }
            Command::Release { blocker_id } => {
                if let Some(l) = load.get_mut(&blocker_id) {
                    *l = l.saturating_sub(1);
                }
            }
        }
    }
}
