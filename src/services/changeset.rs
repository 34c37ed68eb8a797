//! Changelist-backed mutation coordinator.
//!
//! Drives the open → stage → submit → activate workflow against the remote
//! API while holding an in-process lease on the target scope. A held lease
//! fails fast with `Conflict` instead of queuing: queuing risks unbounded
//! lease lifetime and deadlock if the original holder crashes. The lease is
//! process-local only; the remote system's own locking stays authoritative.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{ActivationConfig, ChangeSet, ChangeSetState, StagedEdit, TenantId};
use crate::domain::ports::{ApiGateway, ApiRequest};

/// Handle passed to the staging callback to collect edits.
#[derive(Debug, Default)]
pub struct ChangeSetHandle {
    edits: Vec<StagedEdit>,
}

impl ChangeSetHandle {
    pub fn stage(&mut self, edit: StagedEdit) {
        self.edits.push(edit);
    }

    pub fn staged(&self) -> &[StagedEdit] {
        &self.edits
    }
}

/// Result of a completed changeset workflow.
#[derive(Debug)]
pub struct ChangeSetOutcome<R> {
    /// Value returned by the staging callback.
    pub result: R,
    /// Terminal changeset, for diagnostics.
    pub changeset: ChangeSet,
}

/// In-process lease released on drop.
struct LeaseGuard {
    scope: String,
    leases: Arc<Mutex<HashSet<String>>>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.scope);
    }
}

/// Coordinates exclusive changeset workflows per scope.
pub struct ChangeSetCoordinator {
    gateway: Arc<dyn ApiGateway>,
    leases: Arc<Mutex<HashSet<String>>>,
    poll_delays: Vec<Duration>,
    max_wait: Duration,
}

impl ChangeSetCoordinator {
    pub fn new(gateway: Arc<dyn ApiGateway>, config: &ActivationConfig) -> Self {
        Self {
            gateway,
            leases: Arc::new(Mutex::new(HashSet::new())),
            poll_delays: config
                .poll_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_wait: Duration::from_millis(config.default_max_wait_ms),
        }
    }

    /// Run `f` inside an exclusive changeset for `scope`.
    ///
    /// On any failure from `f`, staging, submission, or activation the
    /// changeset is discarded remotely (best effort, logged) before the
    /// lease is released and the original error re-raised.
    pub async fn with_change_set<R, F>(
        &self,
        tenant: &TenantId,
        scope: &str,
        f: F,
    ) -> OrchestratorResult<ChangeSetOutcome<R>>
    where
        F: FnOnce(&mut ChangeSetHandle) -> OrchestratorResult<R>,
    {
        let _lease = self.acquire_lease(scope)?;

        let mut changeset = self.open(tenant, scope).await?;
        debug!(%tenant, scope, changeset = %changeset.id, "changeset opened");

        match self.run_workflow(tenant, &mut changeset, f).await {
            Ok(result) => {
                info!(%tenant, scope, changeset = %changeset.id, "changeset activated");
                Ok(ChangeSetOutcome { result, changeset })
            }
            Err(err) => {
                let _ = changeset.transition(ChangeSetState::Failed);
                self.discard(tenant, scope, &changeset.id).await;
                Err(err)
            }
        }
    }

    /// Whether a non-terminal changeset currently holds `scope`.
    pub fn is_leased(&self, scope: &str) -> bool {
        self.leases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(scope)
    }

    fn acquire_lease(&self, scope: &str) -> OrchestratorResult<LeaseGuard> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        if !leases.insert(scope.to_string()) {
            return Err(OrchestratorError::Conflict(format!(
                "a changeset is already open for scope {scope}"
            )));
        }
        Ok(LeaseGuard {
            scope: scope.to_string(),
            leases: Arc::clone(&self.leases),
        })
    }

    async fn run_workflow<R, F>(
        &self,
        tenant: &TenantId,
        changeset: &mut ChangeSet,
        f: F,
    ) -> OrchestratorResult<R>
    where
        F: FnOnce(&mut ChangeSetHandle) -> OrchestratorResult<R>,
    {
        let mut handle = ChangeSetHandle::default();
        let result = f(&mut handle)?;

        for edit in handle.staged() {
            self.gateway
                .request(ApiRequest::post(
                    tenant,
                    format!("/changelists/{}/edits", changeset.scope),
                    serde_json::to_value(edit).unwrap_or(Value::Null),
                ))
                .await?;
        }
        changeset.edits = handle.edits;
        changeset.transition(ChangeSetState::Staged)?;

        self.gateway
            .request(ApiRequest::post(
                tenant,
                format!("/changelists/{}/submit", changeset.scope),
                Value::Null,
            ))
            .await?;
        changeset.transition(ChangeSetState::Submitted)?;

        self.poll_until_active(tenant, changeset).await?;
        Ok(result)
    }

    async fn open(&self, tenant: &TenantId, scope: &str) -> OrchestratorResult<ChangeSet> {
        let response = self
            .gateway
            .request(
                ApiRequest::post(tenant, "/changelists", Value::Null)
                    .with_query("scope", scope),
            )
            .await?;
        let id = response
            .body
            .get("changeListId")
            .and_then(Value::as_str)
            .unwrap_or(scope)
            .to_string();
        Ok(ChangeSet::open(id, scope))
    }

    async fn poll_until_active(
        &self,
        tenant: &TenantId,
        changeset: &mut ChangeSet,
    ) -> OrchestratorResult<()> {
        let started = Instant::now();
        let mut polls = 0usize;

        // First status check runs immediately; delays apply between polls.
        loop {
            let response = self
                .gateway
                .request(ApiRequest::get(
                    tenant,
                    format!("/changelists/{}/status", changeset.scope),
                ))
                .await?;
            polls += 1;
            let status = response
                .body
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("submitted");

            match status {
                "active" => {
                    if changeset.state == ChangeSetState::Submitted {
                        changeset.transition(ChangeSetState::Activating)?;
                    }
                    changeset.transition(ChangeSetState::Active)?;
                    return Ok(());
                }
                "failed" => {
                    return Err(OrchestratorError::ActivationFailed {
                        state: "failed".into(),
                        network: changeset.scope.clone(),
                        diagnostics: response.body,
                    });
                }
                "activating" => {
                    if changeset.state == ChangeSetState::Submitted {
                        changeset.transition(ChangeSetState::Activating)?;
                    }
                }
                _ => {}
            }

            let delay = self.delay_for(polls - 1);
            if started.elapsed() + delay > self.max_wait {
                return Err(OrchestratorError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(delay).await;
        }
    }

    /// Best-effort remote discard; failures are logged but never mask the
    /// original workflow error.
    async fn discard(&self, tenant: &TenantId, scope: &str, id: &str) {
        match self
            .gateway
            .request(ApiRequest::delete(tenant, format!("/changelists/{scope}")))
            .await
        {
            Ok(_) => debug!(%tenant, scope, changeset = id, "discarded failed changeset"),
            Err(err) => {
                warn!(%tenant, scope, changeset = id, error = %err, "failed to discard changeset");
            }
        }
    }

    fn delay_for(&self, poll: usize) -> Duration {
        self.poll_delays
            .get(poll)
            .or_else(|| self.poll_delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(5))
    }
}
