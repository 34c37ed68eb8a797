//! Version activation with validation gating and staged rollout.
//!
//! Activations are asynchronous on the remote side: submission returns
//! immediately and the rollout is observed by polling. The first status
//! check runs right after submission; subsequent polls back off
//! progressively along the configured delay schedule, repeating the final
//! delay once the schedule is exhausted.
//!
//! Production is gated behind staging by default. Unless the caller opts
//! out, a production request first lands the version on staging and returns
//! guidance for the explicit promotion call; the engine never promotes to
//! production on its own.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    Activation, ActivationConfig, ActivationResult, ActivationState, Network, OperationConfig,
    TenantId, ValidationWarning, VersionInfo, WarningSeverity,
};
use crate::domain::ports::{ApiGateway, ApiRequest};

/// Drives version validation, submission, and rollout polling.
pub struct ActivationEngine {
    gateway: Arc<dyn ApiGateway>,
    config: ActivationConfig,
}

impl ActivationEngine {
    pub fn new(gateway: Arc<dyn ApiGateway>, config: ActivationConfig) -> Self {
        Self { gateway, config }
    }

    /// Activate `version` of a resource on `network`.
    ///
    /// Auto-fixable validation warnings are repaired and the version is
    /// re-validated once. Any warning still present afterwards blocks the
    /// activation unless its code appears in `opts.acknowledged_warnings`.
    ///
    /// A version already live on `network` returns `Activated` without a
    /// new submission. Flows that need to edit an active version first call
    /// [`Self::prepare_mutable_version`] to clone it, stage edits on the
    /// clone, then activate the clone.
    pub async fn activate(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
        network: Network,
        opts: &OperationConfig,
    ) -> OrchestratorResult<ActivationResult> {
        let info = self.fetch_version(tenant, family, resource_id, version).await?;
        if info.active_on.contains(&network) {
            debug!(%tenant, resource_id, version, network = network.as_str(), "version already active");
            return Ok(ActivationResult::Activated(Activation {
                id: String::new(),
                resource_id: resource_id.to_string(),
                version,
                network,
                state: ActivationState::Active,
                submitted_at: Utc::now(),
            }));
        }

        let mut warnings = self.validate(tenant, family, resource_id, version).await?;
        let fixable: Vec<ValidationWarning> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::AutoFixable && w.fix.is_some())
            .cloned()
            .collect();
        if !fixable.is_empty() {
            for warning in &fixable {
                self.apply_fix(tenant, family, resource_id, version, warning)
                    .await?;
            }
            // One re-validation round; fixes that did not take block below.
            warnings = self.validate(tenant, family, resource_id, version).await?;
        }

        let blocking: Vec<ValidationWarning> = warnings
            .into_iter()
            .filter(|w| !opts.acknowledged_warnings.contains(&w.code))
            .collect();
        if !blocking.is_empty() {
            warn!(
                %tenant,
                resource_id,
                version,
                warnings = blocking.len(),
                "activation blocked on unacknowledged warnings"
            );
            return Ok(ActivationResult::Blocked { warnings: blocking });
        }

        let staging_detour = network == Network::Production
            && !opts.skip_staging
            && !info.active_on.contains(&Network::Staging);
        let target = if staging_detour {
            Network::Staging
        } else {
            network
        };

        let activation = self
            .submit_and_poll(tenant, family, resource_id, version, target, opts)
            .await?;

        if staging_detour {
            Ok(ActivationResult::Staged {
                activation,
                guidance: format!(
                    "version {version} of {resource_id} is live on staging; verify behavior, \
                     then request production activation to promote"
                ),
            })
        } else {
            Ok(ActivationResult::Activated(activation))
        }
    }

    /// Return a version of the resource that is safe to edit.
    ///
    /// Versions bound to a live network are immutable; those are cloned into
    /// a fresh version and the new version number returned.
    pub async fn prepare_mutable_version(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
    ) -> OrchestratorResult<u64> {
        let info = self.fetch_version(tenant, family, resource_id, version).await?;
        if info.is_mutable() {
            return Ok(version);
        }

        let response = self
            .gateway
            .request(ApiRequest::post(
                tenant,
                format!("/{family}/{resource_id}/versions"),
                json!({ "createFromVersion": version }),
            ))
            .await?;
        let new_version = response
            .body
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| OrchestratorError::Unknown {
                message: format!("clone of {resource_id} v{version} returned no version number"),
                suggestion: None,
                diagnostics: response.body.clone(),
            })?;
        info!(%tenant, resource_id, from = version, to = new_version, "cloned active version for editing");
        Ok(new_version)
    }

    async fn fetch_version(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
    ) -> OrchestratorResult<VersionInfo> {
        let response = self
            .gateway
            .request(ApiRequest::get(
                tenant,
                format!("/{family}/{resource_id}/versions/{version}"),
            ))
            .await?;
        let active_on = response
            .body
            .get("activeOn")
            .and_then(Value::as_array)
            .map(|nets| {
                nets.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|n| match n {
                        "staging" => Some(Network::Staging),
                        "production" => Some(Network::Production),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(VersionInfo {
            resource_id: resource_id.to_string(),
            version,
            active_on,
            note: response
                .body
                .get("note")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn validate(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
    ) -> OrchestratorResult<Vec<ValidationWarning>> {
        let response = self
            .gateway
            .request(ApiRequest::post(
                tenant,
                format!("/{family}/{resource_id}/versions/{version}/validate"),
                Value::Null,
            ))
            .await?;
        let warnings = response
            .body
            .get("warnings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(warnings
            .into_iter()
            .map(|raw| {
                // Unparseable warnings block rather than slip through.
                serde_json::from_value(raw.clone()).unwrap_or(ValidationWarning {
                    code: "unrecognized".into(),
                    message: raw.to_string(),
                    severity: WarningSeverity::Blocking,
                    fix: None,
                })
            })
            .collect())
    }

    async fn apply_fix(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
        warning: &ValidationWarning,
    ) -> OrchestratorResult<()> {
        debug!(%tenant, resource_id, version, code = %warning.code, "applying validation fix");
        self.gateway
            .request(ApiRequest::post(
                tenant,
                format!("/{family}/{resource_id}/versions/{version}/fixes"),
                warning.fix.clone().unwrap_or(Value::Null),
            ))
            .await?;
        Ok(())
    }

    async fn submit_and_poll(
        &self,
        tenant: &TenantId,
        family: &str,
        resource_id: &str,
        version: u64,
        network: Network,
        opts: &OperationConfig,
    ) -> OrchestratorResult<Activation> {
        let response = self
            .gateway
            .request(ApiRequest::post(
                tenant,
                format!("/{family}/{resource_id}/versions/{version}/activations"),
                json!({ "network": network.as_str() }),
            ))
            .await?;
        let activation_id = response
            .body
            .get("activationId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut activation = Activation {
            id: activation_id,
            resource_id: resource_id.to_string(),
            version,
            network,
            state: ActivationState::Pending,
            submitted_at: Utc::now(),
        };
        info!(
            %tenant,
            resource_id,
            version,
            network = network.as_str(),
            activation = %activation.id,
            "activation submitted"
        );

        let max_wait = opts
            .max_wait
            .unwrap_or(Duration::from_millis(self.config.default_max_wait_ms));
        let started = Instant::now();
        let mut polls = 0usize;

        // First status check runs immediately; delays apply between polls.
        loop {
            let response = self
                .gateway
                .request(ApiRequest::get(
                    tenant,
                    format!("/{family}/{resource_id}/activations/{}", activation.id),
                ))
                .await?;
            polls += 1;
            let state = ActivationState::parse(
                response
                    .body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            debug!(activation = %activation.id, state = state.as_str(), poll = polls, "activation poll");
            activation.state = state;

            match state {
                ActivationState::Active => {
                    info!(
                        %tenant,
                        resource_id,
                        version,
                        network = network.as_str(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "activation complete"
                    );
                    return Ok(activation);
                }
                ActivationState::Failed | ActivationState::Aborted => {
                    return Err(OrchestratorError::ActivationFailed {
                        state: state.as_str().into(),
                        network: network.as_str().into(),
                        diagnostics: response.body,
                    });
                }
                _ => {}
            }

            let delay = self.delay_for(polls - 1);
            if started.elapsed() + delay > max_wait {
                return Err(OrchestratorError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(delay).await;
        }
    }

    fn delay_for(&self, poll: usize) -> Duration {
        self.config
            .poll_delays_ms
            .get(poll)
            .or_else(|| self.config.poll_delays_ms.last())
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(Duration::from_secs(5))
    }
}
