//! Deployment orchestration
//!
//! The only path that moves a token from `MINTED` to `DEPLOYED`. A deploy
//! validates, submits and records a deployment; the token status follows
//! only when a later poll or push reports the contract on chain.

use chrono::Utc;
use log::{info, warn};
use serde_json::{Map, Value};

use tokenforge_core::deployment::{DeploymentRecord, DeploymentStatus, NetworkEnvironment};
use tokenforge_core::error::{TokenError, TokenResult};
use tokenforge_core::findings::SecurityValidationResult;
use tokenforge_core::id::{new_row_id, TokenId};
use tokenforge_core::lifecycle::TransitionOrigin;
use tokenforge_core::status::TokenStatus;
use tokenforge_core::validation::is_address;
use tokenforge_storage_impl::{AggregateLoader, TransitionRequest};

use crate::config::EngineConfig;
use crate::deployer::{Deployer, DeploymentHandle, DeploymentReport, PreparedConfig};
use crate::verification::DeploymentValidator;

/// Options for one deployment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployRequest {
    /// Chain name; the configured default when `None`
    pub network: Option<String>,
    pub environment: Option<NetworkEnvironment>,
    /// Proceed past blocking findings, if the configuration allows it
    pub override_validation: bool,
    pub actor: Option<String>,
}

/// Result of a submitted deployment
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentOutcome {
    pub record: DeploymentRecord,
    /// Findings the deployment went ahead with
    pub report: SecurityValidationResult,
}

/// Drives deployments through a deployer and back into the token lifecycle
pub struct DeploymentOrchestrator<'a> {
    loader: &'a AggregateLoader,
    deployer: &'a dyn Deployer,
    validator: &'a DeploymentValidator,
    config: &'a EngineConfig,
}

impl<'a> DeploymentOrchestrator<'a> {
    pub fn new(
        loader: &'a AggregateLoader,
        deployer: &'a dyn Deployer,
        validator: &'a DeploymentValidator,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            loader,
            deployer,
            validator,
            config,
        }
    }

    /// Validate and submit a minted token
    ///
    /// # Parameters
    /// * `token_id` - The token to deploy
    /// * `request` - Target network and override choice
    ///
    /// # Returns
    /// The recorded deployment, or `DeploymentBlocked` with the full report
    /// when blocking findings exist and no permitted override was given
    pub fn deploy(&self, token_id: TokenId, request: DeployRequest) -> TokenResult<DeploymentOutcome> {
        let aggregate = self.loader.load(token_id)?;
        let report = self.validator.validate(&aggregate)?;

        let overridden = report.has_issues;
        if overridden {
            if !(request.override_validation && self.config.allow_validation_override) {
                info!(
                    "deployment of token {token_id} blocked by {} finding(s)",
                    report.findings.len()
                );
                return Err(TokenError::DeploymentBlocked { report });
            }
            warn!(
                "deploying token {token_id} over {} blocking finding(s){}",
                report.blocking().count(),
                request
                    .actor
                    .as_deref()
                    .map(|actor| format!(" on request of {actor}"))
                    .unwrap_or_default()
            );
        }

        if let Some(existing) = &aggregate.deployment {
            if !existing.status.is_settled() {
                return Err(TokenError::DeployerFailure(format!(
                    "deployment {} of token {token_id} is still {}",
                    existing.id, existing.status
                )));
            }
        }

        let network = request
            .network
            .unwrap_or_else(|| self.config.default_network.clone());
        let environment = request
            .environment
            .unwrap_or(self.config.default_environment);
        let prepared = PreparedConfig::prepare(&aggregate, &network, environment)?;

        let outcome = self.deployer.submit(&prepared);
        let mut record = DeploymentRecord {
            id: aggregate
                .deployment
                .as_ref()
                .map(|existing| existing.id.clone())
                .unwrap_or_else(new_row_id),
            token_id,
            network,
            environment,
            contract_address: outcome.address.clone(),
            transaction_hash: outcome.tx_hash.clone(),
            status: DeploymentStatus::Deploying,
            error: None,
            config_fingerprint: prepared.fingerprint.clone(),
            validation_overridden: overridden,
            deployed_at: None,
            updated_at: Utc::now(),
        };

        if let Some(error) = outcome.error {
            record.status = DeploymentStatus::Failed;
            record.error = Some(error.clone());
            self.loader.save_deployment(&record)?;
            warn!("{} rejected deployment of token {token_id}: {error}", self.deployer.name());
            return Err(TokenError::DeployerFailure(error));
        }

        self.loader.save_deployment(&record)?;
        info!(
            "submitted token {token_id} to {} on {} ({})",
            self.deployer.name(),
            record.network,
            prepared.fingerprint
        );
        Ok(DeploymentOutcome { record, report })
    }

    /// Poll the deployer and apply what it reports
    pub fn refresh(&self, token_id: TokenId) -> TokenResult<DeploymentRecord> {
        let record = self.current(token_id)?;
        if record.status.is_settled() {
            // Nothing left to poll; re-applying finishes an interrupted status write
            let settled = DeploymentReport::status(record.status);
            return self.apply(record, settled);
        }
        let report = self
            .deployer
            .poll(&DeploymentHandle::from(&record))
            .map_err(|error| {
                warn!("polling deployment of token {token_id} failed: {error}");
                TokenError::DeployerFailure(error)
            })?;
        self.apply(record, report)
    }

    /// Apply a status pushed by the deployer
    pub fn record_status(
        &self,
        token_id: TokenId,
        report: DeploymentReport,
    ) -> TokenResult<DeploymentRecord> {
        let record = self.current(token_id)?;
        self.apply(record, report)
    }

    fn current(&self, token_id: TokenId) -> TokenResult<DeploymentRecord> {
        self.loader
            .deployment(token_id)?
            .ok_or_else(|| TokenError::NotFound(format!("deployment of token {token_id}")))
    }

    fn apply(
        &self,
        mut record: DeploymentRecord,
        report: DeploymentReport,
    ) -> TokenResult<DeploymentRecord> {
        let token_id = record.token_id;
        if let Some(address) = report.contract_address {
            if !is_address(&address) {
                return Err(TokenError::DeployerFailure(format!(
                    "deployer reported malformed contract address {address:?}"
                )));
            }
            record.contract_address = Some(address);
        }
        let on_chain = report.status.is_on_chain();
        if on_chain && record.contract_address.is_none() {
            return Err(TokenError::DeployerFailure(format!(
                "deployment of token {token_id} reported {} without a contract address",
                report.status
            )));
        }

        let changed = record.status != report.status;
        record.apply_status(report.status, report.error);
        self.loader.save_deployment(&record)?;
        match record.status {
            DeploymentStatus::Failed | DeploymentStatus::VerificationFailed if changed => {
                warn!(
                    "deployment of token {token_id} ended {}: {}",
                    record.status,
                    record.error.as_deref().unwrap_or("no reason given")
                );
            }
            _ => {}
        }

        if on_chain {
            self.mark_deployed(&record)?;
        }
        Ok(record)
    }

    /// Move a minted token to `DEPLOYED`; a token already past `MINTED` is
    /// left alone
    fn mark_deployed(&self, record: &DeploymentRecord) -> TokenResult<()> {
        let Some(address) = record.contract_address.as_deref() else {
            return Ok(());
        };
        let token = self.loader.load_token(record.token_id)?;
        if token.status != TokenStatus::Minted {
            return Ok(());
        }
        let mut metadata_patch = Map::new();
        metadata_patch.insert("contractAddress".into(), Value::String(address.to_string()));
        metadata_patch.insert("chain".into(), Value::String(record.network.clone()));
        metadata_patch.insert(
            "environment".into(),
            serde_json::to_value(record.environment)?,
        );

        self.loader.transition(TransitionRequest {
            token_id: record.token_id,
            observed: TokenStatus::Minted,
            target: TokenStatus::Deployed,
            origin: TransitionOrigin::Orchestrator,
            actor: Some(self.deployer.name().to_string()),
            metadata_patch,
        })?;
        info!(
            "token {} deployed at {address} on {}",
            record.token_id, record.network
        );
        Ok(())
    }
}
