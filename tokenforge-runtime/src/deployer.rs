use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use tokenforge_core::aggregate::TokenAggregate;
use tokenforge_core::deployment::{DeploymentRecord, DeploymentStatus, NetworkEnvironment};
use tokenforge_core::error::TokenResult;
use tokenforge_core::id::TokenId;
use tokenforge_core::standard::TokenStandard;
use tokenforge_mapping::aggregate_to_form;

/// Form keys that change without changing what gets deployed
const VOLATILE_KEYS: &[&str] = &["status", "transitionCount", "createdAt", "updatedAt", "metadata"];

/// Configuration handed to a deployer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedConfig {
    pub token_id: TokenId,
    pub standard: TokenStandard,
    pub network: String,
    pub environment: NetworkEnvironment,
    /// The token's full form without volatile keys
    pub payload: Value,
    /// Hex SHA-256 over network, environment and payload
    pub fingerprint: String,
}

impl PreparedConfig {
    /// Prepare the deployment configuration of an aggregate
    ///
    /// # Parameters
    /// * `aggregate` - The validated token
    /// * `network` - Target chain name
    /// * `environment` - Test or production network
    ///
    /// # Returns
    /// The configuration with its fingerprint filled in
    pub fn prepare(
        aggregate: &TokenAggregate,
        network: &str,
        environment: NetworkEnvironment,
    ) -> TokenResult<Self> {
        let mut form = aggregate_to_form(aggregate)?;
        for key in VOLATILE_KEYS {
            form.remove(*key);
        }
        let payload = Value::Object(form);

        let mut hasher = Sha256::new();
        hasher.update(network.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(&environment)?);
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(&payload)?);
        let fingerprint = hex::encode(hasher.finalize());

        Ok(Self {
            token_id: aggregate.id(),
            standard: aggregate.standard(),
            network: network.to_string(),
            environment,
            payload,
            fingerprint,
        })
    }
}

/// What a deployer answered to a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub address: Option<String>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

impl SubmitOutcome {
    pub fn accepted(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: Some(tx_hash.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Identifies a submitted deployment when polling for progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentHandle {
    pub token_id: TokenId,
    pub network: String,
    pub transaction_hash: Option<String>,
    pub contract_address: Option<String>,
}

impl From<&DeploymentRecord> for DeploymentHandle {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            token_id: record.token_id,
            network: record.network.clone(),
            transaction_hash: record.transaction_hash.clone(),
            contract_address: record.contract_address.clone(),
        }
    }
}

/// Progress report on a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub status: DeploymentStatus,
    pub contract_address: Option<String>,
    pub error: Option<String>,
}

impl DeploymentReport {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status,
            contract_address: None,
            error: None,
        }
    }

    pub fn deployed_at(address: impl Into<String>) -> Self {
        Self {
            status: DeploymentStatus::Success,
            contract_address: Some(address.into()),
            error: None,
        }
    }
}

/// The external on-chain deployer
pub trait Deployer: Send + Sync {
    /// Get a string identifier for this deployer
    fn name(&self) -> &str;

    /// Submit a prepared configuration
    fn submit(&self, config: &PreparedConfig) -> SubmitOutcome;

    /// Ask for the current progress of a submitted deployment
    ///
    /// # Returns
    /// The report, or a message when the deployer could not be reached or
    /// timed out
    fn poll(&self, handle: &DeploymentHandle) -> Result<DeploymentReport, String>;
}
