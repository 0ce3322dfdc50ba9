use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;
use crate::id::TokenId;

/// Progress of an on-chain deployment as reported by the deployer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Recorded locally, not yet accepted by the deployer
    Pending,
    Deploying,
    Success,
    Failed,
    Verifying,
    Verified,
    VerificationFailed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Verifying => "verifying",
            DeploymentStatus::Verified => "verified",
            DeploymentStatus::VerificationFailed => "verification_failed",
        }
    }

    /// The contract exists on chain. Source verification states only occur
    /// after a successful deployment, so they count as well.
    pub fn is_on_chain(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success
                | DeploymentStatus::Verifying
                | DeploymentStatus::Verified
                | DeploymentStatus::VerificationFailed
        )
    }

    /// No further progress will be reported for the deployment itself
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeploymentStatus::Pending | DeploymentStatus::Deploying)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "pending" => Ok(DeploymentStatus::Pending),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            "verifying" => Ok(DeploymentStatus::Verifying),
            "verified" => Ok(DeploymentStatus::Verified),
            "verification_failed" => Ok(DeploymentStatus::VerificationFailed),
            _ => Err(TokenError::UnknownStatus(s.to_string())),
        }
    }
}

/// Network environment a deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnvironment {
    #[default]
    Testnet,
    Mainnet,
}

/// The evolving deployment row of a token (table `token_deployments`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub token_id: TokenId,
    /// Chain name, e.g. `ethereum` or `polygon`
    pub network: String,
    pub environment: NetworkEnvironment,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Hex SHA-256 of the prepared configuration that was submitted
    pub config_fingerprint: String,
    #[serde(default)]
    pub validation_overridden: bool,
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Apply a status report, stamping `deployed_at` the first time the
    /// contract is seen on chain
    pub fn apply_status(&mut self, status: DeploymentStatus, error: Option<String>) {
        let now = Utc::now();
        if status.is_on_chain() && self.deployed_at.is_none() {
            self.deployed_at = Some(now);
        }
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = now;
    }
}
