use std::collections::VecDeque;
use std::sync::Mutex;

use tokenforge_core::deployment::DeploymentStatus;

use crate::deployer::{Deployer, DeploymentHandle, DeploymentReport, PreparedConfig, SubmitOutcome};

/// Scripted deployer for tests
///
/// Answers come from queues filled by the test. With an empty submit queue
/// every submission is accepted with a transaction hash derived from the
/// fingerprint; with an empty poll queue every poll reports success at an
/// address derived from the same fingerprint.
#[derive(Debug, Default)]
pub struct MockDeployer {
    submits: Mutex<VecDeque<SubmitOutcome>>,
    polls: Mutex<VecDeque<Result<DeploymentReport, String>>>,
    submitted: Mutex<Vec<PreparedConfig>>,
}

impl MockDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next submission
    pub fn push_submit(&self, outcome: SubmitOutcome) {
        if let Ok(mut queue) = self.submits.lock() {
            queue.push_back(outcome);
        }
    }

    /// Queue the answer to the next poll
    pub fn push_poll(&self, report: Result<DeploymentReport, String>) {
        if let Ok(mut queue) = self.polls.lock() {
            queue.push_back(report);
        }
    }

    /// Every configuration submitted so far
    pub fn submitted(&self) -> Vec<PreparedConfig> {
        self.submitted
            .lock()
            .map(|configs| configs.clone())
            .unwrap_or_default()
    }

    /// Address the mock assigns to a fingerprint
    pub fn address_for(fingerprint: &str) -> String {
        format!("0x{}", &fingerprint[..40.min(fingerprint.len())])
    }
}

impl Deployer for MockDeployer {
    fn name(&self) -> &str {
        "mock"
    }

    fn submit(&self, config: &PreparedConfig) -> SubmitOutcome {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(config.clone());
        }
        self.submits
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| SubmitOutcome::accepted(format!("0x{}", config.fingerprint)))
    }

    fn poll(&self, handle: &DeploymentHandle) -> Result<DeploymentReport, String> {
        if let Some(report) = self.polls.lock().ok().and_then(|mut queue| queue.pop_front()) {
            return report;
        }
        let fingerprint = handle
            .transaction_hash
            .as_deref()
            .map(|hash| hash.trim_start_matches("0x"))
            .ok_or_else(|| format!("no transaction known for token {}", handle.token_id))?;
        Ok(DeploymentReport {
            status: DeploymentStatus::Success,
            contract_address: Some(Self::address_for(fingerprint)),
            error: None,
        })
    }
}
