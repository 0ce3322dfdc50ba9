pub mod config;
pub mod deployer;
pub mod engine;
pub mod mock_deployer;
pub mod orchestrator;
pub mod verification;

// Re-export the main types for convenience
pub use config::EngineConfig;
pub use deployer::{Deployer, DeploymentHandle, DeploymentReport, PreparedConfig, SubmitOutcome};
pub use engine::TokenEngine;
pub use mock_deployer::MockDeployer;
pub use orchestrator::{DeployRequest, DeploymentOrchestrator, DeploymentOutcome};
pub use verification::DeploymentValidator;
