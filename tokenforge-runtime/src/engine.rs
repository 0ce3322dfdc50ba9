//! Caller-facing token engine
//!
//! Every operation works on a fresh load of the token; nothing is cached
//! between calls.

use log::{debug, info};
use std::sync::Arc;

use tokenforge_core::aggregate::TokenAggregate;
use tokenforge_core::deployment::{DeploymentRecord, DeploymentStatus};
use tokenforge_core::error::TokenResult;
use tokenforge_core::findings::SecurityValidationResult;
use tokenforge_core::id::{ProjectId, TokenId};
use tokenforge_core::lifecycle::StatusChange;
use tokenforge_core::objects::TokenRecord;
use tokenforge_core::status::TokenStatus;
use tokenforge_core::tiers::{classify, TierClassification};
use tokenforge_mapping::{aggregate_to_form, map_form, merge_form, standard_from_form, FormData};
use tokenforge_storage_impl::{AggregateLoader, MemoryRecordStore, RecordStore, TransitionRequest};

use crate::config::EngineConfig;
use crate::deployer::{Deployer, DeploymentReport};
use crate::orchestrator::{DeployRequest, DeploymentOrchestrator, DeploymentOutcome};
use crate::verification::DeploymentValidator;

/// The token record lifecycle engine
pub struct TokenEngine {
    loader: AggregateLoader,
    deployer: Arc<dyn Deployer>,
    validator: DeploymentValidator,
    config: EngineConfig,
}

impl TokenEngine {
    pub fn new(store: Arc<dyn RecordStore>, deployer: Arc<dyn Deployer>, config: EngineConfig) -> Self {
        Self {
            loader: AggregateLoader::new(store),
            deployer,
            validator: DeploymentValidator::from_config(&config),
            config,
        }
    }

    /// Engine over a fresh in-memory store
    pub fn in_memory(deployer: Arc<dyn Deployer>, config: EngineConfig) -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()), deployer, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader(&self) -> &AggregateLoader {
        &self.loader
    }

    fn orchestrator(&self) -> DeploymentOrchestrator<'_> {
        DeploymentOrchestrator::new(&self.loader, self.deployer.as_ref(), &self.validator, &self.config)
    }

    /// Create a `DRAFT` token from a form naming its standard
    pub fn create_token(&self, project_id: ProjectId, form: &FormData) -> TokenResult<TokenAggregate> {
        let standard = standard_from_form(form)?;
        let mapped = map_form(standard, form)?;

        let mut token = TokenRecord::new(project_id, "", "", standard);
        mapped.core.apply_to(&mut token);
        token.blocks = mapped.blocks;
        if let Some(metadata) = mapped.metadata {
            token.metadata = metadata;
        }
        let aggregate =
            TokenAggregate::new(token, mapped.extension, mapped.sub_resources, None)?;
        self.loader.create(&aggregate)?;
        Ok(aggregate)
    }

    pub fn load_aggregate(&self, token_id: TokenId) -> TokenResult<TokenAggregate> {
        self.loader.load(token_id)
    }

    /// Every token, optionally limited to one project
    pub fn load_all(&self, project_id: Option<ProjectId>) -> TokenResult<Vec<TokenAggregate>> {
        self.loader.load_all(project_id)
    }

    /// The full form of a token
    pub fn load_form(&self, token_id: TokenId) -> TokenResult<FormData> {
        aggregate_to_form(&self.loader.load(token_id)?)
    }

    /// Save a full or partial form.
    ///
    /// The partial form is merged over the token's current form, so absent
    /// keys keep their values. Status and standard never change here.
    pub fn save_form(&self, token_id: TokenId, form: &FormData) -> TokenResult<TokenAggregate> {
        let current = self.loader.load(token_id)?;
        let merged = merge_form(&aggregate_to_form(&current)?, form);
        let mapped = map_form(current.standard(), &merged)?;

        let mut token = current.token;
        mapped.core.apply_to(&mut token);
        token.blocks = mapped.blocks;
        if let Some(metadata) = mapped.metadata {
            token.metadata = metadata;
        }
        let aggregate = TokenAggregate::new(
            token,
            mapped.extension,
            mapped.sub_resources,
            current.deployment,
        )?;
        debug!("saving form of token {token_id} ({} key(s) changed)", form.len());
        self.loader.save(&aggregate)
    }

    /// Move a token along the lifecycle
    ///
    /// # Parameters
    /// * `token_id` - The token to move
    /// * `observed` - The status the caller last saw
    /// * `target` - The requested status
    /// * `actor` - Who asked, recorded in the status history
    pub fn request_transition(
        &self,
        token_id: TokenId,
        observed: TokenStatus,
        target: TokenStatus,
        actor: Option<&str>,
    ) -> TokenResult<TokenRecord> {
        let mut request = TransitionRequest::caller(token_id, observed, target);
        request.actor = actor.map(str::to_string);
        self.loader.transition(request)
    }

    /// Run the deployment gate on a minted token
    pub fn validate_for_deployment(&self, token_id: TokenId) -> TokenResult<SecurityValidationResult> {
        self.validator.validate(&self.loader.load(token_id)?)
    }

    /// Deploy to the configured default network
    pub fn deploy(&self, token_id: TokenId, override_validation: bool) -> TokenResult<DeploymentOutcome> {
        self.deploy_with(
            token_id,
            DeployRequest {
                override_validation,
                ..DeployRequest::default()
            },
        )
    }

    pub fn deploy_with(&self, token_id: TokenId, request: DeployRequest) -> TokenResult<DeploymentOutcome> {
        self.orchestrator().deploy(token_id, request)
    }

    /// Poll the deployer for progress on a submitted deployment
    pub fn refresh_deployment(&self, token_id: TokenId) -> TokenResult<DeploymentRecord> {
        self.orchestrator().refresh(token_id)
    }

    /// Apply a status the deployer pushed
    pub fn record_deployment_status(
        &self,
        token_id: TokenId,
        status: DeploymentStatus,
        contract_address: Option<String>,
        error: Option<String>,
    ) -> TokenResult<DeploymentRecord> {
        self.orchestrator().record_status(
            token_id,
            DeploymentReport {
                status,
                contract_address,
                error,
            },
        )
    }

    pub fn deployment(&self, token_id: TokenId) -> TokenResult<Option<DeploymentRecord>> {
        self.loader.deployment(token_id)
    }

    /// Group loaded tokens into tiers for display
    pub fn classify_for_display<'a>(
        &self,
        tokens: &'a [TokenAggregate],
    ) -> TierClassification<'a, TokenAggregate> {
        classify(tokens)
    }

    pub fn delete_token(&self, token_id: TokenId) -> TokenResult<()> {
        self.loader.delete(token_id)?;
        info!("token {token_id} removed");
        Ok(())
    }

    pub fn status_history(&self, token_id: TokenId) -> TokenResult<Vec<StatusChange>> {
        self.loader.history(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployer::SubmitOutcome;
    use crate::mock_deployer::MockDeployer;
    use serde_json::{json, Value};
    use tokenforge_core::error::TokenError;
    use tokenforge_core::standard::TokenStandard;

    const ASSET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
    const RECIPIENT: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

    fn form(value: Value) -> FormData {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn engine() -> (Arc<MockDeployer>, TokenEngine) {
        let deployer = Arc::new(MockDeployer::new());
        let engine = TokenEngine::in_memory(deployer.clone(), EngineConfig::for_testing());
        (deployer, engine)
    }

    fn vault_form() -> FormData {
        form(json!({
            "standard": "ERC-4626",
            "name": "Yield Vault",
            "symbol": "YV",
            "assetAddress": ASSET,
            "managementFee": "2",
            "uiTheme": "dark",
        }))
    }

    fn mint(engine: &TokenEngine, token_id: TokenId) {
        for (from, to) in [
            (TokenStatus::Draft, TokenStatus::Review),
            (TokenStatus::Review, TokenStatus::Approved),
            (TokenStatus::Approved, TokenStatus::ReadyToMint),
            (TokenStatus::ReadyToMint, TokenStatus::Minted),
        ] {
            engine.request_transition(token_id, from, to, Some("ops")).unwrap();
        }
    }

    #[test]
    fn test_create_token_maps_the_form() {
        let (_, engine) = engine();
        let created = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        assert_eq!(created.status(), TokenStatus::Draft);
        assert_eq!(created.standard(), TokenStandard::Erc4626);
        assert_eq!(created.token.blocks.get("uiTheme"), Some(&json!("dark")));

        let form = engine.load_form(created.id()).unwrap();
        assert_eq!(form["managementFee"], json!("2"));
        assert_eq!(form["status"], json!("DRAFT"));
    }

    #[test]
    fn test_create_token_requires_a_known_standard() {
        let (_, engine) = engine();
        let mut form = vault_form();
        form.insert("standard".into(), json!("ERC-9999"));
        assert!(matches!(
            engine.create_token(ProjectId::new(), &form),
            Err(TokenError::UnknownStandard(_))
        ));
    }

    #[test]
    fn test_partial_save_keeps_other_fields() {
        let (_, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        let saved = engine
            .save_form(token.id(), &form(json!({ "feeRecipient": RECIPIENT, "status": "DEPLOYED" })))
            .unwrap();
        assert_eq!(saved.status(), TokenStatus::Draft);

        let form = engine.load_form(token.id()).unwrap();
        assert_eq!(form["feeRecipient"], json!(RECIPIENT));
        assert_eq!(form["managementFee"], json!("2"));
        assert_eq!(form["uiTheme"], json!("dark"));
    }

    #[test]
    fn test_invalid_save_writes_nothing() {
        let (_, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        let err = engine
            .save_form(
                token.id(),
                &form(json!({ "name": "Renamed", "depositFee": "101" })),
            )
            .unwrap_err();
        assert!(matches!(err, TokenError::ValidationFailed { .. }));
        assert_eq!(engine.load_aggregate(token.id()).unwrap().token.name, "Yield Vault");
    }

    #[test]
    fn test_override_is_refused_when_not_allowed() {
        let (deployer, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        mint(&engine, token.id());

        assert!(matches!(
            engine.deploy(token.id(), true),
            Err(TokenError::DeploymentBlocked { .. })
        ));
        assert!(deployer.submitted().is_empty());
        assert!(engine.deployment(token.id()).unwrap().is_none());
    }

    #[test]
    fn test_override_deploys_and_is_recorded() {
        let deployer = Arc::new(MockDeployer::new());
        let engine = TokenEngine::in_memory(deployer.clone(), EngineConfig::default());
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        mint(&engine, token.id());

        let outcome = engine.deploy(token.id(), true).unwrap();
        assert!(outcome.report.has_issues);
        assert!(outcome.record.validation_overridden);
        assert_eq!(deployer.submitted().len(), 1);
    }

    #[test]
    fn test_deployer_rejection_keeps_token_minted() {
        let (deployer, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        engine
            .save_form(token.id(), &form(json!({ "feeRecipient": RECIPIENT })))
            .unwrap();
        mint(&engine, token.id());
        deployer.push_submit(SubmitOutcome::failed("insufficient gas"));

        assert!(matches!(
            engine.deploy(token.id(), false),
            Err(TokenError::DeployerFailure(reason)) if reason == "insufficient gas"
        ));
        let record = engine.deployment(token.id()).unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(engine.load_aggregate(token.id()).unwrap().status(), TokenStatus::Minted);

        // A failed attempt can be retried and reuses the record
        let retried = engine.deploy(token.id(), false).unwrap();
        assert_eq!(retried.record.id, record.id);
    }

    #[test]
    fn test_status_follows_only_terminal_success() {
        let (deployer, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        engine
            .save_form(token.id(), &form(json!({ "feeRecipient": RECIPIENT })))
            .unwrap();
        mint(&engine, token.id());
        engine.deploy(token.id(), false).unwrap();

        deployer.push_poll(Ok(DeploymentReport::status(DeploymentStatus::Deploying)));
        engine.refresh_deployment(token.id()).unwrap();
        assert_eq!(engine.load_aggregate(token.id()).unwrap().status(), TokenStatus::Minted);

        deployer.push_poll(Err("rpc timeout".into()));
        assert!(matches!(
            engine.refresh_deployment(token.id()),
            Err(TokenError::DeployerFailure(_))
        ));
        assert_eq!(engine.load_aggregate(token.id()).unwrap().status(), TokenStatus::Minted);

        let record = engine.refresh_deployment(token.id()).unwrap();
        assert_eq!(record.status, DeploymentStatus::Success);
        let deployed = engine.load_aggregate(token.id()).unwrap();
        assert_eq!(deployed.status(), TokenStatus::Deployed);
        assert_eq!(deployed.token.deployed_address(), record.contract_address.as_deref());

        // Verification reports after deployment leave the lifecycle alone
        engine
            .record_deployment_status(token.id(), DeploymentStatus::Verified, None, None)
            .unwrap();
        assert_eq!(engine.load_aggregate(token.id()).unwrap().status(), TokenStatus::Deployed);
    }

    #[test]
    fn test_pushed_success_needs_an_address() {
        let (_, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        engine
            .save_form(token.id(), &form(json!({ "feeRecipient": RECIPIENT })))
            .unwrap();
        mint(&engine, token.id());
        engine.deploy(token.id(), false).unwrap();

        assert!(matches!(
            engine.record_deployment_status(token.id(), DeploymentStatus::Success, None, None),
            Err(TokenError::DeployerFailure(_))
        ));
        engine
            .record_deployment_status(
                token.id(),
                DeploymentStatus::Success,
                Some(RECIPIENT.to_string()),
                None,
            )
            .unwrap();
        let token = engine.load_aggregate(token.id()).unwrap();
        assert_eq!(token.status(), TokenStatus::Deployed);
        assert_eq!(token.token.metadata["chain"], json!("ethereum"));
    }

    #[test]
    fn test_deploy_requires_minted() {
        let (_, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        assert!(matches!(
            engine.deploy(token.id(), false),
            Err(TokenError::ValidationNotApplicable {
                status: TokenStatus::Draft
            })
        ));
        assert!(matches!(
            engine.refresh_deployment(token.id()),
            Err(TokenError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_and_history() {
        let (_, engine) = engine();
        let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
        mint(&engine, token.id());
        let history = engine.status_history(token.id()).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3].to_status, TokenStatus::Minted);

        engine.delete_token(token.id()).unwrap();
        assert!(matches!(
            engine.load_aggregate(token.id()),
            Err(TokenError::NotFound(_))
        ));
        assert!(engine.status_history(token.id()).unwrap().is_empty());
    }
}
