use serde_json::{json, Value};
use std::sync::{Arc, Barrier};
use std::thread;

use tokenforge::{
    DeploymentStatus, EngineConfig, FormData, MockDeployer, ParentKey, ProjectId,
    SqliteRecordStore, TokenEngine, TokenError, TokenId, TokenStatus,
};

const ASSET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
const RECIPIENT: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

fn form(value: Value) -> FormData {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

fn engine() -> TokenEngine {
    TokenEngine::in_memory(Arc::new(MockDeployer::new()), EngineConfig::for_testing())
}

fn vault_form() -> FormData {
    form(json!({
        "standard": "ERC-4626",
        "name": "Treasury Yield Vault",
        "symbol": "TYV",
        "assetAddress": ASSET,
        "assetSymbol": "USDC",
        "depositFee": "0.5",
        "performanceFee": "10",
    }))
}

fn advance(engine: &TokenEngine, token_id: TokenId, path: &[TokenStatus]) {
    for pair in path.windows(2) {
        engine
            .request_transition(token_id, pair[0], pair[1], Some("issuer"))
            .unwrap();
    }
}

fn mint(engine: &TokenEngine, token_id: TokenId) {
    advance(
        engine,
        token_id,
        &[
            TokenStatus::Draft,
            TokenStatus::Review,
            TokenStatus::Approved,
            TokenStatus::ReadyToMint,
            TokenStatus::Minted,
        ],
    );
}

fn status(engine: &TokenEngine, token_id: TokenId) -> TokenStatus {
    engine.load_aggregate(token_id).unwrap().status()
}

/// Runs the full draft-to-deployed flow, including the blocked first attempt
fn deploy_vault(engine: &TokenEngine) -> TokenId {
    let token = engine.create_token(ProjectId::new(), &vault_form()).unwrap();
    let id = token.id();
    assert_eq!(token.status(), TokenStatus::Draft);
    mint(engine, id);

    match engine.deploy(id, false) {
        Err(TokenError::DeploymentBlocked { report }) => {
            assert!(report.has_issues);
            assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
            assert_eq!(report.findings[0].field, "feeRecipient");
        }
        other => panic!("expected a blocked deployment, got {other:?}"),
    }
    assert_eq!(status(engine, id), TokenStatus::Minted);

    engine
        .save_form(id, &form(json!({ "feeRecipient": RECIPIENT })))
        .unwrap();
    let outcome = engine.deploy(id, false).unwrap();
    assert!(outcome.report.is_clean());
    assert_eq!(outcome.record.status, DeploymentStatus::Deploying);
    assert_eq!(status(engine, id), TokenStatus::Minted);

    let record = engine.refresh_deployment(id).unwrap();
    assert_eq!(record.status, DeploymentStatus::Success);
    assert_eq!(status(engine, id), TokenStatus::Deployed);
    id
}

#[test]
fn test_vault_without_fee_recipient_is_blocked_then_deploys() {
    let engine = engine();
    let id = deploy_vault(&engine);

    let deployed = engine.load_aggregate(id).unwrap();
    assert!(deployed.token.deployed_address().is_some());
    assert_eq!(
        deployed.deployment.and_then(|d| d.contract_address),
        deployed.token.deployed_address().map(str::to_string)
    );
}

#[test]
fn test_scenarios_persist_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.db");
    let id = {
        let store = SqliteRecordStore::new(&path).unwrap();
        let engine = TokenEngine::new(
            Arc::new(store),
            Arc::new(MockDeployer::new()),
            EngineConfig::for_testing(),
        );
        deploy_vault(&engine)
    };

    let engine = TokenEngine::new(
        Arc::new(SqliteRecordStore::new(&path).unwrap()),
        Arc::new(MockDeployer::new()),
        EngineConfig::for_testing(),
    );
    assert_eq!(status(&engine, id), TokenStatus::Deployed);
    assert_eq!(engine.status_history(id).unwrap().len(), 5);
    assert_eq!(engine.load_form(id).unwrap()["feeRecipient"], json!(RECIPIENT));
}

#[test]
fn test_pause_resume_and_no_shortcut_to_distribution() {
    let engine = engine();
    let id = deploy_vault(&engine);

    engine
        .request_transition(id, TokenStatus::Deployed, TokenStatus::Paused, None)
        .unwrap();
    engine
        .request_transition(id, TokenStatus::Paused, TokenStatus::Deployed, None)
        .unwrap();
    engine
        .request_transition(id, TokenStatus::Deployed, TokenStatus::Paused, None)
        .unwrap();

    match engine.request_transition(id, TokenStatus::Paused, TokenStatus::Distributed, None) {
        Err(TokenError::InvalidTransition { from, to }) => {
            assert_eq!(from, TokenStatus::Paused);
            assert_eq!(to, TokenStatus::Distributed);
        }
        other => panic!("expected an invalid transition, got {other:?}"),
    }
    assert_eq!(status(&engine, id), TokenStatus::Paused);
}

#[test]
fn test_rejected_transitions_change_nothing() {
    let engine = engine();
    let id = engine.create_token(ProjectId::new(), &vault_form()).unwrap().id();
    advance(&engine, id, &[TokenStatus::Draft, TokenStatus::Review, TokenStatus::Rejected]);
    let before = engine.load_aggregate(id).unwrap().token;

    for target in [
        TokenStatus::Draft,
        TokenStatus::Review,
        TokenStatus::Approved,
        TokenStatus::Deployed,
    ] {
        assert!(matches!(
            engine.request_transition(id, TokenStatus::Rejected, target, None),
            Err(TokenError::InvalidTransition { .. })
        ));
    }
    let after = engine.load_aggregate(id).unwrap().token;
    assert_eq!(after.status, TokenStatus::Rejected);
    assert_eq!(after.transition_count, before.transition_count);
    assert_eq!(engine.status_history(id).unwrap().len(), 2);
}

#[test]
fn test_concurrent_duplicate_transitions_apply_once() {
    let engine = Arc::new(engine());
    let id = engine.create_token(ProjectId::new(), &vault_form()).unwrap().id();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.request_transition(id, TokenStatus::Draft, TokenStatus::Review, None)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(TokenError::ConcurrentModification { expected: TokenStatus::Draft, .. })
        ));
    }
    assert_eq!(engine.load_aggregate(id).unwrap().token.transition_count, 1);
}

#[test]
fn test_gate_runs_only_when_minted() {
    let engine = engine();
    let id = engine.create_token(ProjectId::new(), &vault_form()).unwrap().id();
    let path = [
        TokenStatus::Draft,
        TokenStatus::Review,
        TokenStatus::Approved,
        TokenStatus::ReadyToMint,
    ];
    for (i, current) in path.iter().enumerate() {
        if i > 0 {
            advance(&engine, id, &path[i - 1..=i]);
        }
        assert!(matches!(
            engine.validate_for_deployment(id),
            Err(TokenError::ValidationNotApplicable { status }) if status == *current
        ));
    }
    advance(&engine, id, &[TokenStatus::ReadyToMint, TokenStatus::Minted]);
    assert!(engine.validate_for_deployment(id).is_ok());
}

#[test]
fn test_allocation_totals_on_save_and_at_the_gate() {
    let engine = engine();
    let id = engine.create_token(ProjectId::new(), &vault_form()).unwrap().id();
    let allocations = |percentages: &[&str]| {
        let items: Vec<Value> = percentages
            .iter()
            .enumerate()
            .map(|(i, p)| json!({ "asset": format!("asset-{i}"), "percentage": p }))
            .collect();
        form(json!({ "assetAllocations": items, "feeRecipient": RECIPIENT }))
    };

    engine.save_form(id, &allocations(&["60", "40"])).unwrap();
    assert!(matches!(
        engine.save_form(id, &allocations(&["60", "40.01"])),
        Err(TokenError::ValidationFailed { issues }) if issues[0].field == "assetAllocations"
    ));
    engine.save_form(id, &allocations(&[])).unwrap();
    engine.save_form(id, &allocations(&["100"])).unwrap();

    mint(&engine, id);
    let report = engine.validate_for_deployment(id).unwrap();
    assert!(!report.has_issues, "{:?}", report.findings);
}

#[test]
fn test_dangling_parent_lands_in_the_unknown_bucket() {
    let engine = engine();
    let project = ProjectId::new();
    let primary = engine.create_token(project, &vault_form()).unwrap();

    let mut child = vault_form();
    child.insert("symbol".into(), json!("TYV-B"));
    child.insert("parentTokenId".into(), json!(primary.id().to_string()));
    child.insert("tier".into(), json!("secondary"));
    let child = engine.create_token(project, &child).unwrap();

    let mut orphan = vault_form();
    orphan.insert("symbol".into(), json!("TYV-X"));
    orphan.insert(
        "metadata".into(),
        json!({ "parentId": TokenId::new().to_string(), "tier": "secondary" }),
    );
    let orphan = engine.create_token(project, &orphan).unwrap();

    let tokens = engine.load_all(Some(project)).unwrap();
    let tiers = engine.classify_for_display(&tokens);
    assert_eq!(tiers.len(), 3);
    assert_eq!(tiers.primary.len(), 1);
    assert_eq!(tiers.primary[0].id(), primary.id());
    assert_eq!(
        tiers.secondary_by_parent[&ParentKey::Token(primary.id())][0].id(),
        child.id()
    );
    let unknown: Vec<_> = tiers.unknown_parent().map(|t| t.id()).collect();
    assert_eq!(unknown, vec![orphan.id()]);
}

#[test]
fn test_token_with_dangling_parent_stays_editable() {
    let engine = engine();
    let project = ProjectId::new();
    let mut orphan = vault_form();
    orphan.insert(
        "metadata".into(),
        json!({ "parentId": TokenId::new().to_string(), "tier": "secondary" }),
    );
    let orphan = engine.create_token(project, &orphan).unwrap();

    let saved = engine
        .save_form(orphan.id(), &form(json!({ "name": "Renamed Vault" })))
        .unwrap();
    assert_eq!(saved.token.name, "Renamed Vault");

    let tokens = engine.load_all(Some(project)).unwrap();
    let tiers = engine.classify_for_display(&tokens);
    let unknown: Vec<_> = tiers.unknown_parent().map(|t| t.id()).collect();
    assert_eq!(unknown, vec![orphan.id()]);
}

#[test]
fn test_explicit_parent_must_exist() {
    let engine = engine();
    let mut child = vault_form();
    child.insert("parentTokenId".into(), json!(TokenId::new().to_string()));
    assert!(matches!(
        engine.create_token(ProjectId::new(), &child),
        Err(TokenError::ValidationFailed { issues }) if issues[0].field == "parentTokenId"
    ));
}

#[test]
fn test_every_standard_survives_a_form_round_trip() {
    let engine = engine();
    let forms = [
        json!({
            "standard": "ERC-20", "name": "Stable", "symbol": "STB",
            "initialSupply": "1000000.5", "feeOnTransfer": { "enabled": true, "fee": "1.5", "recipient": RECIPIENT },
        }),
        json!({
            "standard": "ERC-721", "name": "Art", "symbol": "ART", "baseUri": "ipfs://art/",
            "tokenAttributes": [{ "traitType": "color", "values": ["red", "blue"] }],
        }),
        json!({
            "standard": "ERC-1155", "name": "Items", "symbol": "ITM",
            "tokenTypes": [{ "tokenTypeId": "1", "name": "Sword", "fungible": false }],
            "initialBalances": [{ "tokenTypeId": "1", "address": RECIPIENT, "amount": "5" }],
        }),
        json!({
            "standard": "ERC-1400", "name": "Bond", "symbol": "BND", "securityType": "debt",
            "partitions": [{ "name": "Senior", "partitionId": "SR" }],
            "controllers": [{ "address": RECIPIENT, "permissions": ["force"] }],
        }),
        json!({
            "standard": "ERC-3525", "name": "Notes", "symbol": "NTS", "valueDecimals": 6,
            "slots": [{ "slotId": "1", "slotName": "2030" }],
            "allocations": [{ "slotId": "1", "value": "250.125" }],
        }),
        json!({
            "standard": "ERC-4626", "name": "Vault", "symbol": "VLT", "assetAddress": ASSET,
            "strategyConfig": { "rebalanceThreshold": "2.5" },
            "assetAllocations": [{ "asset": "USDC", "percentage": "100" }],
        }),
    ];

    for raw in forms {
        let input = form(raw);
        let id = engine.create_token(ProjectId::new(), &input).unwrap().id();
        let stored = engine.load_form(id).unwrap();
        for (key, value) in &input {
            if key == "standard" {
                continue;
            }
            match (value, &stored[key]) {
                (Value::Object(sent), Value::Object(read)) => {
                    for (nested, v) in sent {
                        assert_eq!(&read[nested], v, "{key}.{nested}");
                    }
                }
                (Value::Array(sent), Value::Array(read)) => {
                    assert_eq!(sent.len(), read.len(), "{key}");
                    for (s, r) in sent.iter().zip(read) {
                        for (field, v) in s.as_object().unwrap() {
                            assert_eq!(&r[field], v, "{key}.{field}");
                        }
                    }
                }
                (sent, read) => assert_eq!(read, sent, "{key}"),
            }
        }

        engine.save_form(id, &stored).unwrap();
        let mut before = stored;
        let mut after = engine.load_form(id).unwrap();
        before.remove("updatedAt");
        after.remove("updatedAt");
        assert_eq!(after, before);
    }
}
