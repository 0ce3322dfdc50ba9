//! Token aggregate loader
//!
//! Assembles a token's core row, its one extension row and its sub-resource
//! rows into a [`TokenAggregate`], and writes aggregates back. The store
//! offers no multi-table transactions, so every write path validates
//! everything it can before the first write, and each load is only a
//! point-in-time snapshot.

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

use tokenforge_core::aggregate::TokenAggregate;
use tokenforge_core::deployment::DeploymentRecord;
use tokenforge_core::error::{FieldIssue, TokenError, TokenResult};
use tokenforge_core::extensions::TokenExtension;
use tokenforge_core::id::{new_row_id, ProjectId, TokenId};
use tokenforge_core::lifecycle::{PlannedTransition, StatusChange, TransitionOrigin, INITIAL_STATUS};
use tokenforge_core::objects::TokenRecord;
use tokenforge_core::standard::TokenStandard;
use tokenforge_core::status::TokenStatus;
use tokenforge_core::subresources::{SubResourceCollections, SubResourceKind, SubResourceRows};

use crate::storage_traits::{ConditionalUpdate, Filter, Record, RecordStore, Table};

/// Core columns a form save may change
const EDITABLE_CORE_COLUMNS: &[&str] = &[
    "name",
    "symbol",
    "decimals",
    "description",
    "config_mode",
    "metadata",
    "blocks",
    "parent_token_id",
    "tier",
];

/// A status change as requested by a caller or the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub token_id: TokenId,
    /// Status the requester last saw
    pub observed: TokenStatus,
    pub target: TokenStatus,
    pub origin: TransitionOrigin,
    pub actor: Option<String>,
    /// Metadata keys written together with the new status
    pub metadata_patch: Map<String, Value>,
}

impl TransitionRequest {
    /// A request from an ordinary caller
    pub fn caller(token_id: TokenId, observed: TokenStatus, target: TokenStatus) -> Self {
        Self {
            token_id,
            observed,
            target,
            origin: TransitionOrigin::Caller,
            actor: None,
            metadata_patch: Map::new(),
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

fn token_filter(token_id: TokenId) -> Filter {
    Filter::eq("token_id", token_id.to_string())
}

fn to_record<T: serde::Serialize>(value: &T) -> TokenResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(TokenError::Integrity(format!("expected a row, got {other}"))),
    }
}

fn child_row(mut row: Record, token_id: TokenId) -> Record {
    row.insert("id".to_string(), Value::String(new_row_id()));
    row.insert("token_id".to_string(), Value::String(token_id.to_string()));
    row
}

/// Loads and stores token aggregates through a [`RecordStore`]
#[derive(Clone)]
pub struct AggregateLoader {
    store: Arc<dyn RecordStore>,
}

impl AggregateLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Read a core row, returning the parsed record and the raw row
    fn read_token(&self, token_id: TokenId) -> TokenResult<(TokenRecord, Record)> {
        let row = self
            .store
            .get(Table::Tokens, &token_id.to_string())?
            .ok_or_else(|| TokenError::NotFound(format!("token {token_id}")))?;
        Ok((TokenRecord::from_row(row.clone())?, row))
    }

    /// Load only the core record
    pub fn load_token(&self, token_id: TokenId) -> TokenResult<TokenRecord> {
        let (mut token, _) = self.read_token(token_id)?;
        token.promote_legacy_references();
        Ok(token)
    }

    pub fn exists(&self, token_id: TokenId) -> TokenResult<bool> {
        Ok(self.store.get(Table::Tokens, &token_id.to_string())?.is_some())
    }

    fn extension_rows(&self, token_id: TokenId, standard: TokenStandard) -> TokenResult<Vec<Record>> {
        Ok(self
            .store
            .list(Table::Extension(standard), &token_filter(token_id))?)
    }

    fn load_extension(&self, token: &TokenRecord) -> TokenResult<TokenExtension> {
        let mut rows = self.extension_rows(token.id, token.standard)?;
        match rows.len() {
            1 => Ok(TokenExtension::from_row(token.standard, rows.remove(0))?),
            0 => Err(TokenError::Integrity(format!(
                "token {} has no {} record",
                token.id,
                token.standard.extension_table()
            ))),
            n => Err(TokenError::Integrity(format!(
                "token {} has {n} {} records",
                token.id,
                token.standard.extension_table()
            ))),
        }
    }

    fn load_sub_resources(&self, token: &TokenRecord) -> TokenResult<SubResourceCollections> {
        let mut rows = SubResourceRows::new();
        for kind in SubResourceKind::for_standard(token.standard) {
            let mut items = self
                .store
                .list(Table::SubResource(kind), &token_filter(token.id))?;
            items.sort_by_key(|row| row.get("position").and_then(Value::as_u64).unwrap_or(u64::MAX));
            rows.insert(kind, items);
        }
        Ok(SubResourceCollections::from_rows(token.standard, rows)?)
    }

    /// Current deployment record of a token, if one was ever attempted
    pub fn deployment(&self, token_id: TokenId) -> TokenResult<Option<DeploymentRecord>> {
        let mut rows = self.store.list(Table::Deployments, &token_filter(token_id))?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(serde_json::from_value(Value::Object(rows.remove(0)))?)),
            n => Err(TokenError::Integrity(format!(
                "token {token_id} has {n} deployment records"
            ))),
        }
    }

    /// Load a full aggregate
    pub fn load(&self, token_id: TokenId) -> TokenResult<TokenAggregate> {
        let token = self.load_token(token_id)?;
        let extension = self.load_extension(&token)?;
        let sub_resources = self.load_sub_resources(&token)?;
        let deployment = self.deployment(token_id)?;
        debug!(
            "loaded {} token {token_id} with {} sub-resource row(s)",
            token.standard,
            sub_resources.len()
        );
        TokenAggregate::new(token, extension, sub_resources, deployment)
    }

    /// Load every token, optionally limited to one project
    pub fn load_all(&self, project: Option<ProjectId>) -> TokenResult<Vec<TokenAggregate>> {
        let filter = match project {
            Some(project) => Filter::eq("project_id", project.to_string()),
            None => Filter::all(),
        };
        let mut aggregates = Vec::new();
        for row in self.store.list(Table::Tokens, &filter)? {
            let id = row
                .get("id")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<TokenId>().ok())
                .ok_or_else(|| TokenError::Integrity("token row without a valid id".to_string()))?;
            aggregates.push(self.load(id)?);
        }
        Ok(aggregates)
    }

    /// The explicit parent must not be the token itself, and a newly set
    /// parent must exist. `kept` is the parent already on record, which may
    /// be a promoted legacy reference to a token that is gone.
    fn check_parent(&self, token: &TokenRecord, kept: Option<TokenId>) -> TokenResult<()> {
        let Some(parent) = token.parent_token_id else {
            return Ok(());
        };
        if parent == token.id {
            return Err(TokenError::from_issues(vec![FieldIssue::invalid(
                "parentTokenId",
                "a token cannot be its own parent",
            )]));
        }
        if kept != Some(parent) && !self.exists(parent)? {
            return Err(TokenError::from_issues(vec![FieldIssue::invalid(
                "parentTokenId",
                format!("parent token {parent} does not exist"),
            )]));
        }
        Ok(())
    }

    fn check_tags(aggregate: &TokenAggregate) -> TokenResult<()> {
        let standard = aggregate.token.standard;
        if aggregate.extension.standard() != standard
            || aggregate.sub_resources.standard() != standard
        {
            return Err(TokenError::Integrity(format!(
                "token {} parts do not all belong to {standard}",
                aggregate.token.id
            )));
        }
        Ok(())
    }

    fn write_sub_resources(&self, token_id: TokenId, rows: SubResourceRows) -> TokenResult<()> {
        for (kind, items) in rows {
            let table = Table::SubResource(kind);
            self.store.delete_where(table, &token_filter(token_id))?;
            for (position, row) in items.into_iter().enumerate() {
                let mut row = child_row(row, token_id);
                row.insert("position".to_string(), Value::from(position as u64));
                self.store.insert(table, row)?;
            }
        }
        Ok(())
    }

    /// Persist a new token with its extension and collections.
    ///
    /// Children are written first and the core row last, so a failed create
    /// leaves no token visible.
    pub fn create(&self, aggregate: &TokenAggregate) -> TokenResult<()> {
        let token = &aggregate.token;
        Self::check_tags(aggregate)?;
        if token.status != INITIAL_STATUS || token.transition_count != 0 {
            return Err(TokenError::Integrity(format!(
                "new token {} must start in {INITIAL_STATUS}",
                token.id
            )));
        }
        if self.exists(token.id)? {
            return Err(TokenError::Integrity(format!("token {} already exists", token.id)));
        }
        self.check_parent(token, None)?;

        let extension_row = child_row(aggregate.extension.to_row()?, token.id);
        let sub_rows = aggregate.sub_resources.to_rows()?;
        let core_row = token.to_row()?;

        self.store
            .insert(Table::Extension(token.standard), extension_row)?;
        self.write_sub_resources(token.id, sub_rows)?;
        self.store.insert(Table::Tokens, core_row)?;

        info!("created {} token {} ({})", token.standard, token.id, token.symbol);
        Ok(())
    }

    /// Write edited fields, extension and collections of an existing token.
    ///
    /// Status, transition counter, standard and identity are never written
    /// here; collections are replaced as a whole.
    pub fn save(&self, aggregate: &TokenAggregate) -> TokenResult<TokenAggregate> {
        let token = &aggregate.token;
        Self::check_tags(aggregate)?;
        let (mut stored, _) = self.read_token(token.id)?;
        if stored.standard != token.standard {
            return Err(TokenError::Integrity(format!(
                "token {} is {}; the standard cannot change to {}",
                token.id, stored.standard, token.standard
            )));
        }
        stored.promote_legacy_references();
        self.check_parent(token, stored.parent_token_id)?;

        let existing = self.extension_rows(token.id, token.standard)?;
        if existing.len() > 1 {
            return Err(TokenError::Integrity(format!(
                "token {} has {} extension records",
                token.id,
                existing.len()
            )));
        }
        let extension_row = aggregate.extension.to_row()?;
        let sub_rows = aggregate.sub_resources.to_rows()?;
        let full_row = token.to_row()?;
        let mut core_fields: Record = EDITABLE_CORE_COLUMNS
            .iter()
            .filter_map(|column| {
                full_row
                    .get(*column)
                    .map(|value| (column.to_string(), value.clone()))
            })
            .collect();
        core_fields.insert("updated_at".to_string(), serde_json::to_value(Utc::now())?);

        let table = Table::Extension(token.standard);
        match existing.first().and_then(|row| row.get("id")).and_then(Value::as_str) {
            Some(row_id) => {
                self.store.update(table, row_id, extension_row)?;
            }
            None => {
                self.store.insert(table, child_row(extension_row, token.id))?;
            }
        }
        self.write_sub_resources(token.id, sub_rows)?;
        self.store
            .update(Table::Tokens, &token.id.to_string(), core_fields)?;

        debug!("saved {} token {}", token.standard, token.id);
        self.load(token.id)
    }

    /// Delete a token and everything that hangs off it.
    ///
    /// Order is sub-resources, extension, deployment and history, then the
    /// core row. The first failure aborts; rows already deleted stay deleted
    /// and the core row survives so the delete can be re-issued.
    pub fn delete(&self, token_id: TokenId) -> TokenResult<()> {
        let token = self.load_token(token_id)?;
        let filter = token_filter(token_id);

        let mut removed = 0;
        for kind in SubResourceKind::for_standard(token.standard) {
            removed += self.store.delete_where(Table::SubResource(kind), &filter)?;
        }
        removed += self
            .store
            .delete_where(Table::Extension(token.standard), &filter)?;
        removed += self.store.delete_where(Table::Deployments, &filter)?;
        removed += self.store.delete_where(Table::StatusHistory, &filter)?;
        self.store.delete(Table::Tokens, &token_id.to_string())?;

        info!("deleted token {token_id} and {removed} dependent row(s)");
        Ok(())
    }

    /// Apply a status transition with an optimistic check.
    ///
    /// Fails with `ConcurrentModification` if the stored status differs from
    /// the one the requester observed, either before or during the write.
    pub fn transition(&self, request: TransitionRequest) -> TokenResult<TokenRecord> {
        let token_id = request.token_id;
        let (token, raw) = self.read_token(token_id)?;
        let raw_status = raw.get("status").cloned().unwrap_or(Value::Null);
        let status_text = |value: &Value| value.as_str().unwrap_or_default().to_string();

        if token.status != request.observed {
            warn!(
                "rejected {} -> {} on token {token_id}: status is now {}",
                request.observed, request.target, token.status
            );
            return Err(TokenError::ConcurrentModification {
                token_id,
                expected: request.observed,
                actual: status_text(&raw_status),
            });
        }

        let planned = PlannedTransition::plan(
            token_id,
            token.status,
            request.target,
            token.transition_count,
            request.origin,
            request.actor,
        )?;

        let mut fields = Record::new();
        fields.insert("status".into(), Value::from(planned.to_status().as_str()));
        fields.insert("transition_count".into(), Value::from(planned.change.sequence));
        fields.insert("updated_at".into(), serde_json::to_value(planned.change.changed_at)?);
        if !request.metadata_patch.is_empty() {
            let mut metadata = token.metadata.clone();
            metadata.extend(request.metadata_patch);
            fields.insert("metadata".into(), Value::Object(metadata));
        }

        let expected = Filter::eq("status", raw_status).and(
            "transition_count",
            raw.get("transition_count").cloned().unwrap_or(Value::Null),
        );
        let row = match self
            .store
            .update_if(Table::Tokens, &token_id.to_string(), &expected, fields)?
        {
            ConditionalUpdate::Applied(row) => row,
            ConditionalUpdate::Rejected(current) => {
                let actual = current.get("status").map(status_text).unwrap_or_default();
                warn!(
                    "lost race on token {token_id}: {} -> {} while status became {actual}",
                    planned.from_status(),
                    planned.to_status()
                );
                return Err(TokenError::ConcurrentModification {
                    token_id,
                    expected: request.observed,
                    actual,
                });
            }
        };

        // The status is committed; a failed history write is only logged
        let mut history = to_record(&planned.change)?;
        history.insert("id".into(), Value::String(new_row_id()));
        if let Err(err) = self.store.insert(Table::StatusHistory, history) {
            warn!(
                "token {token_id}: {} -> {} applied without a history entry: {err}",
                planned.from_status(),
                planned.to_status()
            );
        }

        info!(
            "token {token_id}: {} -> {} (transition #{})",
            planned.from_status(),
            planned.to_status(),
            planned.change.sequence
        );
        TokenRecord::from_row(row)
    }

    /// Insert or replace the deployment record of a token
    pub fn save_deployment(&self, record: &DeploymentRecord) -> TokenResult<()> {
        let row = to_record(record)?;
        if self.store.get(Table::Deployments, &record.id)?.is_some() {
            self.store.update(Table::Deployments, &record.id, row)?;
        } else {
            if self.deployment(record.token_id)?.is_some() {
                return Err(TokenError::Integrity(format!(
                    "token {} already has a deployment record",
                    record.token_id
                )));
            }
            self.store.insert(Table::Deployments, row)?;
        }
        Ok(())
    }

    /// Status history of a token, oldest first
    pub fn history(&self, token_id: TokenId) -> TokenResult<Vec<StatusChange>> {
        let mut changes = self
            .store
            .list(Table::StatusHistory, &token_filter(token_id))?
            .into_iter()
            .map(|row| serde_json::from_value::<StatusChange>(Value::Object(row)))
            .collect::<Result<Vec<_>, _>>()?;
        changes.sort_by_key(|change| change.sequence);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecordStore;
    use serde_json::json;
    use std::sync::Barrier;
    use std::thread;
    use tokenforge_core::deployment::{DeploymentStatus, NetworkEnvironment};
    use tokenforge_core::error::StorageError;
    use tokenforge_core::extensions::Erc4626Properties;
    use tokenforge_core::subresources::Erc4626AssetAllocation;

    const ASSET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

    fn setup() -> (Arc<MemoryRecordStore>, AggregateLoader) {
        let store = Arc::new(MemoryRecordStore::new());
        let loader = AggregateLoader::new(store.clone());
        (store, loader)
    }

    fn vault() -> TokenAggregate {
        let token = TokenRecord::new(ProjectId::new(), "Yield Vault", "YV", TokenStandard::Erc4626);
        TokenAggregate::new(
            token,
            TokenExtension::Erc4626(Erc4626Properties {
                asset_address: Some(ASSET.to_string()),
                ..Erc4626Properties::default()
            }),
            SubResourceCollections::Erc4626 {
                strategy_params: Vec::new(),
                asset_allocations: vec![
                    Erc4626AssetAllocation {
                        asset: "USDC".into(),
                        percentage: 70.0,
                        ..Default::default()
                    },
                    Erc4626AssetAllocation {
                        asset: "DAI".into(),
                        percentage: 30.0,
                        ..Default::default()
                    },
                ],
            },
            None,
        )
        .unwrap()
    }

    fn allocation_assets(aggregate: &TokenAggregate) -> Vec<String> {
        match &aggregate.sub_resources {
            SubResourceCollections::Erc4626 {
                asset_allocations, ..
            } => asset_allocations.iter().map(|a| a.asset.clone()).collect(),
            other => panic!("unexpected collections {other:?}"),
        }
    }

    #[test]
    fn test_create_then_load_round_trips() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();

        let loaded = loader.load(aggregate.id()).unwrap();
        assert_eq!(loaded.token, aggregate.token);
        assert_eq!(loaded.extension, aggregate.extension);
        assert_eq!(allocation_assets(&loaded), vec!["USDC", "DAI"]);
        assert!(loaded.deployment.is_none());
    }

    #[test]
    fn test_create_refuses_non_draft_tokens() {
        let (_, loader) = setup();
        let mut aggregate = vault();
        aggregate.token.status = TokenStatus::Minted;
        assert!(matches!(loader.create(&aggregate), Err(TokenError::Integrity(_))));
    }

    #[test]
    fn test_missing_token_is_not_found() {
        let (_, loader) = setup();
        assert!(matches!(loader.load(TokenId::new()), Err(TokenError::NotFound(_))));
    }

    #[test]
    fn test_save_replaces_collections_but_never_status() {
        let (_, loader) = setup();
        let mut aggregate = vault();
        loader.create(&aggregate).unwrap();

        aggregate.token.name = "Renamed".into();
        aggregate.token.status = TokenStatus::Deployed;
        aggregate.sub_resources = SubResourceCollections::Erc4626 {
            strategy_params: Vec::new(),
            asset_allocations: vec![Erc4626AssetAllocation {
                asset: "WETH".into(),
                percentage: 100.0,
                ..Default::default()
            }],
        };
        let saved = loader.save(&aggregate).unwrap();
        assert_eq!(saved.token.name, "Renamed");
        assert_eq!(saved.status(), TokenStatus::Draft);
        assert_eq!(allocation_assets(&saved), vec!["WETH"]);
    }

    #[test]
    fn test_save_rejects_a_standard_change() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();

        let mut changed = TokenAggregate::fresh(aggregate.token.clone());
        changed.token.standard = TokenStandard::Erc20;
        changed.extension = TokenExtension::default_for(TokenStandard::Erc20);
        changed.sub_resources = SubResourceCollections::empty(TokenStandard::Erc20);
        assert!(matches!(loader.save(&changed), Err(TokenError::Integrity(_))));
    }

    #[test]
    fn test_parent_must_exist_and_differ() {
        let (_, loader) = setup();
        let mut aggregate = vault();
        aggregate.token.parent_token_id = Some(TokenId::new());
        assert!(matches!(
            loader.create(&aggregate),
            Err(TokenError::ValidationFailed { .. })
        ));

        aggregate.token.parent_token_id = Some(aggregate.id());
        assert!(matches!(
            loader.create(&aggregate),
            Err(TokenError::ValidationFailed { .. })
        ));

        let parent = vault();
        loader.create(&parent).unwrap();
        aggregate.token.parent_token_id = Some(parent.id());
        loader.create(&aggregate).unwrap();
    }

    #[test]
    fn test_denormalized_status_is_read_canonically() {
        let (store, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let mut fields = Record::new();
        fields.insert("status".into(), json!("Ready To Mint"));
        store
            .update(Table::Tokens, &aggregate.id().to_string(), fields)
            .unwrap();
        assert_eq!(loader.load(aggregate.id()).unwrap().status(), TokenStatus::ReadyToMint);

        let mut fields = Record::new();
        fields.insert("status".into(), json!("archived"));
        store
            .update(Table::Tokens, &aggregate.id().to_string(), fields)
            .unwrap();
        assert!(matches!(
            loader.load(aggregate.id()),
            Err(TokenError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_duplicate_extension_rows_are_an_integrity_error() {
        let (store, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let extra = child_row(aggregate.extension.to_row().unwrap(), aggregate.id());
        store
            .insert(Table::Extension(TokenStandard::Erc4626), extra)
            .unwrap();
        assert!(matches!(loader.load(aggregate.id()), Err(TokenError::Integrity(_))));
    }

    #[test]
    fn test_legacy_parent_metadata_is_promoted_on_load() {
        let (store, loader) = setup();
        let parent = vault();
        loader.create(&parent).unwrap();
        let child = vault();
        loader.create(&child).unwrap();

        let mut fields = Record::new();
        fields.insert("metadata".into(), json!({ "parentId": parent.id().to_string() }));
        store
            .update(Table::Tokens, &child.id().to_string(), fields)
            .unwrap();
        let loaded = loader.load(child.id()).unwrap();
        assert_eq!(loaded.token.parent_token_id, Some(parent.id()));
    }

    #[test]
    fn test_dangling_legacy_parent_does_not_block_saves() {
        let (_, loader) = setup();
        let mut orphan = vault();
        let missing = TokenId::new();
        orphan
            .token
            .metadata
            .insert("parentId".into(), json!(missing.to_string()));
        loader.create(&orphan).unwrap();

        let mut loaded = loader.load(orphan.id()).unwrap();
        assert_eq!(loaded.token.parent_token_id, Some(missing));
        loaded.token.name = "Renamed".into();
        let saved = loader.save(&loaded).unwrap();
        assert_eq!(saved.token.name, "Renamed");
        assert_eq!(saved.token.parent_token_id, Some(missing));

        let mut moved = saved;
        moved.token.parent_token_id = Some(TokenId::new());
        assert!(matches!(
            loader.save(&moved),
            Err(TokenError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_delete_cascades_through_every_table() {
        let (store, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        loader
            .transition(TransitionRequest::caller(
                aggregate.id(),
                TokenStatus::Draft,
                TokenStatus::Review,
            ))
            .unwrap();

        loader.delete(aggregate.id()).unwrap();
        for table in [
            Table::Tokens,
            Table::Extension(TokenStandard::Erc4626),
            Table::SubResource(SubResourceKind::Erc4626AssetAllocations),
            Table::StatusHistory,
        ] {
            assert_eq!(store.count(table).unwrap(), 0, "{table} not emptied");
        }
    }

    /// Fails every delete on one table
    /// Memory store whose deletes or inserts fail on one table
    struct FailingStore {
        inner: MemoryRecordStore,
        deletes_fail_on: Option<Table>,
        inserts_fail_on: Option<Table>,
    }

    impl RecordStore for FailingStore {
        fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StorageError> {
            self.inner.get(table, id)
        }
        fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Record>, StorageError> {
            self.inner.list(table, filter)
        }
        fn insert(&self, table: Table, record: Record) -> Result<(), StorageError> {
            if self.inserts_fail_on == Some(table) {
                return Err(StorageError::Database("disk full".into()));
            }
            self.inner.insert(table, record)
        }
        fn update(&self, table: Table, id: &str, fields: Record) -> Result<Record, StorageError> {
            self.inner.update(table, id, fields)
        }
        fn update_if(
            &self,
            table: Table,
            id: &str,
            expected: &Filter,
            fields: Record,
        ) -> Result<ConditionalUpdate, StorageError> {
            self.inner.update_if(table, id, expected, fields)
        }
        fn delete(&self, table: Table, id: &str) -> Result<bool, StorageError> {
            if self.deletes_fail_on == Some(table) {
                return Err(StorageError::Database("disk on fire".into()));
            }
            self.inner.delete(table, id)
        }
    }

    #[test]
    fn test_failed_cascade_keeps_the_core_row() {
        let store = Arc::new(FailingStore {
            inner: MemoryRecordStore::new(),
            deletes_fail_on: Some(Table::Extension(TokenStandard::Erc4626)),
            inserts_fail_on: None,
        });
        let loader = AggregateLoader::new(store.clone());
        let aggregate = vault();
        loader.create(&aggregate).unwrap();

        assert!(matches!(
            loader.delete(aggregate.id()),
            Err(TokenError::Storage(StorageError::Database(_)))
        ));
        // Children before the failing table are gone, the core row is not
        assert_eq!(
            store
                .inner
                .count(Table::SubResource(SubResourceKind::Erc4626AssetAllocations))
                .unwrap(),
            0
        );
        assert!(loader.exists(aggregate.id()).unwrap());
    }

    #[test]
    fn test_lost_history_row_does_not_fail_an_applied_transition() {
        let store = Arc::new(FailingStore {
            inner: MemoryRecordStore::new(),
            deletes_fail_on: None,
            inserts_fail_on: Some(Table::StatusHistory),
        });
        let loader = AggregateLoader::new(store.clone());
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let id = aggregate.id();

        let token = loader
            .transition(TransitionRequest::caller(id, TokenStatus::Draft, TokenStatus::Review))
            .unwrap();
        assert_eq!(token.status, TokenStatus::Review);
        assert_eq!(loader.load_token(id).unwrap().transition_count, 1);
        assert!(loader.history(id).unwrap().is_empty());
    }

    #[test]
    fn test_transition_counts_and_records_history() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let id = aggregate.id();

        let token = loader
            .transition(TransitionRequest::caller(id, TokenStatus::Draft, TokenStatus::Review).by("alice"))
            .unwrap();
        assert_eq!(token.status, TokenStatus::Review);
        assert_eq!(token.transition_count, 1);
        loader
            .transition(TransitionRequest::caller(id, TokenStatus::Review, TokenStatus::Approved))
            .unwrap();

        let history = loader.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].actor.as_deref(), Some("alice"));
        assert_eq!(history[1].to_status, TokenStatus::Approved);
        assert_eq!(history[1].sequence, 2);
    }

    #[test]
    fn test_invalid_transition_leaves_status_untouched() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let err = loader
            .transition(TransitionRequest::caller(
                aggregate.id(),
                TokenStatus::Draft,
                TokenStatus::Minted,
            ))
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidTransition { .. }));
        let token = loader.load_token(aggregate.id()).unwrap();
        assert_eq!(token.status, TokenStatus::Draft);
        assert_eq!(token.transition_count, 0);
        assert!(loader.history(aggregate.id()).unwrap().is_empty());
    }

    #[test]
    fn test_stale_observation_is_a_concurrent_modification() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let request =
            TransitionRequest::caller(aggregate.id(), TokenStatus::Draft, TokenStatus::Review);
        loader.transition(request.clone()).unwrap();
        match loader.transition(request).unwrap_err() {
            TokenError::ConcurrentModification { expected, actual, .. } => {
                assert_eq!(expected, TokenStatus::Draft);
                assert_eq!(actual, "REVIEW");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_racing_duplicate_transitions_apply_once() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let loader = loader.clone();
                let barrier = Arc::clone(&barrier);
                let id = aggregate.id();
                thread::spawn(move || {
                    barrier.wait();
                    loader.transition(TransitionRequest::caller(
                        id,
                        TokenStatus::Draft,
                        TokenStatus::Review,
                    ))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(TokenError::ConcurrentModification { .. }))));
        assert_eq!(loader.load_token(aggregate.id()).unwrap().transition_count, 1);
    }

    #[test]
    fn test_deploy_edge_is_refused_to_callers() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let id = aggregate.id();
        for (from, to) in [
            (TokenStatus::Draft, TokenStatus::Review),
            (TokenStatus::Review, TokenStatus::Approved),
            (TokenStatus::Approved, TokenStatus::ReadyToMint),
            (TokenStatus::ReadyToMint, TokenStatus::Minted),
        ] {
            loader.transition(TransitionRequest::caller(id, from, to)).unwrap();
        }
        assert!(matches!(
            loader.transition(TransitionRequest::caller(
                id,
                TokenStatus::Minted,
                TokenStatus::Deployed
            )),
            Err(TokenError::TransitionReserved { .. })
        ));

        let mut request = TransitionRequest::caller(id, TokenStatus::Minted, TokenStatus::Deployed);
        request.origin = TransitionOrigin::Orchestrator;
        request.metadata_patch.insert("contractAddress".into(), json!(ASSET));
        let token = loader.transition(request).unwrap();
        assert_eq!(token.status, TokenStatus::Deployed);
        assert_eq!(token.deployed_address(), Some(ASSET));
    }

    #[test]
    fn test_deployment_record_is_upserted() {
        let (_, loader) = setup();
        let aggregate = vault();
        loader.create(&aggregate).unwrap();
        let mut record = DeploymentRecord {
            id: new_row_id(),
            token_id: aggregate.id(),
            network: "ethereum".into(),
            environment: NetworkEnvironment::Testnet,
            contract_address: None,
            transaction_hash: Some("0xabc".into()),
            status: DeploymentStatus::Deploying,
            error: None,
            config_fingerprint: "ff".into(),
            validation_overridden: false,
            deployed_at: None,
            updated_at: Utc::now(),
        };
        loader.save_deployment(&record).unwrap();
        record.apply_status(DeploymentStatus::Success, None);
        loader.save_deployment(&record).unwrap();

        let stored = loader.deployment(aggregate.id()).unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Success);
        assert!(stored.deployed_at.is_some());

        let mut other = record.clone();
        other.id = new_row_id();
        assert!(matches!(
            loader.save_deployment(&other),
            Err(TokenError::Integrity(_))
        ));
        assert_eq!(
            loader.load(aggregate.id()).unwrap().deployment.map(|d| d.id),
            Some(record.id)
        );
    }
}
