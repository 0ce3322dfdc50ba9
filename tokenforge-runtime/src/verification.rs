//! Deployment validation gate
//!
//! Re-checks a minted token aggregate before the irreversible deployment
//! step and reports every problem as a [`ValidationFinding`]. The gate reads
//! only; callers decide what to do with the report.

use serde_json::{Map, Value};
use std::collections::HashSet;

use tokenforge_core::aggregate::TokenAggregate;
use tokenforge_core::error::{FieldIssue, FieldProblem, TokenError, TokenResult};
use tokenforge_core::extensions::{Erc20Properties, Erc4626Properties, TokenExtension};
use tokenforge_core::findings::{SecurityValidationResult, Severity, ValidationFinding};
use tokenforge_core::schema::{schema_for, Requirement, StandardSchema};
use tokenforge_core::status::TokenStatus;
use tokenforge_core::subresources::{Erc4626AssetAllocation, SubResourceCollections};
use tokenforge_core::validation::{
    check_allocation_total, decimal_from_f64, is_blank, parse_decimal,
};
use tokenforge_mapping::codec::{check_stored_fields, item_path};

use crate::config::EngineConfig;

/// Largest decimal precision a deployed token may declare
const MAX_DECIMALS: u8 = 18;

/// Runs the pre-deployment checks against token aggregates
#[derive(Debug, Clone)]
pub struct DeploymentValidator {
    royalty_warning_threshold: f64,
}

impl Default for DeploymentValidator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Collects findings in the order checks run
#[derive(Default)]
struct Findings(Vec<ValidationFinding>);

impl Findings {
    fn push(&mut self, severity: Severity, field: impl Into<String>, description: impl Into<String>) {
        self.0.push(ValidationFinding::new(severity, field, description));
    }

    fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|f| f.field == field)
    }
}

fn unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

impl DeploymentValidator {
    pub fn new(royalty_warning_threshold: f64) -> Self {
        Self {
            royalty_warning_threshold,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.royalty_warning_threshold)
    }

    /// Validate an aggregate for deployment
    ///
    /// # Parameters
    /// * `aggregate` - The token to check, as loaded from storage
    ///
    /// # Returns
    /// The findings report, or `ValidationNotApplicable` unless the token is
    /// `MINTED`
    pub fn validate(&self, aggregate: &TokenAggregate) -> TokenResult<SecurityValidationResult> {
        let status = aggregate.status();
        if status != TokenStatus::Minted {
            return Err(TokenError::ValidationNotApplicable { status });
        }

        let schema = schema_for(aggregate.standard());
        let extension_row = aggregate.extension.to_row()?;
        let mut findings = Findings::default();

        self.check_stored_values(schema, &extension_row, &aggregate.sub_resources, &mut findings)?;
        self.check_deployment_fields(schema, &extension_row, &mut findings);
        self.check_core(aggregate, &mut findings);
        self.check_standard_rules(&aggregate.extension, &aggregate.sub_resources, &mut findings);

        let report = SecurityValidationResult::from_findings(findings.0);
        log::debug!(
            "validated {} token {}: {} finding(s), blocking: {}",
            aggregate.standard(),
            aggregate.id(),
            report.findings.len(),
            report.has_issues
        );
        Ok(report)
    }

    /// Re-run the field rules on what was stored
    fn check_stored_values(
        &self,
        schema: &StandardSchema,
        extension_row: &Map<String, Value>,
        sub_resources: &SubResourceCollections,
        findings: &mut Findings,
    ) -> TokenResult<()> {
        let mut issues: Vec<FieldIssue> = Vec::new();
        check_stored_fields(schema.fields, extension_row, "", &mut issues);

        let rows = sub_resources.to_rows()?;
        for collection in schema.collections {
            let items = rows.get(&collection.kind).map(Vec::as_slice).unwrap_or_default();
            for (index, row) in items.iter().enumerate() {
                let path = item_path(collection.form_key, index);
                check_stored_fields(collection.fields, row, &path, &mut issues);
            }
        }

        for issue in issues {
            match issue.problem {
                FieldProblem::Missing => {
                    findings.push(Severity::High, issue.field, "required value is missing")
                }
                FieldProblem::Invalid(reason) => {
                    findings.push(Severity::Critical, issue.field, format!("stored value is invalid: {reason}"))
                }
            }
        }
        Ok(())
    }

    fn check_deployment_fields(
        &self,
        schema: &StandardSchema,
        extension_row: &Map<String, Value>,
        findings: &mut Findings,
    ) {
        for spec in schema.fields {
            if spec.requirement == Requirement::Deployment && unset(extension_row.get(spec.storage_key)) {
                findings.push(Severity::High, spec.form_key, "required before deployment");
            }
        }
    }

    fn check_core(&self, aggregate: &TokenAggregate, findings: &mut Findings) {
        let token = &aggregate.token;
        if token.name.trim().is_empty() {
            findings.push(Severity::High, "name", "token name is empty");
        }
        if token.symbol.trim().is_empty() {
            findings.push(Severity::High, "symbol", "token symbol is empty");
        }
        if token.decimals > MAX_DECIMALS {
            findings.push(
                Severity::High,
                "decimals",
                format!("{} decimals exceeds the maximum of {MAX_DECIMALS}", token.decimals),
            );
        }
    }

    fn check_royalty(
        &self,
        has_royalty: bool,
        percentage: Option<f64>,
        receiver: Option<&str>,
        findings: &mut Findings,
    ) {
        if !has_royalty {
            return;
        }
        if is_blank(receiver) {
            findings.push(Severity::High, "royaltyReceiver", "royalties are enabled without a receiver");
        }
        if let Some(percentage) = percentage {
            if percentage > self.royalty_warning_threshold {
                findings.push(
                    Severity::Medium,
                    "royaltyPercentage",
                    format!(
                        "royalty of {percentage}% is above {}%",
                        self.royalty_warning_threshold
                    ),
                );
            }
        }
    }

    fn check_standard_rules(
        &self,
        extension: &TokenExtension,
        sub_resources: &SubResourceCollections,
        findings: &mut Findings,
    ) {
        match (extension, sub_resources) {
            (TokenExtension::Erc20(props), SubResourceCollections::Erc20) => {
                check_erc20(props, findings);
            }
            (TokenExtension::Erc721(props), SubResourceCollections::Erc721 { attributes }) => {
                self.check_royalty(
                    props.has_royalty,
                    props.royalty_percentage,
                    props.royalty_receiver.as_deref(),
                    findings,
                );
                let mut seen = HashSet::new();
                for (index, attribute) in attributes.iter().enumerate() {
                    if !seen.insert(attribute.trait_type.as_str()) {
                        findings.push(
                            Severity::Low,
                            format!("{}.traitType", item_path("tokenAttributes", index)),
                            format!("trait type {:?} is declared twice", attribute.trait_type),
                        );
                    }
                }
            }
            (
                TokenExtension::Erc1155(props),
                SubResourceCollections::Erc1155 {
                    types,
                    balances,
                    uri_mappings,
                },
            ) => {
                self.check_royalty(
                    props.has_royalty,
                    props.royalty_percentage,
                    props.royalty_receiver.as_deref(),
                    findings,
                );
                let declared: HashSet<&str> =
                    types.iter().map(|t| t.token_type_id.as_str()).collect();
                let type_refs = balances
                    .iter()
                    .map(|b| b.token_type_id.as_str())
                    .enumerate()
                    .map(|(i, id)| (item_path("initialBalances", i), id))
                    .chain(
                        uri_mappings
                            .iter()
                            .enumerate()
                            .map(|(i, m)| (item_path("uriMappings", i), m.token_type_id.as_str())),
                    );
                for (path, type_id) in type_refs {
                    if !declared.contains(type_id) {
                        findings.push(
                            Severity::Medium,
                            format!("{path}.tokenTypeId"),
                            format!("token type {type_id:?} is not declared"),
                        );
                    }
                }
            }
            (
                TokenExtension::Erc1400(props),
                SubResourceCollections::Erc1400 {
                    partitions,
                    controllers,
                    ..
                },
            ) => {
                if partitions.is_empty() {
                    findings.push(Severity::High, "partitions", "a security token needs at least one partition");
                }
                let mut seen = HashSet::new();
                for (index, partition) in partitions.iter().enumerate() {
                    if !seen.insert(partition.partition_id.as_str()) {
                        findings.push(
                            Severity::High,
                            format!("{}.partitionId", item_path("partitions", index)),
                            format!("partition id {:?} is not unique", partition.partition_id),
                        );
                    }
                }
                if props.forced_transfers && controllers.is_empty() {
                    findings.push(Severity::High, "controllers", "forced transfers need a controller");
                }
            }
            (
                TokenExtension::Erc3525(props),
                SubResourceCollections::Erc3525 { slots, allocations },
            ) => {
                self.check_royalty(
                    props.has_royalty,
                    props.royalty_percentage,
                    props.royalty_receiver.as_deref(),
                    findings,
                );
                let declared: HashSet<&str> = slots.iter().map(|s| s.slot_id.as_str()).collect();
                for (index, allocation) in allocations.iter().enumerate() {
                    if !declared.contains(allocation.slot_id.as_str()) {
                        findings.push(
                            Severity::High,
                            format!("{}.slotId", item_path("allocations", index)),
                            format!("slot {:?} is not declared", allocation.slot_id),
                        );
                    }
                }
            }
            (
                TokenExtension::Erc4626(props),
                SubResourceCollections::Erc4626 {
                    asset_allocations, ..
                },
            ) => {
                check_erc4626(props, asset_allocations, findings);
            }
            (extension, collections) => {
                findings.push(
                    Severity::Critical,
                    "standard",
                    format!(
                        "{} extension stored with {} collections",
                        extension.standard(),
                        collections.standard()
                    ),
                );
            }
        }
    }
}

fn check_erc20(props: &Erc20Properties, findings: &mut Findings) {
    let fee = &props.fee_on_transfer;
    if fee.enabled && is_blank(fee.recipient.as_deref()) {
        findings.push(
            Severity::High,
            "feeOnTransfer.recipient",
            "fee on transfer is enabled without a recipient",
        );
    }
}

fn check_min_max(
    min_key: &str,
    min: Option<&str>,
    max_key: &str,
    max: Option<&str>,
    findings: &mut Findings,
) {
    let parse = |raw: Option<&str>| raw.and_then(|r| parse_decimal(r).ok());
    if let (Some(low), Some(high)) = (parse(min), parse(max)) {
        if low > high {
            findings.push(
                Severity::High,
                min_key,
                format!("{min_key} {low} is above {max_key} {high}"),
            );
        }
    }
}

fn check_erc4626(
    props: &Erc4626Properties,
    allocations: &[Erc4626AssetAllocation],
    findings: &mut Findings,
) {
    let charges_fees = props.fees().iter().any(|(_, fee)| fee.is_some_and(|f| f > 0.0));
    if charges_fees && is_blank(props.fee_recipient.as_deref()) && !findings.has_field("feeRecipient") {
        findings.push(Severity::High, "feeRecipient", "vault charges fees without a fee recipient");
    }

    if props.automated_rebalancing {
        if props.yield_optimization_enabled {
            if is_blank(props.strategy_controller.as_deref()) {
                findings.push(
                    Severity::High,
                    "strategyController",
                    "automated rebalancing needs a strategy controller",
                );
            }
            if props.strategy_config.rebalance_threshold.is_none() {
                findings.push(
                    Severity::High,
                    "strategyConfig.rebalanceThreshold",
                    "automated rebalancing needs a rebalance threshold",
                );
            }
        } else {
            findings.push(
                Severity::Medium,
                "automatedRebalancing",
                "automated rebalancing has no effect without yield optimization",
            );
        }
    }

    check_min_max(
        "minDeposit",
        props.min_deposit.as_deref(),
        "maxDeposit",
        props.max_deposit.as_deref(),
        findings,
    );
    check_min_max(
        "minWithdrawal",
        props.min_withdrawal.as_deref(),
        "maxWithdrawal",
        props.max_withdrawal.as_deref(),
        findings,
    );

    let percentages = allocations
        .iter()
        .filter_map(|allocation| decimal_from_f64(allocation.percentage));
    if let Err(reason) = check_allocation_total(percentages) {
        findings.push(Severity::High, "assetAllocations", reason);
    }
}
