//! Field mapper
//!
//! Converts the flat form representation of a token into its normalized
//! storage shape (core fields, one extension record and the sub-resource
//! collections) and back. Every field declared in the schema registry is
//! carried through both directions; form keys the registry does not know are
//! kept in the token's `blocks` blob instead of being dropped.

use log::debug;
use serde_json::{Map, Value};

use tokenforge_core::aggregate::TokenAggregate;
use tokenforge_core::error::{FieldIssue, TokenError, TokenResult};
use tokenforge_core::extensions::TokenExtension;
use tokenforge_core::id::TokenId;
use tokenforge_core::objects::{ConfigMode, TokenRecord, TokenTier};
use tokenforge_core::schema::{schema_for, CollectionSpec, FieldKind, CORE_FIELDS, RESERVED_FORM_KEYS};
use tokenforge_core::standard::TokenStandard;
use tokenforge_core::subresources::{SubResourceCollections, SubResourceRows};
use tokenforge_core::validation::{check_allocation_total, decimal_from_f64};

use crate::codec::{decode_fields, encode_fields, item_path, FormData};

/// Core token fields carried by a form
#[derive(Debug, Clone, PartialEq)]
pub struct CoreFields {
    pub name: String,
    pub symbol: String,
    /// `None` keeps the stored precision
    pub decimals: Option<u8>,
    pub description: Option<String>,
    pub config_mode: ConfigMode,
    pub parent_token_id: Option<TokenId>,
    pub tier: Option<TokenTier>,
}

impl CoreFields {
    /// Write the form's core values onto a token record. Identity, standard
    /// and status are not touched.
    pub fn apply_to(&self, token: &mut TokenRecord) {
        token.name = self.name.clone();
        token.symbol = self.symbol.clone();
        if let Some(decimals) = self.decimals {
            token.decimals = decimals;
        }
        token.description = self.description.clone();
        token.config_mode = self.config_mode;
        token.parent_token_id = self.parent_token_id;
        token.tier = self.tier;
    }
}

/// Everything a form maps to
#[derive(Debug, Clone, PartialEq)]
pub struct MappedForm {
    pub core: CoreFields,
    pub extension: TokenExtension,
    pub sub_resources: SubResourceCollections,
    /// Undeclared form keys
    pub blocks: Map<String, Value>,
    /// Replacement metadata, if the form carried any
    pub metadata: Option<Map<String, Value>>,
}

/// Read the standard named by a form, e.g. for token creation
pub fn standard_from_form(form: &FormData) -> TokenResult<TokenStandard> {
    match form.get("standard") {
        Some(Value::String(raw)) => raw.parse(),
        Some(other) => Err(TokenError::UnknownStandard(other.to_string())),
        None => Err(TokenError::FieldMappingIncomplete {
            fields: vec!["standard".to_string()],
        }),
    }
}

fn decode_collection(
    spec: &CollectionSpec,
    value: Option<&Value>,
    issues: &mut Vec<FieldIssue>,
) -> Vec<Map<String, Value>> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            issues.push(FieldIssue::invalid(spec.form_key, "expected a list"));
            return Vec::new();
        }
    };

    let empty = Map::new();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = item_path(spec.form_key, i);
            let object = match item {
                Value::Object(object) => object,
                _ => {
                    issues.push(FieldIssue::invalid(path.clone(), "expected an object"));
                    &empty
                }
            };
            decode_fields(spec.fields, object, &path, issues)
        })
        .collect()
}

/// Cross-item rule: percentage columns of a collection may not exceed 100 in
/// total. Items that failed their own checks are left out of the sum.
fn check_percentage_totals(
    spec: &CollectionSpec,
    rows: &[Map<String, Value>],
    issues: &mut Vec<FieldIssue>,
) {
    for field in spec.fields {
        if field.form_key != "percentage" || !matches!(field.kind, FieldKind::Decimal(_)) {
            continue;
        }
        let percentages = rows
            .iter()
            .filter_map(|row| row.get(field.storage_key))
            .filter_map(Value::as_f64)
            .filter_map(decimal_from_f64);
        if let Err(reason) = check_allocation_total(percentages) {
            issues.push(FieldIssue::invalid(spec.form_key, reason));
        }
    }
}

/// Map the extension fields and collections of a form to storage.
///
/// Only keys declared for `standard` are read. All field problems are
/// collected before failing.
pub fn to_storage(
    standard: TokenStandard,
    form: &FormData,
) -> TokenResult<(TokenExtension, SubResourceCollections)> {
    let mut issues = Vec::new();
    let (extension, sub_resources) = storage_parts(standard, form, &mut issues)?;
    if !issues.is_empty() {
        return Err(TokenError::from_issues(issues));
    }
    Ok((extension, sub_resources))
}

fn storage_parts(
    standard: TokenStandard,
    form: &FormData,
    issues: &mut Vec<FieldIssue>,
) -> TokenResult<(TokenExtension, SubResourceCollections)> {
    let schema = schema_for(standard);
    let row = decode_fields(schema.fields, form, "", issues);

    let mut rows = SubResourceRows::new();
    for spec in schema.collections {
        let items = decode_collection(spec, form.get(spec.form_key), issues);
        check_percentage_totals(spec, &items, issues);
        rows.insert(spec.kind, items);
    }

    if !issues.is_empty() {
        // Typed conversion would fail on the holes left by rejected values
        return Ok((
            TokenExtension::default_for(standard),
            SubResourceCollections::empty(standard),
        ));
    }
    Ok((
        TokenExtension::from_row(standard, row)?,
        SubResourceCollections::from_rows(standard, rows)?,
    ))
}

/// Map storage back to form values for the extension and its collections
pub fn to_form(
    extension: &TokenExtension,
    sub_resources: &SubResourceCollections,
) -> TokenResult<FormData> {
    let standard = extension.standard();
    if sub_resources.standard() != standard {
        return Err(TokenError::Integrity(format!(
            "extension is {standard} but sub-resources are {}",
            sub_resources.standard()
        )));
    }
    let schema = schema_for(standard);

    let mut form = encode_fields(schema.fields, &extension.to_row()?);
    let mut rows = sub_resources.to_rows()?;
    for spec in schema.collections {
        let items = rows
            .remove(&spec.kind)
            .unwrap_or_default()
            .iter()
            .map(|row| Value::Object(encode_fields(spec.fields, row)))
            .collect();
        form.insert(spec.form_key.to_string(), Value::Array(items));
    }
    Ok(form)
}

fn core_fields(form: &FormData, issues: &mut Vec<FieldIssue>) -> CoreFields {
    let row = decode_fields(CORE_FIELDS, form, "", issues);
    let text = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);

    let parent_token_id = text("parent_token_id").and_then(|raw| match raw.parse::<TokenId>() {
        Ok(id) => Some(id),
        Err(_) => {
            issues.push(FieldIssue::invalid("parentTokenId", "expected a token id"));
            None
        }
    });

    CoreFields {
        name: text("name").unwrap_or_default(),
        symbol: text("symbol").unwrap_or_default(),
        decimals: row
            .get("decimals")
            .and_then(Value::as_u64)
            .and_then(|d| u8::try_from(d).ok()),
        description: text("description"),
        config_mode: text("config_mode")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default(),
        parent_token_id,
        tier: text("tier").and_then(|raw| raw.parse().ok()),
    }
}

fn is_declared(standard: TokenStandard, key: &str) -> bool {
    let schema = schema_for(standard);
    RESERVED_FORM_KEYS.contains(&key)
        || CORE_FIELDS.iter().any(|f| f.form_key == key)
        || schema.field(key).is_some()
        || schema.collections.iter().any(|c| c.form_key == key)
}

/// Map a whole form for a token of `standard`.
///
/// Reserved keys (`id`, `status`, timestamps, ...) are ignored, so a form can
/// never carry a status change. A `standard` key that names a different
/// standard is rejected.
pub fn map_form(standard: TokenStandard, form: &FormData) -> TokenResult<MappedForm> {
    let mut issues = Vec::new();

    if let Some(named) = form.get("standard") {
        match named.as_str().map(str::parse::<TokenStandard>) {
            Some(Ok(named)) if named == standard => {}
            Some(Ok(named)) => issues.push(FieldIssue::invalid(
                "standard",
                format!("a {standard} token cannot become {named}"),
            )),
            Some(Err(err)) => return Err(err),
            None => return Err(TokenError::UnknownStandard(named.to_string())),
        }
    }

    let core = core_fields(form, &mut issues);
    let (extension, sub_resources) = storage_parts(standard, form, &mut issues)?;

    let metadata = match form.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(metadata)) => Some(metadata.clone()),
        Some(_) => {
            issues.push(FieldIssue::invalid("metadata", "expected an object"));
            None
        }
    };

    let blocks: Map<String, Value> = form
        .iter()
        .filter(|(key, _)| !is_declared(standard, key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if !issues.is_empty() {
        debug!("form for {standard} token rejected with {} issue(s)", issues.len());
        return Err(TokenError::from_issues(issues));
    }

    debug!(
        "mapped {standard} form: {} sub-resource row(s), {} block key(s)",
        sub_resources.len(),
        blocks.len()
    );
    Ok(MappedForm {
        core,
        extension,
        sub_resources,
        blocks,
        metadata,
    })
}

/// Build the full form for a loaded aggregate.
///
/// Block keys come first so declared fields win on a name clash. Read-only
/// keys (`id`, `status`, ...) are included for display and ignored by
/// [`map_form`].
pub fn aggregate_to_form(aggregate: &TokenAggregate) -> TokenResult<FormData> {
    let token = &aggregate.token;
    let mut form: FormData = token.blocks.clone();

    form.insert("id".into(), Value::String(token.id.to_string()));
    form.insert("projectId".into(), Value::String(token.project_id.to_string()));
    form.insert("standard".into(), Value::String(token.standard.to_string()));
    form.insert("status".into(), Value::String(token.status.to_string()));
    form.insert("transitionCount".into(), Value::from(token.transition_count));
    form.insert("createdAt".into(), Value::String(token.created_at.to_rfc3339()));
    form.insert("updatedAt".into(), Value::String(token.updated_at.to_rfc3339()));
    form.insert("metadata".into(), Value::Object(token.metadata.clone()));

    let text = |value: Option<String>| Value::String(value.unwrap_or_default());
    form.insert("name".into(), Value::String(token.name.clone()));
    form.insert("symbol".into(), Value::String(token.symbol.clone()));
    form.insert("decimals".into(), Value::from(token.decimals));
    form.insert("description".into(), text(token.description.clone()));
    form.insert("configMode".into(), Value::String(token.config_mode.as_str().into()));
    form.insert(
        "parentTokenId".into(),
        text(token.parent_token_id.map(|id| id.to_string())),
    );
    form.insert("tier".into(), text(token.tier.map(|t| t.as_str().to_string())));

    form.extend(to_form(&aggregate.extension, &aggregate.sub_resources)?);
    Ok(form)
}
