//! Per-kind conversion between form values and storage values
//!
//! Form values are loose: numbers may arrive as strings, booleans as
//! `"true"`, and an empty string means "unset". Storage values are strict and
//! typed. Every problem found is pushed onto the caller's issue list with
//! its full path so independent fields are reported together.

use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

use tokenforge_core::error::FieldIssue;
use tokenforge_core::schema::{FieldKind, FieldSpec, Requirement};
use tokenforge_core::validation::{
    check_address, decimal_from_f64, decimal_to_f64, BoundedDecimal,
};

/// Flat form representation, keyed by camelCase form keys
pub type FormData = Map<String, Value>;

/// Join a parent path and a key: `feeOnTransfer.recipient`
pub fn field_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Path of one item in a collection: `assetAllocations[1]`
pub fn item_path(collection: &str, index: usize) -> String {
    format!("{collection}[{index}]")
}

/// Whether a storage value counts as "no value"
pub fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Read form value text for numeric kinds, accepting JSON numbers too
fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_decimal(
    bounds: &BoundedDecimal,
    value: &Value,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<Decimal> {
    let Some(raw) = numeric_text(value) else {
        issues.push(FieldIssue::invalid(path, "expected a decimal number"));
        return None;
    };
    match bounds.check(&raw) {
        Ok(decimal) => decimal,
        Err(reason) => {
            issues.push(FieldIssue::invalid(path, reason));
            None
        }
    }
}

/// Convert one form value to its storage value
fn decode_value(
    spec: &FieldSpec,
    value: Option<&Value>,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> Value {
    let value = value.filter(|v| !v.is_null());

    let decoded = match (&spec.kind, value) {
        (FieldKind::Object(nested), Some(Value::Object(inner))) => {
            Value::Object(decode_fields(nested, inner, path, issues))
        }
        (FieldKind::Object(nested), Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected an object"));
            Value::Object(decode_fields(nested, &Map::new(), path, issues))
        }
        (FieldKind::Object(nested), None) => {
            Value::Object(decode_fields(nested, &Map::new(), path, issues))
        }
        (FieldKind::Bool, None) => Value::Bool(false),
        (FieldKind::StringList, None) => Value::Array(Vec::new()),
        (_, None) => Value::Null,

        (FieldKind::Text, Some(Value::String(s))) if s.trim().is_empty() => Value::Null,
        (FieldKind::Text, Some(Value::String(s))) => Value::String(s.clone()),
        (FieldKind::Text, Some(Value::Number(n))) => Value::String(n.to_string()),
        (FieldKind::Text, Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected text"));
            Value::Null
        }

        (FieldKind::Bool, Some(Value::Bool(b))) => Value::Bool(*b),
        (FieldKind::Bool, Some(Value::String(s))) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" | "" => Value::Bool(false),
            _ => {
                issues.push(FieldIssue::invalid(path, "expected true or false"));
                Value::Bool(false)
            }
        },
        (FieldKind::Bool, Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected true or false"));
            Value::Bool(false)
        }

        (FieldKind::Integer { .. }, Some(Value::String(s))) if s.trim().is_empty() => Value::Null,
        (FieldKind::Integer { min, max }, Some(v)) => {
            let parsed = match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            match parsed {
                Some(n) if (*min..=*max).contains(&n) => Value::Number(Number::from(n)),
                Some(_) => {
                    issues.push(FieldIssue::invalid(
                        path,
                        format!("must be a whole number between {min} and {max}"),
                    ));
                    Value::Null
                }
                None => {
                    issues.push(FieldIssue::invalid(path, "expected a whole number"));
                    Value::Null
                }
            }
        }

        (FieldKind::Decimal(bounds), Some(v)) => decode_decimal(bounds, v, path, issues)
            .and_then(decimal_to_f64)
            .map(Value::from)
            .unwrap_or(Value::Null),
        (FieldKind::Amount(bounds), Some(v)) => decode_decimal(bounds, v, path, issues)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),

        (FieldKind::Address, Some(Value::String(s))) => match check_address(s) {
            Ok(Some(address)) => Value::String(address),
            Ok(None) => Value::Null,
            Err(reason) => {
                issues.push(FieldIssue::invalid(path, reason));
                Value::Null
            }
        },
        (FieldKind::Address, Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected an address"));
            Value::Null
        }

        (FieldKind::Choice(options), Some(Value::String(s))) => {
            let choice = s.trim().to_ascii_lowercase();
            if choice.is_empty() {
                Value::Null
            } else if options.contains(&choice.as_str()) {
                Value::String(choice)
            } else {
                issues.push(FieldIssue::invalid(
                    path,
                    format!("must be one of {}", options.join(", ")),
                ));
                Value::Null
            }
        }
        (FieldKind::Choice(_), Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected one of the listed options"));
            Value::Null
        }

        (FieldKind::StringList, Some(Value::Array(items))) => {
            let mut list = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) => list.push(Value::String(s.clone())),
                    Value::Number(n) => list.push(Value::String(n.to_string())),
                    _ => issues.push(FieldIssue::invalid(item_path(path, i), "expected text")),
                }
            }
            Value::Array(list)
        }
        (FieldKind::StringList, Some(Value::String(s))) => Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        (FieldKind::StringList, Some(_)) => {
            issues.push(FieldIssue::invalid(path, "expected a list of text values"));
            Value::Array(Vec::new())
        }
    };

    if spec.requirement == Requirement::Storage && is_unset(Some(&decoded)) {
        // Malformed values were already reported as invalid
        if !issues.iter().any(|issue| issue.field == path) {
            issues.push(FieldIssue::missing(path));
        }
    }
    decoded
}

/// Convert the declared fields of a form object to a storage row
pub fn decode_fields(
    fields: &[FieldSpec],
    form: &Map<String, Value>,
    prefix: &str,
    issues: &mut Vec<FieldIssue>,
) -> Map<String, Value> {
    let mut row = Map::new();
    for spec in fields {
        let path = field_path(prefix, spec.form_key);
        let value = decode_value(spec, form.get(spec.form_key), &path, issues);
        row.insert(spec.storage_key.to_string(), value);
    }
    row
}

/// Convert one storage value back to its form value
fn encode_value(spec: &FieldSpec, stored: Option<&Value>) -> Value {
    let stored = stored.filter(|v| !v.is_null());
    match (&spec.kind, stored) {
        (FieldKind::Object(nested), Some(Value::Object(inner))) => {
            Value::Object(encode_fields(nested, inner))
        }
        (FieldKind::Object(nested), _) => Value::Object(encode_fields(nested, &Map::new())),
        (FieldKind::Bool, Some(Value::Bool(b))) => Value::Bool(*b),
        (FieldKind::Bool, _) => Value::Bool(false),
        (FieldKind::StringList, Some(Value::Array(items))) => Value::Array(items.clone()),
        (FieldKind::StringList, _) => Value::Array(Vec::new()),
        (FieldKind::Integer { .. }, Some(Value::Number(n))) => Value::Number(n.clone()),
        (FieldKind::Decimal(_), Some(Value::Number(n))) => n
            .as_f64()
            .and_then(decimal_from_f64)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or_else(|| Value::String(n.to_string())),
        (_, Some(Value::String(s))) => Value::String(s.clone()),
        (_, Some(other)) => Value::String(other.to_string()),
        (_, None) => Value::String(String::new()),
    }
}

/// Convert a storage row to form values for the declared fields
pub fn encode_fields(fields: &[FieldSpec], row: &Map<String, Value>) -> FormData {
    fields
        .iter()
        .map(|spec| {
            (
                spec.form_key.to_string(),
                encode_value(spec, row.get(spec.storage_key)),
            )
        })
        .collect()
}

/// Re-check stored values against their declared kinds.
///
/// Used before deployment on data that has already been through the mapper;
/// any issue here means the stored row was written by something else.
pub fn check_stored_fields(
    fields: &[FieldSpec],
    row: &Map<String, Value>,
    prefix: &str,
    issues: &mut Vec<FieldIssue>,
) {
    for spec in fields {
        let path = field_path(prefix, spec.form_key);
        let stored = row.get(spec.storage_key).filter(|v| !v.is_null());
        let Some(value) = stored else {
            if spec.requirement == Requirement::Storage {
                issues.push(FieldIssue::missing(path));
            }
            continue;
        };
        let problem = match (&spec.kind, value) {
            (FieldKind::Object(nested), Value::Object(inner)) => {
                check_stored_fields(nested, inner, &path, issues);
                None
            }
            (FieldKind::Decimal(bounds), Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| "not a decimal number".to_string())
                .and_then(|f| bounds.check_stored(f))
                .err(),
            (FieldKind::Amount(bounds), Value::String(s)) => bounds.check(s).err(),
            (FieldKind::Address, Value::String(s)) => check_address(s).err(),
            (FieldKind::Integer { min, max }, Value::Number(n)) => match n.as_u64() {
                Some(v) if (*min..=*max).contains(&v) => None,
                _ => Some(format!("must be a whole number between {min} and {max}")),
            },
            (FieldKind::Choice(options), Value::String(s)) => (!options.contains(&s.as_str()))
                .then(|| format!("must be one of {}", options.join(", "))),
            (FieldKind::Text, Value::String(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::StringList, Value::Array(_)) => None,
            _ => Some("stored value has the wrong type".to_string()),
        };
        if let Some(reason) = problem {
            issues.push(FieldIssue::invalid(path, reason));
        }
    }
}
