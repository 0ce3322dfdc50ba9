use serde_json::Value;

use crate::codec::FormData;

/// Overlay a partial form onto the current one.
///
/// Nested objects merge key by key so editing `strategyConfig.maxDrawdown`
/// leaves its siblings alone. Lists and scalars in the partial form replace
/// the current value, including an explicit `null`.
pub fn merge_form(current: &FormData, partial: &FormData) -> FormData {
    let mut merged = current.clone();
    merge_into(&mut merged, partial);
    merged
}

fn merge_into(target: &mut FormData, partial: &FormData) {
    for (key, value) in partial {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(update)) => merge_into(existing, update),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
