//! Tier resolver
//!
//! Classifies loaded tokens into primary, secondary and tertiary groups for
//! display. A secondary or tertiary token whose parent cannot be resolved
//! within the given set lands in the [`ParentKey::Unknown`] bucket; that is an
//! expected outcome, not an error.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::aggregate::TokenAggregate;
use crate::id::TokenId;
use crate::objects::{TokenRecord, TokenTier, LEGACY_PARENT_KEYS, LEGACY_TIER_KEYS};

/// Anything that carries a core token record
pub trait TierSource {
    fn token_record(&self) -> &TokenRecord;
}

impl TierSource for TokenRecord {
    fn token_record(&self) -> &TokenRecord {
        self
    }
}

impl TierSource for TokenAggregate {
    fn token_record(&self) -> &TokenRecord {
        &self.token
    }
}

/// Group key for secondary and tertiary tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentKey {
    /// The parent is present in the classified set
    Token(TokenId),
    /// Dangling, self-referencing, unreadable or missing parent reference
    Unknown,
}

/// Result of [`classify`]; every group is sorted by name, then id
#[derive(Debug)]
pub struct TierClassification<'a, T> {
    pub primary: Vec<&'a T>,
    pub secondary_by_parent: BTreeMap<ParentKey, Vec<&'a T>>,
    pub tertiary_by_parent: BTreeMap<ParentKey, Vec<&'a T>>,
}

impl<'a, T> TierClassification<'a, T> {
    /// Total number of classified tokens
    pub fn len(&self) -> usize {
        self.primary.len()
            + self.secondary_by_parent.values().map(Vec::len).sum::<usize>()
            + self.tertiary_by_parent.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unknown_parent(&self) -> impl Iterator<Item = &&'a T> {
        self.secondary_by_parent
            .get(&ParentKey::Unknown)
            .into_iter()
            .chain(self.tertiary_by_parent.get(&ParentKey::Unknown))
            .flatten()
    }
}

enum ParentReference {
    None,
    Id(TokenId),
    /// A legacy metadata reference that is not a token id
    Unreadable,
}

fn parent_reference(token: &TokenRecord) -> ParentReference {
    if let Some(parent) = token.parent_token_id {
        return ParentReference::Id(parent);
    }
    let mut raw_refs = LEGACY_PARENT_KEYS
        .iter()
        .filter_map(|key| token.metadata.get(*key))
        .filter(|value| !value.is_null())
        .peekable();
    if raw_refs.peek().is_none() {
        return ParentReference::None;
    }
    raw_refs
        .filter_map(Value::as_str)
        .find_map(|raw| raw.parse::<TokenId>().ok())
        .map_or(ParentReference::Unreadable, ParentReference::Id)
}

fn tier_hint(token: &TokenRecord) -> Option<TokenTier> {
    token.tier.or_else(|| {
        LEGACY_TIER_KEYS
            .iter()
            .filter_map(|key| token.metadata.get(*key))
            .filter_map(Value::as_str)
            .find_map(|raw| raw.parse().ok())
    })
}

fn sort_group<T: TierSource>(group: &mut [&T]) {
    group.sort_by(|a, b| {
        let (a, b) = (a.token_record(), b.token_record());
        a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
    });
}

/// Classify `tokens` into tiers.
///
/// An explicit primary tag always wins. Otherwise a token with neither a
/// parent reference nor a tier tag is primary, an explicit tertiary tag makes
/// it tertiary, and any other token with a parent reference (or a secondary
/// tag) is secondary. Pure and independent of input order.
pub fn classify<T: TierSource>(tokens: &[T]) -> TierClassification<'_, T> {
    let present: HashSet<TokenId> = tokens.iter().map(|t| t.token_record().id).collect();

    let mut primary = Vec::new();
    let mut secondary_by_parent: BTreeMap<ParentKey, Vec<&T>> = BTreeMap::new();
    let mut tertiary_by_parent: BTreeMap<ParentKey, Vec<&T>> = BTreeMap::new();

    for item in tokens {
        let token = item.token_record();
        let tier = tier_hint(token);
        let parent = parent_reference(token);

        if tier == Some(TokenTier::Primary) {
            primary.push(item);
            continue;
        }
        if tier.is_none() && matches!(parent, ParentReference::None) {
            primary.push(item);
            continue;
        }

        let key = match parent {
            ParentReference::Id(id) if id != token.id && present.contains(&id) => {
                ParentKey::Token(id)
            }
            _ => ParentKey::Unknown,
        };
        let bucket = if tier == Some(TokenTier::Tertiary) {
            &mut tertiary_by_parent
        } else {
            &mut secondary_by_parent
        };
        bucket.entry(key).or_default().push(item);
    }

    sort_group(&mut primary);
    for group in secondary_by_parent.values_mut() {
        sort_group(group);
    }
    for group in tertiary_by_parent.values_mut() {
        sort_group(group);
    }

    TierClassification {
        primary,
        secondary_by_parent,
        tertiary_by_parent,
    }
}
