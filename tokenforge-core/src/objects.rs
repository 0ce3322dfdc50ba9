use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;
use crate::id::{ProjectId, TokenId};
use crate::lifecycle::INITIAL_STATUS;
use crate::standard::TokenStandard;
use crate::status::{parse_status, TokenStatus};

/// Metadata keys that older records use for a parent token reference
pub const LEGACY_PARENT_KEYS: [&str; 3] = ["parentId", "parent_id", "primaryTokenId"];

/// Metadata keys that older records use for a tier hint
pub const LEGACY_TIER_KEYS: [&str; 2] = ["tier", "tokenTier"];

/// How much of the configuration the form exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    #[default]
    Min,
    Max,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Min => "min",
            ConfigMode::Max => "max",
        }
    }
}

impl FromStr for ConfigMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" | "basic" => Ok(ConfigMode::Min),
            "max" | "advanced" => Ok(ConfigMode::Max),
            other => Err(format!("unknown config mode {other:?}")),
        }
    }
}

/// Display tier of a token within a product family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTier {
    Primary,
    Secondary,
    Tertiary,
}

impl TokenTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTier::Primary => "primary",
            TokenTier::Secondary => "secondary",
            TokenTier::Tertiary => "tertiary",
        }
    }
}

impl fmt::Display for TokenTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(TokenTier::Primary),
            "secondary" => Ok(TokenTier::Secondary),
            "tertiary" => Ok(TokenTier::Tertiary),
            other => Err(format!("unknown tier {other:?}")),
        }
    }
}

/// The core token row (table `tokens`)
///
/// `standard` never changes after creation and `status` only changes through
/// the lifecycle state machine; field edits go through the mapper and never
/// touch either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub project_id: ProjectId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub standard: TokenStandard,
    pub status: TokenStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config_mode: ConfigMode,
    /// Free-form metadata; may carry a chain and address once deployed
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Form keys that have no normalized home
    #[serde(default)]
    pub blocks: Map<String, Value>,
    #[serde(default)]
    pub parent_token_id: Option<TokenId>,
    #[serde(default)]
    pub tier: Option<TokenTier>,
    #[serde(default)]
    pub transition_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Create a new token in the initial lifecycle state
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        symbol: impl Into<String>,
        standard: TokenStandard,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TokenId::new(),
            project_id,
            name: name.into(),
            symbol: symbol.into(),
            decimals: if standard.is_fungible() { 18 } else { 0 },
            standard,
            status: INITIAL_STATUS,
            description: None,
            config_mode: ConfigMode::default(),
            metadata: Map::new(),
            blocks: Map::new(),
            parent_token_id: None,
            tier: None,
            transition_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move parent and tier hints found under legacy metadata keys into the
    /// explicit fields. Explicit values are never overwritten; a hint that
    /// does not parse is left in metadata untouched.
    ///
    /// Returns true if anything was promoted.
    pub fn promote_legacy_references(&mut self) -> bool {
        let mut promoted = false;

        if self.parent_token_id.is_none() {
            let parent = LEGACY_PARENT_KEYS
                .iter()
                .filter_map(|key| self.metadata.get(*key))
                .filter_map(Value::as_str)
                .find_map(|raw| raw.parse::<TokenId>().ok());
            if let Some(parent) = parent {
                self.parent_token_id = Some(parent);
                promoted = true;
            }
        }

        if self.tier.is_none() {
            let tier = LEGACY_TIER_KEYS
                .iter()
                .filter_map(|key| self.metadata.get(*key))
                .filter_map(Value::as_str)
                .find_map(|raw| raw.parse::<TokenTier>().ok());
            if let Some(tier) = tier {
                self.tier = Some(tier);
                promoted = true;
            }
        }

        promoted
    }

    /// Contract address recorded in metadata after a successful deployment
    pub fn deployed_address(&self) -> Option<&str> {
        self.metadata.get("contractAddress").and_then(Value::as_str)
    }

    /// Serialize as a storage row
    pub fn to_row(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Read a storage row; the status text is normalized on the way in
    pub fn from_row(mut row: Map<String, Value>) -> Result<Self, TokenError> {
        let raw = row
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| TokenError::UnknownStatus(String::new()))?;
        let status = parse_status(raw)?;
        row.insert("status".to_string(), Value::from(status.as_str()));
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> TokenRecord {
        TokenRecord::new(ProjectId::new(), "Yield Vault", "YV", TokenStandard::Erc4626)
    }

    #[test]
    fn test_new_token_starts_in_draft() {
        let token = vault();
        assert_eq!(token.status, TokenStatus::Draft);
        assert_eq!(token.transition_count, 0);
        assert_eq!(token.decimals, 18);
        assert_eq!(token.config_mode, ConfigMode::Min);
    }

    #[test]
    fn test_legacy_parent_reference_is_promoted() {
        let parent = TokenId::new();
        let mut token = vault();
        token.metadata.insert("primaryTokenId".into(), json!(parent.to_string()));
        token.metadata.insert("tokenTier".into(), json!("Secondary"));

        assert!(token.promote_legacy_references());
        assert_eq!(token.parent_token_id, Some(parent));
        assert_eq!(token.tier, Some(TokenTier::Secondary));
        assert!(!token.promote_legacy_references());
    }

    #[test]
    fn test_explicit_parent_wins_over_metadata() {
        let explicit = TokenId::new();
        let mut token = vault();
        token.parent_token_id = Some(explicit);
        token.metadata.insert("parentId".into(), json!(TokenId::new().to_string()));
        token.promote_legacy_references();
        assert_eq!(token.parent_token_id, Some(explicit));
    }

    #[test]
    fn test_unparseable_hint_is_ignored() {
        let mut token = vault();
        token.metadata.insert("parent_id".into(), json!("the big one"));
        assert!(!token.promote_legacy_references());
        assert!(token.parent_token_id.is_none());
    }

    #[test]
    fn test_row_normalizes_stored_status_text() {
        let token = vault();
        let mut row = token.to_row().unwrap();
        assert_eq!(row["status"], json!("DRAFT"));
        row.insert("status".into(), json!("ready to mint"));
        let back = TokenRecord::from_row(row).unwrap();
        assert_eq!(back.status, TokenStatus::ReadyToMint);
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let mut row = vault().to_row().unwrap();
        row.insert("status".into(), json!("launched"));
        assert!(matches!(
            TokenRecord::from_row(row),
            Err(TokenError::UnknownStatus(raw)) if raw == "launched"
        ));
    }
}
