use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// TokenId uniquely identifies a token across every table that references it.
// Stored rows carry it as the hyphenated UUID text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

/// Identifier of the project a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl TokenId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        TokenId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        TokenId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for TokenId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(TokenId)
    }
}

impl ProjectId {
    pub fn new() -> Self {
        ProjectId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ProjectId(uuid)
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(ProjectId)
    }
}

/// Generate a row identifier for extension, sub-resource and history rows
pub fn new_row_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}
