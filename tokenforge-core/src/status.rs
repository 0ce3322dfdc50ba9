use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;

/// Lifecycle status of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TokenStatus {
    Draft,
    Review,
    Approved,
    Rejected,
    ReadyToMint,
    Minted,
    Deployed,
    Paused,
    Distributed,
}

impl TokenStatus {
    pub const ALL: [TokenStatus; 9] = [
        TokenStatus::Draft,
        TokenStatus::Review,
        TokenStatus::Approved,
        TokenStatus::Rejected,
        TokenStatus::ReadyToMint,
        TokenStatus::Minted,
        TokenStatus::Deployed,
        TokenStatus::Paused,
        TokenStatus::Distributed,
    ];

    /// Canonical storage text
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Draft => "DRAFT",
            TokenStatus::Review => "REVIEW",
            TokenStatus::Approved => "APPROVED",
            TokenStatus::Rejected => "REJECTED",
            TokenStatus::ReadyToMint => "READY_TO_MINT",
            TokenStatus::Minted => "MINTED",
            TokenStatus::Deployed => "DEPLOYED",
            TokenStatus::Paused => "PAUSED",
            TokenStatus::Distributed => "DISTRIBUTED",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a status string as it may arrive from storage.
///
/// Surrounding whitespace is trimmed, case is folded and runs of spaces or
/// hyphens become single underscores, so `"ready to mint"` and
/// `"Ready-To-Mint"` both read as `READY_TO_MINT`. Anything that still does
/// not name a state is `UnknownStatus`; there is no fallback state.
pub fn parse_status(raw: &str) -> Result<TokenStatus, TokenError> {
    let mut canonical = String::with_capacity(raw.len());
    for word in raw
        .trim()
        .split(|c: char| c == ' ' || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
    {
        if !canonical.is_empty() {
            canonical.push('_');
        }
        canonical.push_str(&word.to_ascii_uppercase());
    }

    TokenStatus::ALL
        .iter()
        .copied()
        .find(|status| status.as_str() == canonical)
        .ok_or_else(|| TokenError::UnknownStatus(raw.to_string()))
}

impl FromStr for TokenStatus {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_status(s)
    }
}

impl TryFrom<String> for TokenStatus {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_status(&value)
    }
}

impl From<TokenStatus> for String {
    fn from(status: TokenStatus) -> Self {
        status.as_str().to_string()
    }
}
