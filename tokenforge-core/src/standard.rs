use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TokenError;

/// The six mutually exclusive asset standards a token can be issued under.
///
/// A token's standard is fixed at creation; switching standard means issuing
/// a new token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TokenStandard {
    /// Fungible token
    Erc20,
    /// Non-fungible token
    Erc721,
    /// Multi-token (fungible and non-fungible ids in one contract)
    Erc1155,
    /// Partitioned security token with controllers
    Erc1400,
    /// Semi-fungible token with slots
    Erc3525,
    /// Tokenized vault
    Erc4626,
}

impl TokenStandard {
    /// Every registered standard, in registry order
    pub const ALL: [TokenStandard; 6] = [
        TokenStandard::Erc20,
        TokenStandard::Erc721,
        TokenStandard::Erc1155,
        TokenStandard::Erc1400,
        TokenStandard::Erc3525,
        TokenStandard::Erc4626,
    ];

    /// Canonical storage text
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "ERC-20",
            TokenStandard::Erc721 => "ERC-721",
            TokenStandard::Erc1155 => "ERC-1155",
            TokenStandard::Erc1400 => "ERC-1400",
            TokenStandard::Erc3525 => "ERC-3525",
            TokenStandard::Erc4626 => "ERC-4626",
        }
    }

    /// Name of the table holding this standard's extension records
    pub fn extension_table(&self) -> &'static str {
        match self {
            TokenStandard::Erc20 => "token_erc20_properties",
            TokenStandard::Erc721 => "token_erc721_properties",
            TokenStandard::Erc1155 => "token_erc1155_properties",
            TokenStandard::Erc1400 => "token_erc1400_properties",
            TokenStandard::Erc3525 => "token_erc3525_properties",
            TokenStandard::Erc4626 => "token_erc4626_properties",
        }
    }

    /// Whether balances of this standard are divisible amounts
    pub fn is_fungible(&self) -> bool {
        matches!(
            self,
            TokenStandard::Erc20 | TokenStandard::Erc1400 | TokenStandard::Erc4626
        )
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStandard {
    type Err = TokenError;

    /// Accepts `ERC-20`, `erc20`, `ERC_20`, `ERC 20` and the like
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();

        match compact.as_str() {
            "ERC20" => Ok(TokenStandard::Erc20),
            "ERC721" => Ok(TokenStandard::Erc721),
            "ERC1155" => Ok(TokenStandard::Erc1155),
            "ERC1400" => Ok(TokenStandard::Erc1400),
            "ERC3525" => Ok(TokenStandard::Erc3525),
            "ERC4626" => Ok(TokenStandard::Erc4626),
            _ => Err(TokenError::UnknownStandard(s.to_string())),
        }
    }
}

impl TryFrom<String> for TokenStandard {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenStandard> for String {
    fn from(standard: TokenStandard) -> Self {
        standard.as_str().to_string()
    }
}
