//! Standard-specific extension records
//!
//! Exactly one extension record exists per token, and its variant always
//! matches the token's standard. Storage keys are the snake_case field names
//! declared in [`crate::schema`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::standard::TokenStandard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessControl {
    Ownable,
    Roles,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStorage {
    Ipfs,
    Arweave,
    Centralized,
    Onchain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MintingMethod {
    Open,
    Whitelist,
    Auction,
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Equity,
    Debt,
    Derivative,
    Fund,
    Reit,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultType {
    Yield,
    Fund,
    Staking,
    Lending,
}

/// Fee charged on every transfer of a fungible token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeOnTransfer {
    pub enabled: bool,
    pub fee: Option<f64>,
    pub recipient: Option<String>,
    pub fee_type: Option<FeeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc20Properties {
    pub initial_supply: Option<String>,
    pub cap: Option<String>,
    pub is_mintable: bool,
    pub is_burnable: bool,
    pub is_pausable: bool,
    pub access_control: Option<AccessControl>,
    pub allow_management: bool,
    pub fee_on_transfer: FeeOnTransfer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc721Properties {
    pub base_uri: Option<String>,
    pub metadata_storage: Option<MetadataStorage>,
    pub max_supply: Option<String>,
    pub has_royalty: bool,
    pub royalty_percentage: Option<f64>,
    pub royalty_receiver: Option<String>,
    pub is_burnable: bool,
    pub is_pausable: bool,
    pub enumerable: bool,
    pub auto_increment_ids: bool,
    pub minting_method: Option<MintingMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1155Properties {
    pub base_uri: Option<String>,
    pub metadata_storage: Option<MetadataStorage>,
    pub has_royalty: bool,
    pub royalty_percentage: Option<f64>,
    pub royalty_receiver: Option<String>,
    pub is_burnable: bool,
    pub is_pausable: bool,
    pub batch_minting_enabled: bool,
    pub supply_tracking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1400Properties {
    pub initial_supply: Option<String>,
    pub cap: Option<String>,
    pub security_type: Option<SecurityType>,
    pub issuing_jurisdiction: Option<String>,
    pub issuing_entity_name: Option<String>,
    pub issuing_entity_lei: Option<String>,
    pub is_issuable: bool,
    pub is_pausable: bool,
    pub granular_control: bool,
    pub forced_transfers: bool,
    pub kyc_required: bool,
    pub whitelist_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc3525Properties {
    pub value_decimals: Option<u32>,
    pub base_uri: Option<String>,
    pub metadata_storage: Option<MetadataStorage>,
    pub slot_type: Option<String>,
    pub is_burnable: bool,
    pub is_pausable: bool,
    pub slot_approvals: bool,
    pub value_approvals: bool,
    pub updatable_slots: bool,
    pub value_transfers_enabled: bool,
    pub has_royalty: bool,
    pub royalty_percentage: Option<f64>,
    pub royalty_receiver: Option<String>,
}

/// Defaults applied by the vault's yield strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub rebalance_threshold: Option<f64>,
    pub harvest_frequency: Option<String>,
    pub slippage_tolerance: Option<f64>,
    pub max_drawdown: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc4626Properties {
    pub asset_address: Option<String>,
    pub asset_name: Option<String>,
    pub asset_symbol: Option<String>,
    pub asset_decimals: Option<u32>,
    pub vault_type: Option<VaultType>,
    pub is_mintable: bool,
    pub is_burnable: bool,
    pub is_pausable: bool,
    pub deposit_fee: Option<f64>,
    pub withdrawal_fee: Option<f64>,
    pub management_fee: Option<f64>,
    pub performance_fee: Option<f64>,
    pub fee_recipient: Option<String>,
    pub min_deposit: Option<String>,
    pub max_deposit: Option<String>,
    pub min_withdrawal: Option<String>,
    pub max_withdrawal: Option<String>,
    pub yield_optimization_enabled: bool,
    pub automated_rebalancing: bool,
    pub strategy_controller: Option<String>,
    pub strategy_config: StrategyConfig,
}

impl Erc4626Properties {
    /// The four fee percentages with their form keys
    pub fn fees(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("depositFee", self.deposit_fee),
            ("withdrawalFee", self.withdrawal_fee),
            ("managementFee", self.management_fee),
            ("performanceFee", self.performance_fee),
        ]
    }
}

/// The one extension record of a token, tagged by standard
#[derive(Debug, Clone, PartialEq)]
pub enum TokenExtension {
    Erc20(Erc20Properties),
    Erc721(Erc721Properties),
    Erc1155(Erc1155Properties),
    Erc1400(Erc1400Properties),
    Erc3525(Erc3525Properties),
    Erc4626(Erc4626Properties),
}

impl TokenExtension {
    /// Default extension record for a freshly created token
    pub fn default_for(standard: TokenStandard) -> Self {
        match standard {
            TokenStandard::Erc20 => TokenExtension::Erc20(Erc20Properties::default()),
            TokenStandard::Erc721 => TokenExtension::Erc721(Erc721Properties::default()),
            TokenStandard::Erc1155 => TokenExtension::Erc1155(Erc1155Properties::default()),
            TokenStandard::Erc1400 => TokenExtension::Erc1400(Erc1400Properties::default()),
            TokenStandard::Erc3525 => TokenExtension::Erc3525(Erc3525Properties {
                value_decimals: Some(0),
                ..Erc3525Properties::default()
            }),
            TokenStandard::Erc4626 => TokenExtension::Erc4626(Erc4626Properties::default()),
        }
    }

    pub fn standard(&self) -> TokenStandard {
        match self {
            TokenExtension::Erc20(_) => TokenStandard::Erc20,
            TokenExtension::Erc721(_) => TokenStandard::Erc721,
            TokenExtension::Erc1155(_) => TokenStandard::Erc1155,
            TokenExtension::Erc1400(_) => TokenStandard::Erc1400,
            TokenExtension::Erc3525(_) => TokenStandard::Erc3525,
            TokenExtension::Erc4626(_) => TokenStandard::Erc4626,
        }
    }

    /// Serialize the untagged properties as a storage row body
    pub fn to_row(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            TokenExtension::Erc20(p) => serde_json::to_value(p)?,
            TokenExtension::Erc721(p) => serde_json::to_value(p)?,
            TokenExtension::Erc1155(p) => serde_json::to_value(p)?,
            TokenExtension::Erc1400(p) => serde_json::to_value(p)?,
            TokenExtension::Erc3525(p) => serde_json::to_value(p)?,
            TokenExtension::Erc4626(p) => serde_json::to_value(p)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Read a storage row body as the extension of `standard`
    pub fn from_row(
        standard: TokenStandard,
        row: Map<String, Value>,
    ) -> Result<Self, serde_json::Error> {
        let value = Value::Object(row);
        Ok(match standard {
            TokenStandard::Erc20 => TokenExtension::Erc20(serde_json::from_value(value)?),
            TokenStandard::Erc721 => TokenExtension::Erc721(serde_json::from_value(value)?),
            TokenStandard::Erc1155 => TokenExtension::Erc1155(serde_json::from_value(value)?),
            TokenStandard::Erc1400 => TokenExtension::Erc1400(serde_json::from_value(value)?),
            TokenStandard::Erc3525 => TokenExtension::Erc3525(serde_json::from_value(value)?),
            TokenStandard::Erc4626 => TokenExtension::Erc4626(serde_json::from_value(value)?),
        })
    }
}
