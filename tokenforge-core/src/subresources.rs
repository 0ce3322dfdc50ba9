use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::standard::TokenStandard;

/// Every kind of repeatable child record, one table each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubResourceKind {
    Erc721Attributes,
    Erc1155Types,
    Erc1155Balances,
    Erc1155UriMappings,
    Erc1400Partitions,
    Erc1400Controllers,
    Erc1400Documents,
    Erc3525Slots,
    Erc3525Allocations,
    Erc4626StrategyParams,
    Erc4626AssetAllocations,
}

impl SubResourceKind {
    pub const ALL: [SubResourceKind; 11] = [
        SubResourceKind::Erc721Attributes,
        SubResourceKind::Erc1155Types,
        SubResourceKind::Erc1155Balances,
        SubResourceKind::Erc1155UriMappings,
        SubResourceKind::Erc1400Partitions,
        SubResourceKind::Erc1400Controllers,
        SubResourceKind::Erc1400Documents,
        SubResourceKind::Erc3525Slots,
        SubResourceKind::Erc3525Allocations,
        SubResourceKind::Erc4626StrategyParams,
        SubResourceKind::Erc4626AssetAllocations,
    ];

    /// The standard whose tokens own rows of this kind
    pub fn standard(&self) -> TokenStandard {
        match self {
            SubResourceKind::Erc721Attributes => TokenStandard::Erc721,
            SubResourceKind::Erc1155Types
            | SubResourceKind::Erc1155Balances
            | SubResourceKind::Erc1155UriMappings => TokenStandard::Erc1155,
            SubResourceKind::Erc1400Partitions
            | SubResourceKind::Erc1400Controllers
            | SubResourceKind::Erc1400Documents => TokenStandard::Erc1400,
            SubResourceKind::Erc3525Slots | SubResourceKind::Erc3525Allocations => {
                TokenStandard::Erc3525
            }
            SubResourceKind::Erc4626StrategyParams
            | SubResourceKind::Erc4626AssetAllocations => TokenStandard::Erc4626,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            SubResourceKind::Erc721Attributes => "token_erc721_attributes",
            SubResourceKind::Erc1155Types => "token_erc1155_types",
            SubResourceKind::Erc1155Balances => "token_erc1155_balances",
            SubResourceKind::Erc1155UriMappings => "token_erc1155_uri_mappings",
            SubResourceKind::Erc1400Partitions => "token_erc1400_partitions",
            SubResourceKind::Erc1400Controllers => "token_erc1400_controllers",
            SubResourceKind::Erc1400Documents => "token_erc1400_documents",
            SubResourceKind::Erc3525Slots => "token_erc3525_slots",
            SubResourceKind::Erc3525Allocations => "token_erc3525_allocations",
            SubResourceKind::Erc4626StrategyParams => "token_erc4626_strategy_params",
            SubResourceKind::Erc4626AssetAllocations => "token_erc4626_asset_allocations",
        }
    }

    /// Kinds owned by a standard, in schema order
    pub fn for_standard(standard: TokenStandard) -> impl Iterator<Item = SubResourceKind> {
        Self::ALL.into_iter().filter(move |k| k.standard() == standard)
    }
}

impl fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc721Attribute {
    pub trait_type: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1155TokenType {
    pub token_type_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_supply: Option<String>,
    pub fungible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1155Balance {
    pub token_type_id: String,
    pub address: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1155UriMapping {
    pub token_type_id: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1400Partition {
    pub name: String,
    pub partition_id: String,
    pub amount: Option<String>,
    pub transferable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1400Controller {
    pub address: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc1400Document {
    pub name: String,
    pub document_uri: String,
    pub document_type: Option<String>,
    pub document_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc3525Slot {
    pub slot_id: String,
    pub slot_name: Option<String>,
    pub slot_description: Option<String>,
    pub value_units: Option<String>,
    pub transferable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc3525Allocation {
    pub slot_id: String,
    pub token_id_within_slot: Option<String>,
    pub value: String,
    pub recipient: Option<String>,
}

/// Declared type of a named strategy parameter's value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Boolean,
    Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc4626StrategyParam {
    pub name: String,
    pub value: Option<String>,
    pub param_type: Option<ParamType>,
    pub is_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Erc4626AssetAllocation {
    pub asset: String,
    pub percentage: f64,
    pub protocol: Option<String>,
    pub expected_apy: Option<f64>,
}

/// Rows grouped by kind, as read from or written to storage
pub type SubResourceRows = HashMap<SubResourceKind, Vec<Map<String, Value>>>;

/// The child collections of one token, shaped by its standard
#[derive(Debug, Clone, PartialEq)]
pub enum SubResourceCollections {
    Erc20,
    Erc721 {
        attributes: Vec<Erc721Attribute>,
    },
    Erc1155 {
        types: Vec<Erc1155TokenType>,
        balances: Vec<Erc1155Balance>,
        uri_mappings: Vec<Erc1155UriMapping>,
    },
    Erc1400 {
        partitions: Vec<Erc1400Partition>,
        controllers: Vec<Erc1400Controller>,
        documents: Vec<Erc1400Document>,
    },
    Erc3525 {
        slots: Vec<Erc3525Slot>,
        allocations: Vec<Erc3525Allocation>,
    },
    Erc4626 {
        strategy_params: Vec<Erc4626StrategyParam>,
        asset_allocations: Vec<Erc4626AssetAllocation>,
    },
}

fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Map<String, Value>>, serde_json::Error> {
    items
        .iter()
        .map(|item| match serde_json::to_value(item)? {
            Value::Object(map) => Ok(map),
            other => Ok(Map::from_iter([("value".to_string(), other)])),
        })
        .collect()
}

fn from_rows<T: DeserializeOwned>(
    rows: &mut SubResourceRows,
    kind: SubResourceKind,
) -> Result<Vec<T>, serde_json::Error> {
    rows.remove(&kind)
        .unwrap_or_default()
        .into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)))
        .collect()
}

impl SubResourceCollections {
    /// Empty collections for a standard
    pub fn empty(standard: TokenStandard) -> Self {
        match standard {
            TokenStandard::Erc20 => SubResourceCollections::Erc20,
            TokenStandard::Erc721 => SubResourceCollections::Erc721 {
                attributes: Vec::new(),
            },
            TokenStandard::Erc1155 => SubResourceCollections::Erc1155 {
                types: Vec::new(),
                balances: Vec::new(),
                uri_mappings: Vec::new(),
            },
            TokenStandard::Erc1400 => SubResourceCollections::Erc1400 {
                partitions: Vec::new(),
                controllers: Vec::new(),
                documents: Vec::new(),
            },
            TokenStandard::Erc3525 => SubResourceCollections::Erc3525 {
                slots: Vec::new(),
                allocations: Vec::new(),
            },
            TokenStandard::Erc4626 => SubResourceCollections::Erc4626 {
                strategy_params: Vec::new(),
                asset_allocations: Vec::new(),
            },
        }
    }

    pub fn standard(&self) -> TokenStandard {
        match self {
            SubResourceCollections::Erc20 => TokenStandard::Erc20,
            SubResourceCollections::Erc721 { .. } => TokenStandard::Erc721,
            SubResourceCollections::Erc1155 { .. } => TokenStandard::Erc1155,
            SubResourceCollections::Erc1400 { .. } => TokenStandard::Erc1400,
            SubResourceCollections::Erc3525 { .. } => TokenStandard::Erc3525,
            SubResourceCollections::Erc4626 { .. } => TokenStandard::Erc4626,
        }
    }

    /// Serialize every collection to storage rows (without `id`, `token_id`
    /// or `position`, which the loader adds)
    pub fn to_rows(&self) -> Result<SubResourceRows, serde_json::Error> {
        let mut rows = SubResourceRows::new();
        match self {
            SubResourceCollections::Erc20 => {}
            SubResourceCollections::Erc721 { attributes } => {
                rows.insert(SubResourceKind::Erc721Attributes, to_rows(attributes)?);
            }
            SubResourceCollections::Erc1155 {
                types,
                balances,
                uri_mappings,
            } => {
                rows.insert(SubResourceKind::Erc1155Types, to_rows(types)?);
                rows.insert(SubResourceKind::Erc1155Balances, to_rows(balances)?);
                rows.insert(SubResourceKind::Erc1155UriMappings, to_rows(uri_mappings)?);
            }
            SubResourceCollections::Erc1400 {
                partitions,
                controllers,
                documents,
            } => {
                rows.insert(SubResourceKind::Erc1400Partitions, to_rows(partitions)?);
                rows.insert(SubResourceKind::Erc1400Controllers, to_rows(controllers)?);
                rows.insert(SubResourceKind::Erc1400Documents, to_rows(documents)?);
            }
            SubResourceCollections::Erc3525 { slots, allocations } => {
                rows.insert(SubResourceKind::Erc3525Slots, to_rows(slots)?);
                rows.insert(SubResourceKind::Erc3525Allocations, to_rows(allocations)?);
            }
            SubResourceCollections::Erc4626 {
                strategy_params,
                asset_allocations,
            } => {
                rows.insert(SubResourceKind::Erc4626StrategyParams, to_rows(strategy_params)?);
                rows.insert(
                    SubResourceKind::Erc4626AssetAllocations,
                    to_rows(asset_allocations)?,
                );
            }
        }
        Ok(rows)
    }

    /// Rebuild typed collections from storage rows. Kinds with no rows read
    /// as empty collections; unknown row keys are ignored.
    pub fn from_rows(
        standard: TokenStandard,
        mut rows: SubResourceRows,
    ) -> Result<Self, serde_json::Error> {
        let rows = &mut rows;
        Ok(match standard {
            TokenStandard::Erc20 => SubResourceCollections::Erc20,
            TokenStandard::Erc721 => SubResourceCollections::Erc721 {
                attributes: from_rows(rows, SubResourceKind::Erc721Attributes)?,
            },
            TokenStandard::Erc1155 => SubResourceCollections::Erc1155 {
                types: from_rows(rows, SubResourceKind::Erc1155Types)?,
                balances: from_rows(rows, SubResourceKind::Erc1155Balances)?,
                uri_mappings: from_rows(rows, SubResourceKind::Erc1155UriMappings)?,
            },
            TokenStandard::Erc1400 => SubResourceCollections::Erc1400 {
                partitions: from_rows(rows, SubResourceKind::Erc1400Partitions)?,
                controllers: from_rows(rows, SubResourceKind::Erc1400Controllers)?,
                documents: from_rows(rows, SubResourceKind::Erc1400Documents)?,
            },
            TokenStandard::Erc3525 => SubResourceCollections::Erc3525 {
                slots: from_rows(rows, SubResourceKind::Erc3525Slots)?,
                allocations: from_rows(rows, SubResourceKind::Erc3525Allocations)?,
            },
            TokenStandard::Erc4626 => SubResourceCollections::Erc4626 {
                strategy_params: from_rows(rows, SubResourceKind::Erc4626StrategyParams)?,
                asset_allocations: from_rows(rows, SubResourceKind::Erc4626AssetAllocations)?,
            },
        })
    }

    /// Total number of child rows
    pub fn len(&self) -> usize {
        match self {
            SubResourceCollections::Erc20 => 0,
            SubResourceCollections::Erc721 { attributes } => attributes.len(),
            SubResourceCollections::Erc1155 {
                types,
                balances,
                uri_mappings,
            } => types.len() + balances.len() + uri_mappings.len(),
            SubResourceCollections::Erc1400 {
                partitions,
                controllers,
                documents,
            } => partitions.len() + controllers.len() + documents.len(),
            SubResourceCollections::Erc3525 { slots, allocations } => {
                slots.len() + allocations.len()
            }
            SubResourceCollections::Erc4626 {
                strategy_params,
                asset_allocations,
            } => strategy_params.len() + asset_allocations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
