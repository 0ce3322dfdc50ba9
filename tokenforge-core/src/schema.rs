//! Standard schema registry
//!
//! Declares, for each standard, the fields of its extension record and the
//! shape of each repeatable sub-resource collection. The field mapper and the
//! deployment gate are both driven by these tables, so a field declared here
//! is carried through every form/storage round trip.

use crate::standard::TokenStandard;
use crate::subresources::SubResourceKind;
use crate::validation::{bounded_decimal, non_negative_decimal, BoundedDecimal};

/// How a field is validated and coerced between form and storage
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Free text, stored as a string
    Text,
    Bool,
    /// Whole number within bounds, stored as a JSON number
    Integer { min: u64, max: u64 },
    /// Bounded decimal carried as a string in forms and stored as a JSON number
    Decimal(BoundedDecimal),
    /// Bounded decimal stored as canonical text to keep full precision
    Amount(BoundedDecimal),
    /// `0x`-prefixed 40 hex digit address
    Address,
    /// One of a fixed set of lowercase options
    Choice(&'static [&'static str]),
    /// List of strings
    StringList,
    /// Nested configuration object, mapped key by key
    Object(&'static [FieldSpec]),
}

/// When a field must carry a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Optional,
    /// Must be present before the record may be stored
    Storage,
    /// May be left empty while drafting but must be present to deploy
    Deployment,
}

/// A declared field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// camelCase key in the flat form representation
    pub form_key: &'static str,
    /// snake_case key in the storage row
    pub storage_key: &'static str,
    pub kind: FieldKind,
    pub requirement: Requirement,
}

impl FieldSpec {
    pub const fn new(form_key: &'static str, storage_key: &'static str, kind: FieldKind) -> Self {
        Self {
            form_key,
            storage_key,
            kind,
            requirement: Requirement::Optional,
        }
    }

    pub const fn required(mut self) -> Self {
        self.requirement = Requirement::Storage;
        self
    }

    pub const fn deploy_required(mut self) -> Self {
        self.requirement = Requirement::Deployment;
        self
    }
}

/// A repeatable child collection of a token
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub kind: SubResourceKind,
    /// Key of the array in the form representation
    pub form_key: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Everything the registry knows about one standard
#[derive(Debug, Clone, Copy)]
pub struct StandardSchema {
    pub standard: TokenStandard,
    pub fields: &'static [FieldSpec],
    pub collections: &'static [CollectionSpec],
}

impl StandardSchema {
    pub fn extension_table(&self) -> &'static str {
        self.standard.extension_table()
    }

    pub fn field(&self, form_key: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.form_key == form_key)
    }

    pub fn collection(&self, kind: SubResourceKind) -> Option<&'static CollectionSpec> {
        self.collections.iter().find(|c| c.kind == kind)
    }
}

const PERCENT: FieldKind = FieldKind::Decimal(bounded_decimal(0, 100));
const AMOUNT: FieldKind = FieldKind::Amount(non_negative_decimal());
const APY: FieldKind = FieldKind::Decimal(bounded_decimal(0, 1000));
const TEXT: FieldKind = FieldKind::Text;
const BOOL: FieldKind = FieldKind::Bool;
const ADDRESS: FieldKind = FieldKind::Address;

const METADATA_STORAGE: FieldKind = FieldKind::Choice(&["ipfs", "arweave", "centralized", "onchain"]);

/// Core token fields that travel through the form next to the extension
pub static CORE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", TEXT).required(),
    FieldSpec::new("symbol", "symbol", TEXT).required(),
    FieldSpec::new("decimals", "decimals", FieldKind::Integer { min: 0, max: 18 }),
    FieldSpec::new("description", "description", TEXT),
    FieldSpec::new("configMode", "config_mode", FieldKind::Choice(&["min", "max"])),
    FieldSpec::new("parentTokenId", "parent_token_id", TEXT),
    FieldSpec::new("tier", "tier", FieldKind::Choice(&["primary", "secondary", "tertiary"])),
];

/// Form keys that never pass through the mapper
pub static RESERVED_FORM_KEYS: &[&str] = &[
    "id",
    "projectId",
    "standard",
    "status",
    "transitionCount",
    "createdAt",
    "updatedAt",
    "metadata",
    "blocks",
];

const FEE_ON_TRANSFER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("enabled", "enabled", BOOL),
    FieldSpec::new("fee", "fee", PERCENT),
    FieldSpec::new("recipient", "recipient", ADDRESS),
    FieldSpec::new("feeType", "fee_type", FieldKind::Choice(&["percentage", "fixed"])),
];

const ERC20_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("initialSupply", "initial_supply", AMOUNT),
    FieldSpec::new("cap", "cap", AMOUNT),
    FieldSpec::new("isMintable", "is_mintable", BOOL),
    FieldSpec::new("isBurnable", "is_burnable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("accessControl", "access_control", FieldKind::Choice(&["ownable", "roles", "none"])),
    FieldSpec::new("allowManagement", "allow_management", BOOL),
    FieldSpec::new("feeOnTransfer", "fee_on_transfer", FieldKind::Object(FEE_ON_TRANSFER_FIELDS)),
];

const ERC721_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("baseUri", "base_uri", TEXT).deploy_required(),
    FieldSpec::new("metadataStorage", "metadata_storage", METADATA_STORAGE),
    FieldSpec::new("maxSupply", "max_supply", AMOUNT),
    FieldSpec::new("hasRoyalty", "has_royalty", BOOL),
    FieldSpec::new("royaltyPercentage", "royalty_percentage", PERCENT),
    FieldSpec::new("royaltyReceiver", "royalty_receiver", ADDRESS),
    FieldSpec::new("isBurnable", "is_burnable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("enumerable", "enumerable", BOOL),
    FieldSpec::new("autoIncrementIds", "auto_increment_ids", BOOL),
    FieldSpec::new(
        "mintingMethod",
        "minting_method",
        FieldKind::Choice(&["open", "whitelist", "auction", "lazy"]),
    ),
];

const ERC721_ATTRIBUTE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("traitType", "trait_type", TEXT).required(),
    FieldSpec::new("values", "values", FieldKind::StringList),
];

const ERC1155_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("baseUri", "base_uri", TEXT).deploy_required(),
    FieldSpec::new("metadataStorage", "metadata_storage", METADATA_STORAGE),
    FieldSpec::new("hasRoyalty", "has_royalty", BOOL),
    FieldSpec::new("royaltyPercentage", "royalty_percentage", PERCENT),
    FieldSpec::new("royaltyReceiver", "royalty_receiver", ADDRESS),
    FieldSpec::new("isBurnable", "is_burnable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("batchMintingEnabled", "batch_minting_enabled", BOOL),
    FieldSpec::new("supplyTracking", "supply_tracking", BOOL),
];

const ERC1155_TYPE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("tokenTypeId", "token_type_id", TEXT).required(),
    FieldSpec::new("name", "name", TEXT),
    FieldSpec::new("description", "description", TEXT),
    FieldSpec::new("maxSupply", "max_supply", AMOUNT),
    FieldSpec::new("fungible", "fungible", BOOL),
];

const ERC1155_BALANCE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("tokenTypeId", "token_type_id", TEXT).required(),
    FieldSpec::new("address", "address", ADDRESS).required(),
    FieldSpec::new("amount", "amount", AMOUNT).required(),
];

const ERC1155_URI_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("tokenTypeId", "token_type_id", TEXT).required(),
    FieldSpec::new("uri", "uri", TEXT).required(),
];

const ERC1400_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("initialSupply", "initial_supply", AMOUNT),
    FieldSpec::new("cap", "cap", AMOUNT),
    FieldSpec::new(
        "securityType",
        "security_type",
        FieldKind::Choice(&["equity", "debt", "derivative", "fund", "reit", "other"]),
    )
    .deploy_required(),
    FieldSpec::new("issuingJurisdiction", "issuing_jurisdiction", TEXT).deploy_required(),
    FieldSpec::new("issuingEntityName", "issuing_entity_name", TEXT),
    FieldSpec::new("issuingEntityLei", "issuing_entity_lei", TEXT),
    FieldSpec::new("isIssuable", "is_issuable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("granularControl", "granular_control", BOOL),
    FieldSpec::new("forcedTransfers", "forced_transfers", BOOL),
    FieldSpec::new("kycRequired", "kyc_required", BOOL),
    FieldSpec::new("whitelistEnabled", "whitelist_enabled", BOOL),
];

const ERC1400_PARTITION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", TEXT).required(),
    FieldSpec::new("partitionId", "partition_id", TEXT).required(),
    FieldSpec::new("amount", "amount", AMOUNT),
    FieldSpec::new("transferable", "transferable", BOOL),
];

const ERC1400_CONTROLLER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("address", "address", ADDRESS).required(),
    FieldSpec::new("permissions", "permissions", FieldKind::StringList),
];

const ERC1400_DOCUMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", TEXT).required(),
    FieldSpec::new("documentUri", "document_uri", TEXT).required(),
    FieldSpec::new("documentType", "document_type", TEXT),
    FieldSpec::new("documentHash", "document_hash", TEXT),
];

const ERC3525_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("valueDecimals", "value_decimals", FieldKind::Integer { min: 0, max: 18 }).required(),
    FieldSpec::new("baseUri", "base_uri", TEXT),
    FieldSpec::new("metadataStorage", "metadata_storage", METADATA_STORAGE),
    FieldSpec::new("slotType", "slot_type", TEXT),
    FieldSpec::new("isBurnable", "is_burnable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("slotApprovals", "slot_approvals", BOOL),
    FieldSpec::new("valueApprovals", "value_approvals", BOOL),
    FieldSpec::new("updatableSlots", "updatable_slots", BOOL),
    FieldSpec::new("valueTransfersEnabled", "value_transfers_enabled", BOOL),
    FieldSpec::new("hasRoyalty", "has_royalty", BOOL),
    FieldSpec::new("royaltyPercentage", "royalty_percentage", PERCENT),
    FieldSpec::new("royaltyReceiver", "royalty_receiver", ADDRESS),
];

const ERC3525_SLOT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("slotId", "slot_id", TEXT).required(),
    FieldSpec::new("slotName", "slot_name", TEXT),
    FieldSpec::new("slotDescription", "slot_description", TEXT),
    FieldSpec::new("valueUnits", "value_units", TEXT),
    FieldSpec::new("transferable", "transferable", BOOL),
];

const ERC3525_ALLOCATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("slotId", "slot_id", TEXT).required(),
    FieldSpec::new("tokenIdWithinSlot", "token_id_within_slot", TEXT),
    FieldSpec::new("value", "value", AMOUNT).required(),
    FieldSpec::new("recipient", "recipient", ADDRESS),
];

const STRATEGY_CONFIG_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("rebalanceThreshold", "rebalance_threshold", PERCENT),
    FieldSpec::new("harvestFrequency", "harvest_frequency", TEXT),
    FieldSpec::new("slippageTolerance", "slippage_tolerance", PERCENT),
    FieldSpec::new("maxDrawdown", "max_drawdown", PERCENT),
];

const ERC4626_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("assetAddress", "asset_address", ADDRESS).required(),
    FieldSpec::new("assetName", "asset_name", TEXT),
    FieldSpec::new("assetSymbol", "asset_symbol", TEXT),
    FieldSpec::new("assetDecimals", "asset_decimals", FieldKind::Integer { min: 0, max: 18 }),
    FieldSpec::new(
        "vaultType",
        "vault_type",
        FieldKind::Choice(&["yield", "fund", "staking", "lending"]),
    ),
    FieldSpec::new("isMintable", "is_mintable", BOOL),
    FieldSpec::new("isBurnable", "is_burnable", BOOL),
    FieldSpec::new("isPausable", "is_pausable", BOOL),
    FieldSpec::new("depositFee", "deposit_fee", PERCENT),
    FieldSpec::new("withdrawalFee", "withdrawal_fee", PERCENT),
    FieldSpec::new("managementFee", "management_fee", PERCENT),
    FieldSpec::new("performanceFee", "performance_fee", PERCENT),
    FieldSpec::new("feeRecipient", "fee_recipient", ADDRESS),
    FieldSpec::new("minDeposit", "min_deposit", AMOUNT),
    FieldSpec::new("maxDeposit", "max_deposit", AMOUNT),
    FieldSpec::new("minWithdrawal", "min_withdrawal", AMOUNT),
    FieldSpec::new("maxWithdrawal", "max_withdrawal", AMOUNT),
    FieldSpec::new("yieldOptimizationEnabled", "yield_optimization_enabled", BOOL),
    FieldSpec::new("automatedRebalancing", "automated_rebalancing", BOOL),
    FieldSpec::new("strategyController", "strategy_controller", ADDRESS),
    FieldSpec::new("strategyConfig", "strategy_config", FieldKind::Object(STRATEGY_CONFIG_FIELDS)),
];

const ERC4626_STRATEGY_PARAM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", TEXT).required(),
    FieldSpec::new("value", "value", TEXT),
    FieldSpec::new(
        "paramType",
        "param_type",
        FieldKind::Choice(&["string", "number", "boolean", "address"]),
    ),
    FieldSpec::new("isRequired", "is_required", BOOL),
];

const ERC4626_ALLOCATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("asset", "asset", TEXT).required(),
    FieldSpec::new("percentage", "percentage", PERCENT).required(),
    FieldSpec::new("protocol", "protocol", TEXT),
    FieldSpec::new("expectedApy", "expected_apy", APY),
];

static ERC20_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc20,
    fields: ERC20_FIELDS,
    collections: &[],
};

static ERC721_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc721,
    fields: ERC721_FIELDS,
    collections: &[CollectionSpec {
        kind: SubResourceKind::Erc721Attributes,
        form_key: "tokenAttributes",
        fields: ERC721_ATTRIBUTE_FIELDS,
    }],
};

static ERC1155_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc1155,
    fields: ERC1155_FIELDS,
    collections: &[
        CollectionSpec {
            kind: SubResourceKind::Erc1155Types,
            form_key: "tokenTypes",
            fields: ERC1155_TYPE_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc1155Balances,
            form_key: "initialBalances",
            fields: ERC1155_BALANCE_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc1155UriMappings,
            form_key: "uriMappings",
            fields: ERC1155_URI_FIELDS,
        },
    ],
};

static ERC1400_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc1400,
    fields: ERC1400_FIELDS,
    collections: &[
        CollectionSpec {
            kind: SubResourceKind::Erc1400Partitions,
            form_key: "partitions",
            fields: ERC1400_PARTITION_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc1400Controllers,
            form_key: "controllers",
            fields: ERC1400_CONTROLLER_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc1400Documents,
            form_key: "documents",
            fields: ERC1400_DOCUMENT_FIELDS,
        },
    ],
};

static ERC3525_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc3525,
    fields: ERC3525_FIELDS,
    collections: &[
        CollectionSpec {
            kind: SubResourceKind::Erc3525Slots,
            form_key: "slots",
            fields: ERC3525_SLOT_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc3525Allocations,
            form_key: "allocations",
            fields: ERC3525_ALLOCATION_FIELDS,
        },
    ],
};

static ERC4626_SCHEMA: StandardSchema = StandardSchema {
    standard: TokenStandard::Erc4626,
    fields: ERC4626_FIELDS,
    collections: &[
        CollectionSpec {
            kind: SubResourceKind::Erc4626StrategyParams,
            form_key: "strategyParams",
            fields: ERC4626_STRATEGY_PARAM_FIELDS,
        },
        CollectionSpec {
            kind: SubResourceKind::Erc4626AssetAllocations,
            form_key: "assetAllocations",
            fields: ERC4626_ALLOCATION_FIELDS,
        },
    ],
};

/// Look up the schema for a standard
pub fn schema_for(standard: TokenStandard) -> &'static StandardSchema {
    match standard {
        TokenStandard::Erc20 => &ERC20_SCHEMA,
        TokenStandard::Erc721 => &ERC721_SCHEMA,
        TokenStandard::Erc1155 => &ERC1155_SCHEMA,
        TokenStandard::Erc1400 => &ERC1400_SCHEMA,
        TokenStandard::Erc3525 => &ERC3525_SCHEMA,
        TokenStandard::Erc4626 => &ERC4626_SCHEMA,
    }
}
