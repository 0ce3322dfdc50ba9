//! Core model of the tokenforge engine: identifiers, errors, the six token
//! standards, the lifecycle state machine, shared validation primitives, the
//! schema registry and the typed token aggregate.

pub mod aggregate;
pub mod deployment;
pub mod error;
pub mod extensions;
pub mod findings;
pub mod id;
pub mod lifecycle;
pub mod objects;
pub mod schema;
pub mod standard;
pub mod status;
pub mod subresources;
pub mod tiers;
pub mod validation;

// Re-export the main types for convenience
pub use aggregate::TokenAggregate;
pub use deployment::{DeploymentRecord, DeploymentStatus, NetworkEnvironment};
pub use error::{FieldIssue, FieldProblem, StorageError, TokenError, TokenResult};
pub use extensions::TokenExtension;
pub use findings::{SecurityValidationResult, Severity, ValidationFinding};
pub use id::{ProjectId, TokenId};
pub use lifecycle::{StatusChange, TransitionOrigin};
pub use objects::{ConfigMode, TokenRecord, TokenTier};
pub use standard::TokenStandard;
pub use status::{parse_status, TokenStatus};
pub use subresources::{SubResourceCollections, SubResourceKind};
pub use tiers::{classify, ParentKey, TierClassification};
