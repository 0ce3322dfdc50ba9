use crate::deployment::DeploymentRecord;
use crate::error::{TokenError, TokenResult};
use crate::extensions::TokenExtension;
use crate::id::TokenId;
use crate::objects::TokenRecord;
use crate::standard::TokenStandard;
use crate::status::TokenStatus;
use crate::subresources::SubResourceCollections;

/// A fully assembled point-in-time view of one token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAggregate {
    pub token: TokenRecord,
    pub extension: TokenExtension,
    pub sub_resources: SubResourceCollections,
    /// Current deployment attempt, if any
    pub deployment: Option<DeploymentRecord>,
}

impl TokenAggregate {
    /// Assemble an aggregate, refusing parts whose standard does not match
    /// the token's
    pub fn new(
        token: TokenRecord,
        extension: TokenExtension,
        sub_resources: SubResourceCollections,
        deployment: Option<DeploymentRecord>,
    ) -> TokenResult<Self> {
        if extension.standard() != token.standard {
            return Err(TokenError::Integrity(format!(
                "token {} is {} but its extension record is {}",
                token.id,
                token.standard,
                extension.standard()
            )));
        }
        if sub_resources.standard() != token.standard {
            return Err(TokenError::Integrity(format!(
                "token {} is {} but its sub-resources are {}",
                token.id,
                token.standard,
                sub_resources.standard()
            )));
        }
        if let Some(deployment) = &deployment {
            if deployment.token_id != token.id {
                return Err(TokenError::Integrity(format!(
                    "deployment {} belongs to token {}, not {}",
                    deployment.id, deployment.token_id, token.id
                )));
            }
        }
        Ok(Self {
            token,
            extension,
            sub_resources,
            deployment,
        })
    }

    /// A new token with default extension and no children
    pub fn fresh(token: TokenRecord) -> Self {
        let standard = token.standard;
        Self {
            token,
            extension: TokenExtension::default_for(standard),
            sub_resources: SubResourceCollections::empty(standard),
            deployment: None,
        }
    }

    pub fn id(&self) -> TokenId {
        self.token.id
    }

    pub fn standard(&self) -> TokenStandard {
        self.token.standard
    }

    pub fn status(&self) -> TokenStatus {
        self.token.status
    }
}
