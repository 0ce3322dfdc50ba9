//! Lifecycle state machine for token status
//!
//! Pure logic: the table below is the only authority on which status edges
//! exist. Storage applies the result with an optimistic status check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TokenError, TokenResult};
use crate::id::TokenId;
use crate::status::TokenStatus;

use TokenStatus::*;

/// Permitted directed edges
pub const TRANSITIONS: &[(TokenStatus, TokenStatus)] = &[
    (Draft, Review),
    (Review, Approved),
    (Review, Rejected),
    (Approved, ReadyToMint),
    (Approved, Rejected),
    (ReadyToMint, Minted),
    (Minted, Deployed),
    (Deployed, Paused),
    (Paused, Deployed),
    (Deployed, Distributed),
];

/// Status every new token starts in
pub const INITIAL_STATUS: TokenStatus = Draft;

/// Who is asking for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOrigin {
    /// A user-facing caller (review, approval, pause, ...)
    Caller,
    /// The deployment orchestrator reacting to a confirmed deployment
    Orchestrator,
}

/// Whether `from → to` is an edge of the lifecycle table
pub fn can_transition(from: TokenStatus, to: TokenStatus) -> bool {
    TRANSITIONS.iter().any(|&(f, t)| f == from && t == to)
}

/// States reachable in one step from `from`
pub fn allowed_targets(from: TokenStatus) -> Vec<TokenStatus> {
    TRANSITIONS
        .iter()
        .filter(|(f, _)| *f == from)
        .map(|(_, t)| *t)
        .collect()
}

/// A state with no outgoing edge
pub fn is_terminal(status: TokenStatus) -> bool {
    !TRANSITIONS.iter().any(|(f, _)| *f == status)
}

/// Edges that only a confirmed deployment may take
pub fn is_reserved(from: TokenStatus, to: TokenStatus) -> bool {
    from == Minted && to == Deployed
}

/// Validate a requested transition without applying it
pub fn check_transition(
    from: TokenStatus,
    to: TokenStatus,
    origin: TransitionOrigin,
) -> TokenResult<()> {
    if !can_transition(from, to) {
        return Err(TokenError::InvalidTransition { from, to });
    }
    if is_reserved(from, to) && origin != TransitionOrigin::Orchestrator {
        return Err(TokenError::TransitionReserved { from, to });
    }
    Ok(())
}

/// Record of one applied transition, persisted as status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub token_id: TokenId,
    pub from_status: TokenStatus,
    pub to_status: TokenStatus,
    #[serde(default)]
    pub actor: Option<String>,
    /// Value of the token's transition counter after this change
    pub sequence: u64,
    pub changed_at: DateTime<Utc>,
}

/// A validated transition ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTransition {
    pub change: StatusChange,
}

impl PlannedTransition {
    /// Plan `from → to` for a token whose counter currently reads `transition_count`
    pub fn plan(
        token_id: TokenId,
        from: TokenStatus,
        to: TokenStatus,
        transition_count: u64,
        origin: TransitionOrigin,
        actor: Option<String>,
    ) -> TokenResult<Self> {
        check_transition(from, to, origin)?;
        Ok(Self {
            change: StatusChange {
                token_id,
                from_status: from,
                to_status: to,
                actor,
                sequence: transition_count + 1,
                changed_at: Utc::now(),
            },
        })
    }

    pub fn from_status(&self) -> TokenStatus {
        self.change.from_status
    }

    pub fn to_status(&self) -> TokenStatus {
        self.change.to_status
    }
}
