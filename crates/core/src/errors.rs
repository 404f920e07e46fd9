use thiserror::Error;

use crate::domain::bid::BidId;
use crate::flows::FlowTransitionError;
use crate::jobs::QueueError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TenderError {
    #[error(transparent)]
    InvalidTransition(#[from] FlowTransitionError),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error("bid `{0}` is already withdrawn")]
    AlreadyWithdrawn(BidId),
    #[error("a company cannot bid on its own tender")]
    SelfBidding,
    #[error("actor must belong to a company")]
    Unassigned,
    #[error("award requires a non-empty justification")]
    EmptyJustification,
    #[error("invalid award target: {0}")]
    InvalidBid(String),
    #[error("award ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl TenderError {
    pub fn tender_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "tender", id: id.into() }
    }

    pub fn bid_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { entity: "bid", id: id.into() }
    }

    /// Stable machine-readable class for logs and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidState(_) => "invalid_state",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyWithdrawn(_) => "already_withdrawn",
            Self::SelfBidding => "self_bidding",
            Self::Unassigned => "unassigned",
            Self::EmptyJustification => "empty_justification",
            Self::InvalidBid(_) => "invalid_bid",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::Validation(_) => "validation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] TenderError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("job queue failure: {0}")]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApplicationError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Domain(error) => error.class(),
            Self::Persistence(StoreError::VersionConflict { .. }) => "version_conflict",
            Self::Persistence(_) => "persistence",
            Self::Queue(_) => "queue",
            Self::Ledger(_) => "ledger",
        }
    }

    /// Whether an asynchronous job hitting this error should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Domain(TenderError::LedgerUnavailable(_)) => true,
            Self::Domain(_) => false,
            Self::Persistence(StoreError::Decode(_)) => false,
            Self::Persistence(_) => true,
            Self::Queue(_) => false,
            Self::Ledger(error) => error.is_retryable(),
        }
    }

    /// Ledger outages surface as the domain's `LedgerUnavailable`; other ledger failures stay
    /// infrastructure errors.
    pub fn from_ledger(error: LedgerError) -> Self {
        match error {
            LedgerError::Unavailable(message) => {
                Self::Domain(TenderError::LedgerUnavailable(message))
            }
            other => Self::Ledger(other),
        }
    }

    pub fn as_domain(&self) -> Option<&TenderError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }
}
