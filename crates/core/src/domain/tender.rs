use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{CompanyId, UserId};
use crate::domain::bid::BidId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenderId(pub String);

impl fmt::Display for TenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Draft,
    Published,
    Open,
    Evaluation,
    Closed,
    Awarded,
    Cancelled,
}

impl TenderStatus {
    pub const ALL: [TenderStatus; 7] = [
        Self::Draft,
        Self::Published,
        Self::Open,
        Self::Evaluation,
        Self::Closed,
        Self::Awarded,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Open => "open",
            Self::Evaluation => "evaluation",
            Self::Closed => "closed",
            Self::Awarded => "awarded",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "open" => Some(Self::Open),
            "evaluation" => Some(Self::Evaluation),
            "closed" => Some(Self::Closed),
            "awarded" => Some(Self::Awarded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn can_receive_bids(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn can_edit_core_fields(&self) -> bool {
        matches!(self, Self::Draft | Self::Published)
    }

    pub fn can_evaluate_bids(&self) -> bool {
        matches!(self, Self::Evaluation | Self::Closed)
    }

    pub fn can_be_awarded(&self) -> bool {
        matches!(self, Self::Evaluation)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Awarded | Self::Cancelled)
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}

/// Award facts; present as a unit or not at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardOutcome {
    pub winning_bid_id: BidId,
    pub awarded_at: DateTime<Utc>,
    pub justification: String,
    pub awarded_by: UserId,
}

/// Proof returned by the award ledger once the award has been mirrored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProof {
    pub content_hash: String,
    pub commit_ref: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    pub id: TenderId,
    pub title: String,
    pub description: String,
    pub closing_at: DateTime<Utc>,
    pub publish_at: Option<DateTime<Utc>>,
    pub budget: Option<Decimal>,
    pub owner_company_id: CompanyId,
    pub status: TenderStatus,
    pub status_changed_at: DateTime<Utc>,
    pub cancellation: Option<Cancellation>,
    pub award: Option<AwardOutcome>,
    pub ledger_proof: Option<LedgerProof>,
    /// Optimistic concurrency token, bumped on every persisted tender mutation.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    pub fn accepts_bids_at(&self, now: DateTime<Utc>) -> bool {
        self.status.can_receive_bids() && now < self.closing_at
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.closing_at
    }

    pub fn winning_bid_id(&self) -> Option<&BidId> {
        self.award.as_ref().map(|award| &award.winning_bid_id)
    }

    /// Awarded and not yet carrying a ledger proof.
    pub fn awaiting_ledger_commit(&self) -> bool {
        self.status == TenderStatus::Awarded && self.ledger_proof.is_none()
    }
}
