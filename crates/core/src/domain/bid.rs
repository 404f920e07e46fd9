use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::CompanyId;
use crate::domain::tender::TenderId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BidId(pub String);

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Shortlisted,
    Accepted,
    Rejected,
    Withdrawn,
    Superseded,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shortlisted => "shortlisted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Superseded => "superseded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "shortlisted" => Some(Self::Shortlisted),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    /// Still competing for the award.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Shortlisted)
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub reason: String,
    pub withdrawn_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub tender_id: TenderId,
    pub company_id: CompanyId,
    pub amount: Decimal,
    /// Opaque handle to the attached document; storage lives elsewhere.
    pub document_ref: Option<String>,
    pub status: BidStatus,
    pub revision: u32,
    /// Immediate predecessor in the revision chain, never the root.
    pub parent_bid_id: Option<BidId>,
    pub withdrawal: Option<Withdrawal>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
