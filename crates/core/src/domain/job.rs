use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::bid::BidId;
use crate::domain::tender::TenderId;

pub const AWARD_LEDGER_COMMIT: &str = "award_ledger_commit";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwardJobId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobTransitionId(pub String);

impl fmt::Display for AwardJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl OperationKey {
    pub fn award_commit(tender_id: &TenderId, winning_bid_id: &BidId) -> Self {
        Self(format!("award-ledger:{}:{}", tender_id.0, winning_bid_id.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardJobState {
    Enqueued,
    Running,
    RetryableFailed,
    Committed,
    Failed,
}

impl AwardJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::RetryableFailed => "retryable_failed",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enqueued" => Some(Self::Enqueued),
            "running" => Some(Self::Running),
            "retryable_failed" => Some(Self::RetryableFailed),
            "committed" => Some(Self::Committed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl fmt::Display for AwardJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue payload handed from the award transaction to the ledger worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardCommitRequest {
    pub tender_id: TenderId,
    pub winning_bid_id: BidId,
    pub award_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardJob {
    pub id: AwardJobId,
    pub tender_id: TenderId,
    pub operation_kind: String,
    pub payload: AwardCommitRequest,
    pub idempotency_key: OperationKey,
    pub state: AwardJobState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub available_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Content hash of the committed award facts.
    pub result_fingerprint: Option<String>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardJobTransition {
    pub id: JobTransitionId,
    pub job_id: AwardJobId,
    pub tender_id: TenderId,
    pub from_state: Option<AwardJobState>,
    pub to_state: AwardJobState,
    pub transition_reason: String,
    pub error_class: Option<String>,
    pub decision_context_json: String,
    pub actor_id: String,
    pub state_version: u32,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{AwardJobState, OperationKey};
    use crate::domain::bid::BidId;
    use crate::domain::tender::TenderId;

    #[test]
    fn job_state_round_trips_from_storage_encoding() {
        let cases = [
            AwardJobState::Enqueued,
            AwardJobState::Running,
            AwardJobState::RetryableFailed,
            AwardJobState::Committed,
            AwardJobState::Failed,
        ];

        for state in cases {
            assert_eq!(AwardJobState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn award_commit_key_is_stable_per_tender_and_bid() {
        let key = OperationKey::award_commit(&TenderId("T-9".into()), &BidId("B-3".into()));
        assert_eq!(key.0, "award-ledger:T-9:B-3");
    }
}
