use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::actor::CompanyId;
use crate::domain::bid::{Bid, BidId};
use crate::domain::job::{AwardJob, AwardJobId, AwardJobState, AwardJobTransition, OperationKey};
use crate::domain::tender::{Tender, TenderId, TenderStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("tender `{tender_id}` was modified concurrently (expected version {expected})")]
    VersionConflict { tender_id: TenderId, expected: u32 },
    #[error("tender `{tender_id}` is no longer in an accepted status for this write")]
    GuardRejected { tender_id: TenderId },
    #[error("award job `{0}` was modified concurrently")]
    JobConflict(AwardJobId),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    Missing(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::GuardRejected { .. } | Self::JobConflict(_)
        )
    }
}

/// Precondition checked atomically with a bid write: the owning tender must still be in
/// one of `statuses` when the write commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenderGuard {
    pub tender_id: TenderId,
    pub statuses: Vec<TenderStatus>,
}

impl TenderGuard {
    pub fn new(tender_id: TenderId, statuses: &[TenderStatus]) -> Self {
        Self { tender_id, statuses: statuses.to_vec() }
    }

    pub fn admits(&self, status: TenderStatus) -> bool {
        self.statuses.contains(&status)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BidChanges {
    pub updated: Vec<Bid>,
    pub inserted: Vec<Bid>,
}

impl BidChanges {
    pub fn insert(bid: Bid) -> Self {
        Self { updated: Vec::new(), inserted: vec![bid] }
    }

    pub fn update(bid: Bid) -> Self {
        Self { updated: vec![bid], inserted: Vec::new() }
    }
}

/// Transactional persistence for tenders and their bids.
#[async_trait]
pub trait TenderStore: Send + Sync {
    async fn find_tender(&self, id: &TenderId) -> Result<Option<Tender>, StoreError>;

    async fn list_tenders_by_status(
        &self,
        status: TenderStatus,
    ) -> Result<Vec<Tender>, StoreError>;

    async fn insert_tender(&self, tender: &Tender) -> Result<(), StoreError>;

    /// Replaces the stored tender when its version still equals `expected_version`.
    /// The caller has already bumped `tender.version`.
    async fn save_tender(&self, tender: &Tender, expected_version: u32)
        -> Result<(), StoreError>;

    async fn find_bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError>;

    async fn list_bids_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Bid>, StoreError>;

    async fn list_bids_for_company(&self, company_id: &CompanyId)
        -> Result<Vec<Bid>, StoreError>;

    /// Applies all bid changes in one unit of work, or none if the guard fails.
    async fn write_bids(&self, guard: &TenderGuard, changes: BidChanges)
        -> Result<(), StoreError>;

    /// Persists an award: the tender (version checked) and every resolved bid, atomically.
    async fn commit_award(
        &self,
        tender: &Tender,
        expected_version: u32,
        bids: &[Bid],
    ) -> Result<(), StoreError>;
}

/// Durable at-least-once queue for award ledger commits.
#[async_trait]
pub trait AwardJobQueue: Send + Sync {
    /// Inserts a job with its first transition row. Fails with `Duplicate` if a
    /// non-terminal job holds the same idempotency key.
    async fn insert_job(&self, job: &AwardJob, transition: &AwardJobTransition)
        -> Result<(), StoreError>;

    async fn find_job(&self, id: &AwardJobId) -> Result<Option<AwardJob>, StoreError>;

    async fn find_live_job(&self, key: &OperationKey) -> Result<Option<AwardJob>, StoreError>;

    async fn list_jobs_for_tender(&self, tender_id: &TenderId)
        -> Result<Vec<AwardJob>, StoreError>;

    /// Most recently updated first; every state when `state` is `None`.
    async fn list_jobs(
        &self,
        state: Option<AwardJobState>,
        limit: u32,
    ) -> Result<Vec<AwardJob>, StoreError>;

    /// Oldest job that is due: enqueued or retryable with `available_at <= now`, or running
    /// with a claim older than `stale_before`.
    async fn next_due_job(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<AwardJob>, StoreError>;

    /// Replaces the job when its state version still equals `expected_state_version`,
    /// appending `transition` in the same unit of work.
    async fn save_job(
        &self,
        job: &AwardJob,
        expected_state_version: u32,
        transition: &AwardJobTransition,
    ) -> Result<(), StoreError>;

    async fn list_transitions(&self, job_id: &AwardJobId)
        -> Result<Vec<AwardJobTransition>, StoreError>;
}
