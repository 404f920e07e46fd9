use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tenderbridge_core::domain::actor::CompanyId;
use tenderbridge_core::domain::bid::{Bid, BidId};
use tenderbridge_core::domain::job::{
    AwardJob, AwardJobId, AwardJobState, AwardJobTransition, OperationKey,
};
use tenderbridge_core::domain::tender::{Tender, TenderId, TenderStatus};
use tenderbridge_core::store::{
    AwardJobQueue, BidChanges, StoreError, TenderGuard, TenderStore,
};

#[derive(Default)]
struct TenderTables {
    tenders: HashMap<TenderId, Tender>,
    bids: HashMap<BidId, Bid>,
}

/// Process-local tender store. One lock covers tenders and bids, so guarded writes and award
/// commits are atomic just like the SQL store's transactions.
#[derive(Default)]
pub struct InMemoryTenderStore {
    tables: RwLock<TenderTables>,
}

#[async_trait::async_trait]
impl TenderStore for InMemoryTenderStore {
    async fn find_tender(&self, id: &TenderId) -> Result<Option<Tender>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.tenders.get(id).cloned())
    }

    async fn list_tenders_by_status(
        &self,
        status: TenderStatus,
    ) -> Result<Vec<Tender>, StoreError> {
        let tables = self.tables.read().await;
        let mut tenders: Vec<Tender> =
            tables.tenders.values().filter(|tender| tender.status == status).cloned().collect();
        tenders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tenders)
    }

    async fn insert_tender(&self, tender: &Tender) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tenders.contains_key(&tender.id) {
            return Err(StoreError::Duplicate(format!("tender `{}`", tender.id)));
        }
        tables.tenders.insert(tender.id.clone(), tender.clone());
        Ok(())
    }

    async fn save_tender(
        &self,
        tender: &Tender,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        check_version(&tables, &tender.id, expected_version)?;
        tables.tenders.insert(tender.id.clone(), tender.clone());
        Ok(())
    }

    async fn find_bid(&self, id: &BidId) -> Result<Option<Bid>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.bids.get(id).cloned())
    }

    async fn list_bids_for_tender(&self, tender_id: &TenderId) -> Result<Vec<Bid>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_bids(tables.bids.values().filter(|bid| &bid.tender_id == tender_id)))
    }

    async fn list_bids_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Bid>, StoreError> {
        let tables = self.tables.read().await;
        Ok(sorted_bids(tables.bids.values().filter(|bid| &bid.company_id == company_id)))
    }

    async fn write_bids(
        &self,
        guard: &TenderGuard,
        changes: BidChanges,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let status = tables
            .tenders
            .get(&guard.tender_id)
            .map(|tender| tender.status)
            .ok_or_else(|| StoreError::Missing(format!("tender `{}`", guard.tender_id)))?;
        if !guard.admits(status) {
            return Err(StoreError::GuardRejected { tender_id: guard.tender_id.clone() });
        }

        for bid in changes.updated.iter().chain(changes.inserted.iter()) {
            if bid.tender_id != guard.tender_id {
                return Err(StoreError::Backend(format!(
                    "bid `{}` belongs to tender `{}`, not `{}`",
                    bid.id, bid.tender_id, guard.tender_id
                )));
            }
        }
        for bid in &changes.updated {
            if !tables.bids.contains_key(&bid.id) {
                return Err(StoreError::Missing(format!("bid `{}`", bid.id)));
            }
        }
        for bid in &changes.inserted {
            if tables.bids.contains_key(&bid.id) {
                return Err(StoreError::Duplicate(format!("bid `{}`", bid.id)));
            }
        }

        for bid in changes.updated.into_iter().chain(changes.inserted) {
            tables.bids.insert(bid.id.clone(), bid);
        }
        Ok(())
    }

    async fn commit_award(
        &self,
        tender: &Tender,
        expected_version: u32,
        bids: &[Bid],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        check_version(&tables, &tender.id, expected_version)?;
        for bid in bids {
            let known = tables.bids.get(&bid.id).map(|stored| stored.tender_id == tender.id);
            if known != Some(true) {
                return Err(StoreError::Missing(format!(
                    "bid `{}` on tender `{}`",
                    bid.id, tender.id
                )));
            }
        }

        tables.tenders.insert(tender.id.clone(), tender.clone());
        for bid in bids {
            tables.bids.insert(bid.id.clone(), bid.clone());
        }
        Ok(())
    }
}

fn check_version(
    tables: &TenderTables,
    tender_id: &TenderId,
    expected_version: u32,
) -> Result<(), StoreError> {
    match tables.tenders.get(tender_id) {
        None => Err(StoreError::Missing(format!("tender `{tender_id}`"))),
        Some(stored) if stored.version != expected_version => Err(StoreError::VersionConflict {
            tender_id: tender_id.clone(),
            expected: expected_version,
        }),
        Some(_) => Ok(()),
    }
}

fn sorted_bids<'a>(bids: impl Iterator<Item = &'a Bid>) -> Vec<Bid> {
    let mut bids: Vec<Bid> = bids.cloned().collect();
    bids.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
    bids
}

#[derive(Default)]
struct QueueTables {
    jobs: HashMap<AwardJobId, AwardJob>,
    transitions: Vec<AwardJobTransition>,
}

#[derive(Default)]
pub struct InMemoryAwardJobQueue {
    tables: RwLock<QueueTables>,
}

#[async_trait::async_trait]
impl AwardJobQueue for InMemoryAwardJobQueue {
    async fn insert_job(
        &self,
        job: &AwardJob,
        transition: &AwardJobTransition,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(format!("award job `{}`", job.id)));
        }
        let live_duplicate = tables
            .jobs
            .values()
            .any(|existing| existing.idempotency_key == job.idempotency_key && is_live(existing));
        if live_duplicate {
            return Err(StoreError::Duplicate(format!(
                "live award job for key `{}`",
                job.idempotency_key
            )));
        }

        tables.jobs.insert(job.id.clone(), job.clone());
        tables.transitions.push(transition.clone());
        Ok(())
    }

    async fn find_job(&self, id: &AwardJobId) -> Result<Option<AwardJob>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.jobs.get(id).cloned())
    }

    async fn find_live_job(&self, key: &OperationKey) -> Result<Option<AwardJob>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .jobs
            .values()
            .find(|job| &job.idempotency_key == key && is_live(job))
            .cloned())
    }

    async fn list_jobs_for_tender(
        &self,
        tender_id: &TenderId,
    ) -> Result<Vec<AwardJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<AwardJob> =
            tables.jobs.values().filter(|job| &job.tender_id == tender_id).cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(jobs)
    }

    async fn list_jobs(
        &self,
        state: Option<AwardJobState>,
        limit: u32,
    ) -> Result<Vec<AwardJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<AwardJob> = tables
            .jobs
            .values()
            .filter(|job| state.map_or(true, |state| job.state == state))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.0.cmp(&b.id.0)));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn next_due_job(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<AwardJob>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .jobs
            .values()
            .filter(|job| match job.state {
                AwardJobState::Enqueued | AwardJobState::RetryableFailed => {
                    job.available_at <= now
                }
                AwardJobState::Running => {
                    job.claimed_at.map(|at| at < stale_before).unwrap_or(false)
                }
                AwardJobState::Committed | AwardJobState::Failed => false,
            })
            .min_by(|a, b| {
                a.available_at.cmp(&b.available_at).then_with(|| a.created_at.cmp(&b.created_at))
            })
            .cloned())
    }

    async fn save_job(
        &self,
        job: &AwardJob,
        expected_state_version: u32,
        transition: &AwardJobTransition,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let current = tables.jobs.get(&job.id).map(|stored| stored.state_version);
        if current != Some(expected_state_version) {
            return Err(StoreError::JobConflict(job.id.clone()));
        }

        tables.jobs.insert(job.id.clone(), job.clone());
        tables.transitions.push(transition.clone());
        Ok(())
    }

    async fn list_transitions(
        &self,
        job_id: &AwardJobId,
    ) -> Result<Vec<AwardJobTransition>, StoreError> {
        let tables = self.tables.read().await;
        let mut transitions: Vec<AwardJobTransition> = tables
            .transitions
            .iter()
            .filter(|transition| &transition.job_id == job_id)
            .cloned()
            .collect();
        transitions.sort_by_key(|transition| transition.state_version);
        Ok(transitions)
    }
}

fn is_live(job: &AwardJob) -> bool {
    !job.state.is_terminal()
}
