use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::bid::BidStatus;
use crate::domain::job::{AwardCommitRequest, AwardJobId};
use crate::domain::tender::{LedgerProof, TenderStatus};
use crate::errors::{ApplicationError, TenderError};
use crate::jobs::engine::{AwardJobEngine, RetryPolicy};
use crate::ledger::{AwardFacts, AwardLedgerClient, AwardRecordRequest, LedgerError};
use crate::store::{AwardJobQueue, BidChanges, StoreError, TenderGuard, TenderStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub minor_unit_scale: u32,
}

/// How the worker reached a committed ledger proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPath {
    /// Tender already carried the same content hash; the ledger was not contacted.
    AlreadyReconciled,
    /// Ledger already held the same facts from an earlier interrupted run.
    ReusedLedgerRecord,
    Submitted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub content_hash: String,
    pub commit_ref: String,
    pub path: CommitPath,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkOutcome {
    Idle,
    /// Another worker won the claim race.
    Contended(AwardJobId),
    Committed { job_id: AwardJobId, outcome: CommitOutcome },
    Retrying { job_id: AwardJobId, retry_count: u32, error: String },
    DeadLettered { job_id: AwardJobId, error: String },
}

/// Consumes award-ledger commit jobs and reconciles ledger proofs onto tenders.
pub struct AwardJobWorker {
    store: Arc<dyn TenderStore>,
    queue: Arc<dyn AwardJobQueue>,
    ledger: Arc<dyn AwardLedgerClient>,
    clock: Arc<dyn Clock>,
    engine: AwardJobEngine,
    settings: WorkerSettings,
}

impl AwardJobWorker {
    pub fn new(
        store: Arc<dyn TenderStore>,
        queue: Arc<dyn AwardJobQueue>,
        ledger: Arc<dyn AwardLedgerClient>,
        clock: Arc<dyn Clock>,
        engine: AwardJobEngine,
        settings: WorkerSettings,
    ) -> Self {
        Self { store, queue, ledger, clock, engine, settings }
    }

    /// Claims and processes at most one due job.
    pub async fn run_once(&self) -> Result<WorkOutcome, ApplicationError> {
        let now = self.clock.now();
        let Some(job) = self.queue.next_due_job(now, self.engine.stale_before(now)).await? else {
            return Ok(WorkOutcome::Idle);
        };

        let read_version = job.state_version;
        let claimed = self.engine.claim(job, &self.settings.worker_id, now)?;
        match self.queue.save_job(&claimed.job, read_version, &claimed.transition).await {
            Ok(()) => {}
            Err(StoreError::JobConflict(job_id)) => {
                debug!(
                    event_name = "award.worker.job_contended",
                    job_id = %job_id,
                    "another worker claimed the job"
                );
                return Ok(WorkOutcome::Contended(job_id));
            }
            Err(error) => return Err(error.into()),
        }

        let job = claimed.job;
        let job_id = job.id.clone();
        let claimed_version = job.state_version;
        info!(
            event_name = "award.worker.job_claimed",
            job_id = %job_id,
            tender_id = %job.tender_id,
            worker_id = %self.settings.worker_id,
            retry_count = job.retry_count,
            "award ledger job claimed"
        );

        match self.process_award(&job.payload).await {
            Ok(outcome) => {
                let step = self.engine.commit(job, &outcome.content_hash, self.clock.now())?;
                self.queue.save_job(&step.job, claimed_version, &step.transition).await?;
                info!(
                    event_name = "award.worker.job_committed",
                    job_id = %job_id,
                    tender_id = %step.job.tender_id,
                    content_hash = %outcome.content_hash,
                    commit_ref = %outcome.commit_ref,
                    path = ?outcome.path,
                    "award mirrored to ledger"
                );
                Ok(WorkOutcome::Committed { job_id, outcome })
            }
            Err(error) => {
                let policy = if error.is_retryable() {
                    RetryPolicy::Retry
                } else {
                    RetryPolicy::FailTerminal
                };
                let message = error.to_string();
                let step =
                    self.engine.fail(job, &message, error.class(), policy, self.clock.now())?;
                self.queue.save_job(&step.job, claimed_version, &step.transition).await?;

                if step.job.state.is_terminal() {
                    warn!(
                        event_name = "award.worker.job_dead_lettered",
                        job_id = %job_id,
                        tender_id = %step.job.tender_id,
                        error_class = error.class(),
                        error = %message,
                        "award ledger job failed permanently"
                    );
                    Ok(WorkOutcome::DeadLettered { job_id, error: message })
                } else {
                    warn!(
                        event_name = "award.worker.job_retry_scheduled",
                        job_id = %job_id,
                        tender_id = %step.job.tender_id,
                        error_class = error.class(),
                        error = %message,
                        retry_count = step.job.retry_count,
                        available_at = %step.job.available_at,
                        "award ledger job will be retried"
                    );
                    Ok(WorkOutcome::Retrying {
                        job_id,
                        retry_count: step.job.retry_count,
                        error: message,
                    })
                }
            }
        }
    }

    /// Runs jobs until the queue has nothing due or `max_jobs` have been handled.
    pub async fn drain(&self, max_jobs: usize) -> Result<Vec<WorkOutcome>, ApplicationError> {
        let mut outcomes = Vec::new();
        while outcomes.len() < max_jobs {
            match self.run_once().await? {
                WorkOutcome::Idle => break,
                outcome => outcomes.push(outcome),
            }
        }
        Ok(outcomes)
    }

    /// The job body. Safe to re-run: a repeat over the same facts yields the same hash and
    /// never submits twice.
    pub async fn process_award(
        &self,
        request: &AwardCommitRequest,
    ) -> Result<CommitOutcome, ApplicationError> {
        let tender = self
            .store
            .find_tender(&request.tender_id)
            .await?
            .ok_or_else(|| TenderError::tender_not_found(request.tender_id.0.clone()))?;
        let winning_bid = self
            .store
            .find_bid(&request.winning_bid_id)
            .await?
            .ok_or_else(|| TenderError::bid_not_found(request.winning_bid_id.0.clone()))?;

        if tender.status != TenderStatus::Awarded
            || tender.winning_bid_id() != Some(&winning_bid.id)
        {
            return Err(TenderError::InvalidState(format!(
                "tender `{}` is not awarded to bid `{}`",
                tender.id, winning_bid.id
            ))
            .into());
        }

        let facts = AwardFacts::from_award(
            &tender,
            &winning_bid,
            request.award_amount,
            self.settings.minor_unit_scale,
        )?;
        let content_hash = facts.content_hash();

        let outcome = match tender.ledger_proof.as_ref() {
            Some(proof) if proof.content_hash == content_hash => CommitOutcome {
                content_hash: content_hash.clone(),
                commit_ref: proof.commit_ref.clone(),
                path: CommitPath::AlreadyReconciled,
            },
            _ => {
                let existing =
                    self.ledger.get_award(&tender.id).await.map_err(ApplicationError::from_ledger)?;
                match existing {
                    Some(record) if record.content_hash == content_hash => {
                        let commit_ref = record.commit_ref.ok_or_else(|| {
                            LedgerError::Decode(format!(
                                "ledger record for tender `{}` has no commit reference",
                                tender.id
                            ))
                        })?;
                        CommitOutcome {
                            content_hash: content_hash.clone(),
                            commit_ref,
                            path: CommitPath::ReusedLedgerRecord,
                        }
                    }
                    Some(record) => {
                        return Err(LedgerError::Rejected(format!(
                            "ledger holds hash {} for tender `{}`, expected {content_hash}",
                            record.content_hash, tender.id
                        ))
                        .into());
                    }
                    None => {
                        let receipt = self
                            .ledger
                            .record_award(&AwardRecordRequest::from_facts(facts))
                            .await
                            .map_err(ApplicationError::from_ledger)?;
                        CommitOutcome {
                            content_hash: receipt.content_hash,
                            commit_ref: receipt.commit_ref,
                            path: CommitPath::Submitted,
                        }
                    }
                }
            }
        };

        if outcome.path != CommitPath::AlreadyReconciled {
            let now = self.clock.now();
            let mut reconciled = tender.clone();
            reconciled.ledger_proof = Some(LedgerProof {
                content_hash: outcome.content_hash.clone(),
                commit_ref: outcome.commit_ref.clone(),
                recorded_at: now,
            });
            reconciled.version = tender.version + 1;
            reconciled.updated_at = now;
            self.store.save_tender(&reconciled, tender.version).await?;
        }

        if winning_bid.status != BidStatus::Accepted {
            let mut accepted = winning_bid;
            accepted.status = BidStatus::Accepted;
            accepted.updated_at = self.clock.now();
            self.store
                .write_bids(
                    &TenderGuard::new(tender.id.clone(), &[TenderStatus::Awarded]),
                    BidChanges::update(accepted),
                )
                .await?;
        }

        Ok(outcome)
    }
}
