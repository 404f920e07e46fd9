//! Tender lifecycle orchestration.
//!
//! `TenderLifecycleService` is the only writer of tender and bid status. Each operation loads
//! the aggregate, applies the pure rules from `flows` and `bids`, and persists the result in
//! one versioned or guarded store call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bids::{AwardResolution, BidLedger, BidSubmission};
use crate::clock::Clock;
use crate::domain::actor::{Actor, CompanyId};
use crate::domain::bid::{Bid, BidId};
use crate::domain::job::{AwardCommitRequest, AwardJob, AwardJobId, OperationKey};
use crate::domain::tender::{AwardOutcome, Cancellation, Tender, TenderId, TenderStatus};
use crate::errors::{ApplicationError, TenderError};
use crate::events::{EventEnvelope, EventSink, TenderEvent};
use crate::flows::{TenderStateMachine, TransitionVerdict};
use crate::jobs::AwardJobEngine;
use crate::permissions::{can_create_tender, require_company, require_tender_admin};
use crate::store::{AwardJobQueue, BidChanges, StoreError, TenderGuard, TenderStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// How many times an award tries to enqueue its ledger job before giving up.
    pub enqueue_attempts: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { enqueue_attempts: 3 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderDraft {
    pub title: String,
    pub description: String,
    pub closing_at: DateTime<Utc>,
    pub publish_at: Option<DateTime<Utc>>,
    pub budget: Option<Decimal>,
}

/// Field-level edits. `None` leaves a field as is; the nested options clear a value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub closing_at: Option<DateTime<Utc>>,
    pub publish_at: Option<Option<DateTime<Utc>>>,
    pub budget: Option<Option<Decimal>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub tender: Tender,
    pub verdict: TransitionVerdict,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwardReceipt {
    pub tender: Tender,
    pub resolution: AwardResolution,
    /// `None` when every enqueue attempt failed; the award stands regardless.
    pub job: Option<AwardJob>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub published: Vec<TenderId>,
    pub closed: Vec<TenderId>,
    pub skipped: Vec<SkippedTender>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTender {
    pub tender_id: TenderId,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequeueReport {
    pub enqueued: Vec<AwardJobId>,
    pub already_queued: Vec<TenderId>,
    pub skipped: Vec<SkippedTender>,
}

pub struct TenderLifecycleService {
    store: Arc<dyn TenderStore>,
    queue: Arc<dyn AwardJobQueue>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    engine: AwardJobEngine,
    settings: LifecycleSettings,
}

impl TenderLifecycleService {
    pub fn new(
        store: Arc<dyn TenderStore>,
        queue: Arc<dyn AwardJobQueue>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        engine: AwardJobEngine,
        settings: LifecycleSettings,
    ) -> Self {
        Self { store, queue, events, clock, engine, settings }
    }

    pub async fn create_tender(
        &self,
        actor: &Actor,
        draft: TenderDraft,
    ) -> Result<Tender, ApplicationError> {
        let owner = require_company(actor)?.clone();
        if !can_create_tender(actor) {
            return Err(TenderError::Forbidden(format!(
                "role {} cannot create tenders",
                actor.role.as_str()
            ))
            .into());
        }

        let now = self.clock.now();
        let title = draft.title.trim().to_string();
        validate_fields(&title, draft.budget, draft.publish_at, draft.closing_at)?;
        ensure_future_closing(draft.closing_at, now)?;

        let tender = Tender {
            id: TenderId(Uuid::new_v4().to_string()),
            title,
            description: draft.description,
            closing_at: draft.closing_at,
            publish_at: draft.publish_at,
            budget: draft.budget,
            owner_company_id: owner,
            status: TenderStatus::Draft,
            status_changed_at: now,
            cancellation: None,
            award: None,
            ledger_proof: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_tender(&tender).await?;

        info!(
            event_name = "tender.lifecycle.created",
            tender_id = %tender.id,
            owner_company_id = %tender.owner_company_id,
            actor = %actor.user_id,
            "tender created"
        );
        Ok(tender)
    }

    pub async fn update_tender(
        &self,
        actor: &Actor,
        tender_id: &TenderId,
        patch: TenderPatch,
    ) -> Result<Tender, ApplicationError> {
        let current = self.load_tender(tender_id).await?;
        require_tender_admin(actor, &current.owner_company_id)?;
        if !current.status.can_edit_core_fields() {
            return Err(TenderError::InvalidState(format!(
                "tender `{}` is {}; only draft or published tenders can be edited",
                current.id, current.status
            ))
            .into());
        }

        let now = self.clock.now();
        let mut next = current.clone();
        if let Some(title) = patch.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(closing_at) = patch.closing_at {
            ensure_future_closing(closing_at, now)?;
            next.closing_at = closing_at;
        }
        if let Some(publish_at) = patch.publish_at {
            next.publish_at = publish_at;
        }
        if let Some(budget) = patch.budget {
            next.budget = budget;
        }
        validate_fields(&next.title, next.budget, next.publish_at, next.closing_at)?;

        next.version = current.version + 1;
        next.updated_at = now;
        self.store.save_tender(&next, current.version).await.map_err(concurrency_error)?;

        info!(
            event_name = "tender.lifecycle.updated",
            tender_id = %next.id,
            version = next.version,
            actor = %actor.user_id,
            "tender updated"
        );
        Ok(next)
    }

    /// Moves a tender along the transition table. Awarding goes through [`Self::award`],
    /// which also resolves bids.
    pub async fn change_status(
        &self,
        actor: &Actor,
        tender_id: &TenderId,
        requested: TenderStatus,
        reason: Option<&str>,
    ) -> Result<StatusChange, ApplicationError> {
        let tender = self.load_tender(tender_id).await?;
        require_tender_admin(actor, &tender.owner_company_id)?;
        self.apply_transition(actor, tender, requested, reason).await
    }

    pub async fn submit_bid(
        &self,
        actor: &Actor,
        tender_id: &TenderId,
        submission: BidSubmission,
    ) -> Result<Bid, ApplicationError> {
        let tender = self.load_tender(tender_id).await?;
        let bid = BidLedger::submit(&tender, actor, submission, self.clock.now())?;

        self.store
            .write_bids(&bidding_guard(&tender.id), BidChanges::insert(bid.clone()))
            .await
            .map_err(concurrency_error)?;

        info!(
            event_name = "bid.ledger.submitted",
            tender_id = %tender.id,
            bid_id = %bid.id,
            company_id = %bid.company_id,
            "bid submitted"
        );
        self.emit(TenderEvent::BidSubmitted {
            tender_id: tender.id,
            bid_id: bid.id.clone(),
            company_id: bid.company_id.clone(),
            amount: bid.amount,
            revision: bid.revision,
        });
        Ok(bid)
    }

    pub async fn withdraw_bid(
        &self,
        actor: &Actor,
        bid_id: &BidId,
        reason: &str,
    ) -> Result<Bid, ApplicationError> {
        let bid = self.load_bid(bid_id).await?;
        let tender = self.load_tender(&bid.tender_id).await?;
        let withdrawn = BidLedger::withdraw(&tender, &bid, actor, reason, self.clock.now())?;

        self.store
            .write_bids(&bidding_guard(&tender.id), BidChanges::update(withdrawn.clone()))
            .await
            .map_err(concurrency_error)?;

        info!(
            event_name = "bid.ledger.withdrawn",
            tender_id = %tender.id,
            bid_id = %withdrawn.id,
            "bid withdrawn"
        );
        self.emit(TenderEvent::BidWithdrawn {
            tender_id: tender.id,
            bid_id: withdrawn.id.clone(),
            company_id: withdrawn.company_id.clone(),
            reason: withdrawn.withdrawal.as_ref().map(|w| w.reason.clone()).unwrap_or_default(),
        });
        Ok(withdrawn)
    }

    /// Supersedes `bid_id` and returns the new live revision.
    pub async fn revise_bid(
        &self,
        actor: &Actor,
        bid_id: &BidId,
        amount: Decimal,
        document_ref: Option<String>,
    ) -> Result<Bid, ApplicationError> {
        let original = self.load_bid(bid_id).await?;
        let tender = self.load_tender(&original.tender_id).await?;
        let revision =
            BidLedger::revise(&tender, &original, actor, amount, document_ref, self.clock.now())?;

        self.store
            .write_bids(
                &bidding_guard(&tender.id),
                BidChanges {
                    updated: vec![revision.superseded.clone()],
                    inserted: vec![revision.revised.clone()],
                },
            )
            .await
            .map_err(concurrency_error)?;

        let revised = revision.revised;
        info!(
            event_name = "bid.ledger.revised",
            tender_id = %tender.id,
            bid_id = %revised.id,
            parent_bid_id = %original.id,
            revision = revised.revision,
            "bid revised"
        );
        self.emit(TenderEvent::BidSubmitted {
            tender_id: tender.id,
            bid_id: revised.id.clone(),
            company_id: revised.company_id.clone(),
            amount: revised.amount,
            revision: revised.revision,
        });
        Ok(revised)
    }

    pub async fn shortlist_bid(
        &self,
        actor: &Actor,
        bid_id: &BidId,
        shortlisted: bool,
    ) -> Result<Bid, ApplicationError> {
        let bid = self.load_bid(bid_id).await?;
        let tender = self.load_tender(&bid.tender_id).await?;
        require_tender_admin(actor, &tender.owner_company_id)?;

        let updated = BidLedger::shortlist(&tender, &bid, shortlisted, self.clock.now())?;
        if updated.status == bid.status {
            return Ok(updated);
        }

        self.store
            .write_bids(
                &TenderGuard::new(
                    tender.id.clone(),
                    &[TenderStatus::Evaluation, TenderStatus::Closed],
                ),
                BidChanges::update(updated.clone()),
            )
            .await
            .map_err(concurrency_error)?;

        info!(
            event_name = "bid.ledger.shortlist_changed",
            tender_id = %tender.id,
            bid_id = %updated.id,
            status = %updated.status,
            "bid shortlist status changed"
        );
        Ok(updated)
    }

    /// Awards the tender to `winning_bid_id`: one transaction for the tender and every bid,
    /// then a best-effort enqueue of the ledger commit.
    pub async fn award(
        &self,
        actor: &Actor,
        tender_id: &TenderId,
        winning_bid_id: &BidId,
        justification: &str,
    ) -> Result<AwardReceipt, ApplicationError> {
        let tender = self.load_tender(tender_id).await?;
        require_tender_admin(actor, &tender.owner_company_id)?;

        if tender.status == TenderStatus::Awarded || !tender.status.can_be_awarded() {
            return Err(TenderError::InvalidState(format!(
                "tender `{}` is {}; only tenders in evaluation can be awarded",
                tender.id, tender.status
            ))
            .into());
        }
        let justification = justification.trim();
        if justification.is_empty() {
            return Err(TenderError::EmptyJustification.into());
        }

        let now = self.clock.now();
        let bids = self.store.list_bids_for_tender(&tender.id).await?;
        let resolution = BidLedger::resolve_award(&tender.id, &bids, winning_bid_id, now)?;

        let mut awarded = tender.clone();
        awarded.status = TenderStatus::Awarded;
        awarded.status_changed_at = now;
        awarded.award = Some(AwardOutcome {
            winning_bid_id: resolution.winner.id.clone(),
            awarded_at: now,
            justification: justification.to_string(),
            awarded_by: actor.user_id.clone(),
        });
        awarded.version = tender.version + 1;
        awarded.updated_at = now;

        self.store
            .commit_award(&awarded, tender.version, &resolution.changed)
            .await
            .map_err(concurrency_error)?;

        let winner = &resolution.winner;
        info!(
            event_name = "tender.lifecycle.awarded",
            tender_id = %awarded.id,
            bid_id = %winner.id,
            winning_company_id = %winner.company_id,
            rejected = resolution.rejected,
            untouched = resolution.untouched,
            actor = %actor.user_id,
            "tender awarded"
        );
        self.emit(TenderEvent::TenderStatusChanged {
            tender_id: awarded.id.clone(),
            from: tender.status,
            to: TenderStatus::Awarded,
            actor: actor.user_id.clone(),
            reason: Some(justification.to_string()),
        });
        self.emit(TenderEvent::TenderAwarded {
            tender_id: awarded.id.clone(),
            winning_bid_id: winner.id.clone(),
            winning_company_id: winner.company_id.clone(),
            amount: winner.amount,
            actor: actor.user_id.clone(),
        });

        let job = self
            .enqueue_with_retries(AwardCommitRequest {
                tender_id: awarded.id.clone(),
                winning_bid_id: winner.id.clone(),
                award_amount: winner.amount,
            })
            .await;

        Ok(AwardReceipt { tender: awarded, resolution, job })
    }

    /// Enqueues the ledger commit for an award. Returns the live job when one already exists
    /// for the same tender and winning bid.
    pub async fn enqueue_award_commit(
        &self,
        request: AwardCommitRequest,
    ) -> Result<AwardJob, ApplicationError> {
        let key = OperationKey::award_commit(&request.tender_id, &request.winning_bid_id);
        if let Some(existing) = self.queue.find_live_job(&key).await? {
            return Ok(existing);
        }

        let step = self.engine.create_job(request, Actor::SYSTEM_USER, self.clock.now());
        match self.queue.insert_job(&step.job, &step.transition).await {
            Ok(()) => {
                info!(
                    event_name = "award.queue.enqueued",
                    job_id = %step.job.id,
                    tender_id = %step.job.tender_id,
                    idempotency_key = %step.job.idempotency_key,
                    "award ledger job enqueued"
                );
                Ok(step.job)
            }
            Err(StoreError::Duplicate(_)) => self
                .queue
                .find_live_job(&key)
                .await?
                .ok_or_else(|| StoreError::Missing(format!("live job for key {key}")).into()),
            Err(error) => Err(error.into()),
        }
    }

    /// Publishes drafts whose publish time has come and closes open tenders past their
    /// deadline. One tender failing never aborts the sweep.
    pub async fn run_scheduled_transitions(&self) -> Result<SweepReport, ApplicationError> {
        let now = self.clock.now();
        let system = Actor::system();
        let mut report = SweepReport::default();

        let due_drafts = self.store.list_tenders_by_status(TenderStatus::Draft).await?;
        for tender in due_drafts
            .into_iter()
            .filter(|t| TenderStateMachine::should_auto_publish(t.status, t.publish_at, now))
        {
            let tender_id = tender.id.clone();
            match self.apply_transition(&system, tender, TenderStatus::Published, None).await {
                Ok(_) => report.published.push(tender_id),
                Err(error) => report.skipped.push(skip(tender_id, &error)),
            }
        }

        let open = self.store.list_tenders_by_status(TenderStatus::Open).await?;
        for tender in open
            .into_iter()
            .filter(|t| TenderStateMachine::should_auto_close(t.status, t.closing_at, now))
        {
            let tender_id = tender.id.clone();
            match self.apply_transition(&system, tender, TenderStatus::Closed, None).await {
                Ok(_) => report.closed.push(tender_id),
                Err(error) => report.skipped.push(skip(tender_id, &error)),
            }
        }

        info!(
            event_name = "tender.scheduler.sweep_completed",
            published = report.published.len(),
            closed = report.closed.len(),
            skipped = report.skipped.len(),
            "scheduled transition sweep completed"
        );
        Ok(report)
    }

    /// Finds awarded tenders without a ledger proof and makes sure each has a live job.
    pub async fn requeue_unmirrored_awards(&self) -> Result<RequeueReport, ApplicationError> {
        let mut report = RequeueReport::default();
        let awarded = self.store.list_tenders_by_status(TenderStatus::Awarded).await?;

        for tender in awarded.into_iter().filter(Tender::awaiting_ledger_commit) {
            let Some(winning_bid_id) = tender.winning_bid_id().cloned() else {
                report.skipped.push(SkippedTender {
                    tender_id: tender.id.clone(),
                    reason: "awarded tender has no winning bid".to_string(),
                });
                continue;
            };

            let key = OperationKey::award_commit(&tender.id, &winning_bid_id);
            if self.queue.find_live_job(&key).await?.is_some() {
                report.already_queued.push(tender.id.clone());
                continue;
            }

            let Some(winner) = self.store.find_bid(&winning_bid_id).await? else {
                report.skipped.push(SkippedTender {
                    tender_id: tender.id.clone(),
                    reason: format!("winning bid `{winning_bid_id}` not found"),
                });
                continue;
            };

            let job = self
                .enqueue_award_commit(AwardCommitRequest {
                    tender_id: tender.id.clone(),
                    winning_bid_id,
                    award_amount: winner.amount,
                })
                .await?;
            report.enqueued.push(job.id);
        }

        info!(
            event_name = "award.queue.requeue_completed",
            enqueued = report.enqueued.len(),
            already_queued = report.already_queued.len(),
            skipped = report.skipped.len(),
            "unmirrored awards requeued"
        );
        Ok(report)
    }

    pub async fn tender(&self, tender_id: &TenderId) -> Result<Tender, ApplicationError> {
        self.load_tender(tender_id).await
    }

    /// The revision chain ending at `bid_id`, newest first.
    pub async fn revision_history(&self, bid_id: &BidId) -> Result<Vec<Bid>, ApplicationError> {
        let bid = self.load_bid(bid_id).await?;
        let bids = self.store.list_bids_for_tender(&bid.tender_id).await?;
        Ok(BidLedger::revision_chain(bid_id, &bids)?)
    }

    pub async fn bids_for_tender(
        &self,
        tender_id: &TenderId,
    ) -> Result<Vec<Bid>, ApplicationError> {
        Ok(self.store.list_bids_for_tender(tender_id).await?)
    }

    pub async fn bids_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Bid>, ApplicationError> {
        Ok(self.store.list_bids_for_company(company_id).await?)
    }

    async fn apply_transition(
        &self,
        actor: &Actor,
        tender: Tender,
        requested: TenderStatus,
        reason: Option<&str>,
    ) -> Result<StatusChange, ApplicationError> {
        let verdict = TenderStateMachine::validate_transition(tender.status, requested, reason)
            .map_err(TenderError::from)?;
        if verdict == TransitionVerdict::Unchanged {
            return Ok(StatusChange { tender, verdict });
        }
        // Only evaluation -> awarded reaches here; it needs a winning bid.
        if requested == TenderStatus::Awarded {
            return Err(TenderError::InvalidState(
                "awarding requires a winning bid; use the award operation".to_string(),
            )
            .into());
        }

        let now = self.clock.now();
        let reason = reason.map(str::trim).filter(|value| !value.is_empty());
        let mut next = tender.clone();
        next.status = requested;
        next.status_changed_at = now;
        if requested == TenderStatus::Cancelled {
            next.cancellation = Some(Cancellation {
                reason: reason.unwrap_or_default().to_string(),
                cancelled_by: actor.user_id.clone(),
                cancelled_at: now,
            });
        }
        next.version = tender.version + 1;
        next.updated_at = now;

        self.store.save_tender(&next, tender.version).await.map_err(concurrency_error)?;

        info!(
            event_name = "tender.lifecycle.status_changed",
            tender_id = %next.id,
            from = %tender.status,
            to = %next.status,
            actor = %actor.user_id,
            "tender status changed"
        );
        self.emit(TenderEvent::TenderStatusChanged {
            tender_id: next.id.clone(),
            from: tender.status,
            to: next.status,
            actor: actor.user_id.clone(),
            reason: reason.map(str::to_string),
        });
        Ok(StatusChange { tender: next, verdict })
    }

    async fn enqueue_with_retries(&self, request: AwardCommitRequest) -> Option<AwardJob> {
        let attempts = self.settings.enqueue_attempts.max(1);
        for attempt in 1..=attempts {
            match self.enqueue_award_commit(request.clone()).await {
                Ok(job) => return Some(job),
                Err(error) => warn!(
                    event_name = "award.queue.enqueue_failed",
                    tender_id = %request.tender_id,
                    attempt,
                    attempts,
                    error = %error,
                    "award ledger job enqueue failed"
                ),
            }
        }

        error!(
            event_name = "award.queue.enqueue_abandoned",
            tender_id = %request.tender_id,
            bid_id = %request.winning_bid_id,
            attempts,
            "award ledger job not enqueued; requeue-awards will pick it up"
        );
        None
    }

    async fn load_tender(&self, tender_id: &TenderId) -> Result<Tender, ApplicationError> {
        self.store
            .find_tender(tender_id)
            .await?
            .ok_or_else(|| TenderError::tender_not_found(tender_id.0.clone()).into())
    }

    async fn load_bid(&self, bid_id: &BidId) -> Result<Bid, ApplicationError> {
        self.store
            .find_bid(bid_id)
            .await?
            .ok_or_else(|| TenderError::bid_not_found(bid_id.0.clone()).into())
    }

    fn emit(&self, event: TenderEvent) {
        self.events.emit(EventEnvelope::new(Uuid::new_v4().to_string(), self.clock.now(), event));
    }
}

fn bidding_guard(tender_id: &TenderId) -> TenderGuard {
    TenderGuard::new(tender_id.clone(), &[TenderStatus::Open])
}

/// Optimistic-concurrency losses surface as `InvalidState` to callers.
fn concurrency_error(error: StoreError) -> ApplicationError {
    match error {
        StoreError::VersionConflict { tender_id, .. } => TenderError::InvalidState(format!(
            "tender `{tender_id}` was modified concurrently"
        ))
        .into(),
        StoreError::GuardRejected { tender_id } => TenderError::InvalidState(format!(
            "tender `{tender_id}` changed status before the write committed"
        ))
        .into(),
        other => other.into(),
    }
}

fn skip(tender_id: TenderId, error: &ApplicationError) -> SkippedTender {
    warn!(
        event_name = "tender.scheduler.transition_skipped",
        tender_id = %tender_id,
        error_class = error.class(),
        error = %error,
        "scheduled transition skipped"
    );
    SkippedTender { tender_id, reason: error.to_string() }
}

fn validate_fields(
    title: &str,
    budget: Option<Decimal>,
    publish_at: Option<DateTime<Utc>>,
    closing_at: DateTime<Utc>,
) -> Result<(), TenderError> {
    if title.is_empty() {
        return Err(TenderError::Validation("title must not be blank".to_string()));
    }
    if let Some(budget) = budget {
        if budget < Decimal::ZERO {
            return Err(TenderError::Validation(format!(
                "budget must not be negative, got {budget}"
            )));
        }
    }
    if let Some(publish_at) = publish_at {
        if publish_at >= closing_at {
            return Err(TenderError::Validation(
                "publish time must precede the closing date".to_string(),
            ));
        }
    }
    Ok(())
}

fn ensure_future_closing(closing_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TenderError> {
    if closing_at <= now {
        return Err(TenderError::InvalidState(format!(
            "closing date {} is not in the future",
            closing_at.to_rfc3339()
        )));
    }
    Ok(())
}
