//! State rules for the award-ledger commit queue.
//!
//! Every transition returns the updated job together with the audit row describing it, so
//! the queue can persist both in one unit of work.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{
    AwardCommitRequest, AwardJob, AwardJobId, AwardJobState, AwardJobTransition,
    JobTransitionId, OperationKey, AWARD_LEDGER_COMMIT,
};

/// Upper bound on a single retry delay.
pub const MAX_BACKOFF_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobEngineConfig {
    /// How long before a claimed job is considered stale
    pub claim_timeout_seconds: i64,
    pub default_max_retries: u32,
    pub retry_backoff_multiplier: u32,
    pub retry_base_delay_seconds: i64,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self {
            claim_timeout_seconds: 300,
            default_max_retries: 5,
            retry_backoff_multiplier: 2,
            retry_base_delay_seconds: 5,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("invalid job transition from {from} to {to}: {reason}")]
    InvalidTransition { from: AwardJobState, to: AwardJobState, reason: String },
    #[error("job {0} is already claimed by {1}")]
    ClaimConflict(AwardJobId, String),
    #[error("job {0} is not yet available")]
    NotYetAvailable(AwardJobId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobStep {
    pub job: AwardJob,
    pub transition: AwardJobTransition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry with exponential backoff while attempts remain
    Retry,
    FailTerminal,
}

#[derive(Clone, Debug, Default)]
pub struct AwardJobEngine {
    config: JobEngineConfig,
}

impl AwardJobEngine {
    pub fn new(config: JobEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JobEngineConfig {
        &self.config
    }

    pub fn create_job(
        &self,
        payload: AwardCommitRequest,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> JobStep {
        let job = AwardJob {
            id: AwardJobId(Uuid::new_v4().to_string()),
            tender_id: payload.tender_id.clone(),
            operation_kind: AWARD_LEDGER_COMMIT.to_string(),
            idempotency_key: OperationKey::award_commit(
                &payload.tender_id,
                &payload.winning_bid_id,
            ),
            payload,
            state: AwardJobState::Enqueued,
            retry_count: 0,
            max_retries: self.config.default_max_retries,
            available_at: now,
            claimed_by: None,
            claimed_at: None,
            last_error: None,
            result_fingerprint: None,
            state_version: 1,
            created_at: now,
            updated_at: now,
        };

        let transition = audit_row(
            &job,
            None,
            "job_enqueued",
            None,
            serde_json::json!({
                "idempotency_key": job.idempotency_key.0,
                "max_retries": job.max_retries,
            }),
            actor_id,
            now,
        );
        JobStep { job, transition }
    }

    /// Cutoff before which a running claim is considered abandoned.
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.config.claim_timeout_seconds)
    }

    /// Enqueued/retryable -> running, or re-claim of a running job whose claim went stale.
    pub fn claim(
        &self,
        mut job: AwardJob,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStep, QueueError> {
        match job.state {
            AwardJobState::Enqueued | AwardJobState::RetryableFailed => {}
            AwardJobState::Running => {
                let stale = job.claimed_at.map(|at| at < self.stale_before(now)).unwrap_or(true);
                if !stale {
                    return Err(QueueError::ClaimConflict(
                        job.id.clone(),
                        job.claimed_by.clone().unwrap_or_default(),
                    ));
                }
            }
            AwardJobState::Committed | AwardJobState::Failed => {
                return Err(QueueError::InvalidTransition {
                    from: job.state,
                    to: AwardJobState::Running,
                    reason: "job already in terminal state".to_string(),
                });
            }
        }

        if now < job.available_at {
            return Err(QueueError::NotYetAvailable(job.id.clone()));
        }

        let from = job.state;
        let previous_owner = job.claimed_by.take();
        job.state = AwardJobState::Running;
        job.claimed_by = Some(worker_id.to_string());
        job.claimed_at = Some(now);
        job.state_version += 1;
        job.updated_at = now;

        let transition = audit_row(
            &job,
            Some(from),
            if from == AwardJobState::Running { "job_reclaimed" } else { "job_claimed" },
            None,
            serde_json::json!({
                "worker_id": worker_id,
                "previous_owner": previous_owner,
                "claim_timeout_seconds": self.config.claim_timeout_seconds,
            }),
            worker_id,
            now,
        );
        Ok(JobStep { job, transition })
    }

    pub fn commit(
        &self,
        mut job: AwardJob,
        result_fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<JobStep, QueueError> {
        ensure_running(&job, AwardJobState::Committed)?;

        let actor = job.claimed_by.take().unwrap_or_default();
        job.state = AwardJobState::Committed;
        job.result_fingerprint = Some(result_fingerprint.to_string());
        job.claimed_at = None;
        job.last_error = None;
        job.state_version += 1;
        job.updated_at = now;

        let transition = audit_row(
            &job,
            Some(AwardJobState::Running),
            "job_committed",
            None,
            serde_json::json!({ "result_fingerprint": result_fingerprint }),
            &actor,
            now,
        );
        Ok(JobStep { job, transition })
    }

    /// Running -> retryable_failed with backoff, or -> failed once retries are exhausted.
    pub fn fail(
        &self,
        mut job: AwardJob,
        error: &str,
        error_class: &str,
        policy: RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<JobStep, QueueError> {
        ensure_running(&job, AwardJobState::RetryableFailed)?;

        let actor = job.claimed_by.take().unwrap_or_default();
        job.claimed_at = None;
        job.last_error = Some(error.to_string());
        job.state_version += 1;
        job.updated_at = now;

        let should_retry = policy == RetryPolicy::Retry && job.retry_count < job.max_retries;
        let (reason, context) = if should_retry {
            let available_at = now + self.backoff(job.retry_count);
            job.state = AwardJobState::RetryableFailed;
            job.retry_count += 1;
            job.available_at = available_at;
            (
                "job_failed_retryable",
                serde_json::json!({
                    "retry_count": job.retry_count,
                    "max_retries": job.max_retries,
                    "next_available_at": available_at,
                    "error": error,
                }),
            )
        } else {
            let terminal_reason =
                if policy == RetryPolicy::Retry { "max_retries_exceeded" } else { "non_retryable" };
            job.state = AwardJobState::Failed;
            (
                "job_failed_terminal",
                serde_json::json!({
                    "retry_count": job.retry_count,
                    "max_retries": job.max_retries,
                    "error": error,
                    "reason": terminal_reason,
                }),
            )
        };

        let transition = audit_row(
            &job,
            Some(AwardJobState::Running),
            reason,
            Some(error_class),
            context,
            &actor,
            now,
        );
        Ok(JobStep { job, transition })
    }

    /// `base * multiplier^retry_count`, capped at [`MAX_BACKOFF_SECONDS`].
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = i64::from(self.config.retry_backoff_multiplier.saturating_pow(retry_count));
        let seconds = self
            .config
            .retry_base_delay_seconds
            .max(0)
            .saturating_mul(factor)
            .min(MAX_BACKOFF_SECONDS);
        Duration::seconds(seconds)
    }
}

fn ensure_running(job: &AwardJob, to: AwardJobState) -> Result<(), QueueError> {
    if job.state == AwardJobState::Running {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            from: job.state,
            to,
            reason: format!("cannot transition from {} to {}", job.state, to),
        })
    }
}

fn audit_row(
    job: &AwardJob,
    from_state: Option<AwardJobState>,
    reason: &str,
    error_class: Option<&str>,
    context: serde_json::Value,
    actor_id: &str,
    now: DateTime<Utc>,
) -> AwardJobTransition {
    AwardJobTransition {
        id: JobTransitionId(Uuid::new_v4().to_string()),
        job_id: job.id.clone(),
        tender_id: job.tender_id.clone(),
        from_state,
        to_state: job.state,
        transition_reason: reason.to_string(),
        error_class: error_class.map(str::to_string),
        decision_context_json: context.to_string(),
        actor_id: if actor_id.is_empty() { "system".to_string() } else { actor_id.to_string() },
        state_version: job.state_version,
        occurred_at: now,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{AwardJobEngine, JobEngineConfig, QueueError, RetryPolicy, MAX_BACKOFF_SECONDS};
    use crate::domain::bid::BidId;
    use crate::domain::job::{AwardCommitRequest, AwardJobState};
    use crate::domain::tender::TenderId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).single().expect("valid")
    }

    fn payload() -> AwardCommitRequest {
        AwardCommitRequest {
            tender_id: TenderId("T-1".into()),
            winning_bid_id: BidId("B-1".into()),
            award_amount: Decimal::new(100, 0),
        }
    }

    fn engine(max_retries: u32) -> AwardJobEngine {
        AwardJobEngine::new(JobEngineConfig {
            default_max_retries: max_retries,
            retry_base_delay_seconds: 10,
            retry_backoff_multiplier: 3,
            claim_timeout_seconds: 60,
        })
    }

    #[test]
    fn create_job_enqueues_with_idempotency_key_and_audit_row() {
        let step = engine(3).create_job(payload(), "system", now());

        assert_eq!(step.job.state, AwardJobState::Enqueued);
        assert_eq!(step.job.idempotency_key.0, "award-ledger:T-1:B-1");
        assert_eq!(step.job.state_version, 1);
        assert_eq!(step.transition.from_state, None);
        assert_eq!(step.transition.to_state, AwardJobState::Enqueued);
    }

    #[test]
    fn claim_then_commit_records_fingerprint() {
        let engine = engine(3);
        let created = engine.create_job(payload(), "system", now());
        let claimed = engine.claim(created.job, "worker-1", now()).expect("claim");
        assert_eq!(claimed.job.state, AwardJobState::Running);
        assert_eq!(claimed.job.claimed_by.as_deref(), Some("worker-1"));

        let committed = engine.commit(claimed.job, "0xabc", now()).expect("commit");
        assert_eq!(committed.job.state, AwardJobState::Committed);
        assert_eq!(committed.job.result_fingerprint.as_deref(), Some("0xabc"));
        assert_eq!(committed.transition.actor_id, "worker-1");
        assert_eq!(committed.job.state_version, 3);
    }

    #[test]
    fn retryable_failures_back_off_exponentially_then_dead_letter() {
        let engine = engine(2);
        let mut job = engine.create_job(payload(), "system", now()).job;
        let mut clock = now();

        for expected_delay in [10, 30] {
            let claimed = engine.claim(job, "w", clock).expect("claim");
            let failed = engine
                .fail(
                    claimed.job,
                    "ledger timeout",
                    "ledger_unavailable",
                    RetryPolicy::Retry,
                    clock,
                )
                .expect("fail");
            assert_eq!(failed.job.state, AwardJobState::RetryableFailed);
            assert_eq!(failed.job.available_at, clock + Duration::seconds(expected_delay));

            assert_eq!(
                engine.claim(failed.job.clone(), "w", clock),
                Err(QueueError::NotYetAvailable(failed.job.id.clone()))
            );
            clock = failed.job.available_at;
            job = failed.job;
        }

        let claimed = engine.claim(job, "w", clock).expect("claim");
        let failed = engine
            .fail(claimed.job, "ledger timeout", "ledger_unavailable", RetryPolicy::Retry, clock)
            .expect("fail");
        assert_eq!(failed.job.state, AwardJobState::Failed);
        assert_eq!(failed.job.retry_count, 2);
        assert_eq!(failed.transition.transition_reason, "job_failed_terminal");
    }

    #[test]
    fn backoff_is_capped_for_extreme_settings() {
        let engine = AwardJobEngine::new(JobEngineConfig {
            default_max_retries: 50,
            retry_base_delay_seconds: i64::MAX,
            retry_backoff_multiplier: u32::MAX,
            claim_timeout_seconds: 60,
        });

        assert_eq!(engine.backoff(0), Duration::seconds(MAX_BACKOFF_SECONDS));
        assert_eq!(engine.backoff(40), Duration::seconds(MAX_BACKOFF_SECONDS));

        let defaults = AwardJobEngine::new(JobEngineConfig::default());
        assert_eq!(defaults.backoff(2), Duration::seconds(20));
    }

    #[test]
    fn non_retryable_failure_is_terminal_immediately() {
        let engine = engine(5);
        let job = engine.create_job(payload(), "system", now()).job;
        let claimed = engine.claim(job, "w", now()).expect("claim");
        let failed = engine
            .fail(claimed.job, "tender missing", "not_found", RetryPolicy::FailTerminal, now())
            .expect("fail");

        assert_eq!(failed.job.state, AwardJobState::Failed);
        assert_eq!(failed.transition.error_class.as_deref(), Some("not_found"));
        assert!(matches!(
            engine.claim(failed.job, "w", now()),
            Err(QueueError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn running_claim_can_only_be_stolen_once_stale() {
        let engine = engine(3);
        let job = engine.create_job(payload(), "system", now()).job;
        let claimed = engine.claim(job, "w-1", now()).expect("claim");

        assert!(matches!(
            engine.claim(claimed.job.clone(), "w-2", now() + Duration::seconds(30)),
            Err(QueueError::ClaimConflict(_, ref owner)) if owner == "w-1"
        ));

        let stolen = engine
            .claim(claimed.job, "w-2", now() + Duration::seconds(61))
            .expect("stale claim is re-claimable");
        assert_eq!(stolen.job.claimed_by.as_deref(), Some("w-2"));
        assert_eq!(stolen.transition.transition_reason, "job_reclaimed");
    }

    #[test]
    fn commit_requires_running_state() {
        let engine = engine(3);
        let job = engine.create_job(payload(), "system", now()).job;
        assert!(matches!(
            engine.commit(job, "0xabc", now()),
            Err(QueueError::InvalidTransition { from: AwardJobState::Enqueued, .. })
        ));
    }
}
