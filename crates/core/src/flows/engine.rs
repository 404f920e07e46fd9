use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tender::TenderStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionVerdict {
    /// Requested status equals the current one; nothing to persist.
    Unchanged,
    Valid,
}

impl TransitionVerdict {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unchanged => "status unchanged",
            Self::Valid => "valid transition",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot transition from `{from}` to `{to}`; allowed: [{}]", join_statuses(.allowed))]
    NotAllowed { from: TenderStatus, to: TenderStatus, allowed: Vec<TenderStatus> },
    #[error("cancellation from `{from}` requires a reason")]
    MissingCancellationReason { from: TenderStatus },
}

/// Tender lifecycle rules. Pure; callers persist outcomes and dispatch side effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct TenderStateMachine;

impl TenderStateMachine {
    pub fn allowed_transitions(from: TenderStatus) -> &'static [TenderStatus] {
        use TenderStatus::{Awarded, Cancelled, Closed, Draft, Evaluation, Open, Published};

        match from {
            Draft => &[Published, Cancelled],
            Published => &[Open, Cancelled],
            Open => &[Evaluation, Closed, Cancelled],
            Evaluation => &[Awarded, Open, Cancelled],
            Closed => &[Evaluation, Cancelled],
            Awarded | Cancelled => &[],
        }
    }

    pub fn can_transition(from: TenderStatus, to: TenderStatus) -> bool {
        Self::allowed_transitions(from).contains(&to)
    }

    pub fn validate_transition(
        from: TenderStatus,
        to: TenderStatus,
        reason: Option<&str>,
    ) -> Result<TransitionVerdict, FlowTransitionError> {
        if from == to {
            return Ok(TransitionVerdict::Unchanged);
        }

        if !Self::can_transition(from, to) {
            return Err(FlowTransitionError::NotAllowed {
                from,
                to,
                allowed: Self::allowed_transitions(from).to_vec(),
            });
        }

        let has_reason = reason.map(|value| !value.trim().is_empty()).unwrap_or(false);
        if to == TenderStatus::Cancelled && !has_reason {
            return Err(FlowTransitionError::MissingCancellationReason { from });
        }

        Ok(TransitionVerdict::Valid)
    }

    pub fn should_auto_close(
        status: TenderStatus,
        closing_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        status == TenderStatus::Open && now >= closing_at
    }

    pub fn should_auto_publish(
        status: TenderStatus,
        publish_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        status == TenderStatus::Draft && publish_at.is_some_and(|at| at <= now)
    }
}

fn join_statuses(statuses: &[TenderStatus]) -> String {
    statuses.iter().map(TenderStatus::as_str).collect::<Vec<_>>().join(", ")
}
