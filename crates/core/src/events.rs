use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::actor::{CompanyId, UserId};
use crate::domain::bid::BidId;
use crate::domain::tender::{TenderId, TenderStatus};

/// Semantic lifecycle events handed to notification dispatch. Rendering is the sink's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TenderEvent {
    TenderStatusChanged {
        tender_id: TenderId,
        from: TenderStatus,
        to: TenderStatus,
        actor: UserId,
        reason: Option<String>,
    },
    TenderAwarded {
        tender_id: TenderId,
        winning_bid_id: BidId,
        winning_company_id: CompanyId,
        amount: Decimal,
        actor: UserId,
    },
    BidSubmitted {
        tender_id: TenderId,
        bid_id: BidId,
        company_id: CompanyId,
        amount: Decimal,
        revision: u32,
    },
    BidWithdrawn {
        tender_id: TenderId,
        bid_id: BidId,
        company_id: CompanyId,
        reason: String,
    },
}

impl TenderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TenderStatusChanged { .. } => "tender_status_changed",
            Self::TenderAwarded { .. } => "tender_awarded",
            Self::BidSubmitted { .. } => "bid_submitted",
            Self::BidWithdrawn { .. } => "bid_withdrawn",
        }
    }

    pub fn tender_id(&self) -> &TenderId {
        match self {
            Self::TenderStatusChanged { tender_id, .. }
            | Self::TenderAwarded { tender_id, .. }
            | Self::BidSubmitted { tender_id, .. }
            | Self::BidWithdrawn { tender_id, .. } => tender_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
    pub event: TenderEvent,
}

impl EventEnvelope {
    pub fn new(
        correlation_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        event: TenderEvent,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            occurred_at,
            event,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<EventEnvelope> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|envelope| envelope.event.name()).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        match self.events.lock() {
            Ok(mut events) => events.push(envelope),
            Err(poisoned) => poisoned.into_inner().push(envelope),
        }
    }
}

/// Renders events as structured log lines for whatever collector tails the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        let payload = serde_json::to_string(&envelope.event).unwrap_or_default();
        info!(
            event_name = "tender.event.emitted",
            event_type = envelope.event.name(),
            event_id = %envelope.event_id,
            correlation_id = %envelope.correlation_id,
            tender_id = %envelope.event.tender_id(),
            payload = %payload,
            "tender lifecycle event"
        );
    }
}
