pub mod bids;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod flows;
pub mod jobs;
pub mod ledger;
pub mod lifecycle;
pub mod permissions;
pub mod store;

pub use bids::{AwardResolution, BidLedger, BidRevision, BidSubmission};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::actor::{Actor, CompanyId, Role, UserId};
pub use domain::bid::{Bid, BidId, BidStatus, Withdrawal};
pub use domain::job::{
    AwardCommitRequest, AwardJob, AwardJobId, AwardJobState, AwardJobTransition, OperationKey,
};
pub use domain::tender::{AwardOutcome, Cancellation, LedgerProof, Tender, TenderId, TenderStatus};
pub use errors::{ApplicationError, TenderError};
pub use events::{EventEnvelope, EventSink, InMemoryEventSink, TenderEvent, TracingEventSink};
pub use flows::{FlowTransitionError, TenderStateMachine, TransitionVerdict};
pub use jobs::{AwardJobEngine, AwardJobWorker, JobEngineConfig, WorkOutcome, WorkerSettings};
pub use ledger::{
    verify_award, AwardFacts, AwardLedgerClient, AwardVerification, InMemoryAwardLedger,
    LedgerError, OnLedgerAward,
};
pub use lifecycle::{LifecycleSettings, TenderDraft, TenderLifecycleService, TenderPatch};
pub use store::{AwardJobQueue, BidChanges, StoreError, TenderGuard, TenderStore};
