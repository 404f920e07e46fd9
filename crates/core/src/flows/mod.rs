pub mod engine;

pub use engine::{FlowTransitionError, TenderStateMachine, TransitionVerdict};
