//! Run sequencing: the stage machine and the engine that drives it.

pub mod engine;
pub mod state;

pub use engine::{WorkflowDeps, WorkflowEngine, review_request};
pub use state::{RunState, Signal, Stage, StateTransition, TerminalStatus};
