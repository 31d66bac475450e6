//! Error types for the inbox agent.

use std::time::Duration;

use crate::workflow::state::{RunState, Signal, Stage, TerminalStatus};

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Run(#[from] RunFailure),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Transport-level failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequestFailed { .. } | Self::RateLimited { .. })
    }
}

/// Classifier failures. The workflow never substitutes a default classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparseable classification ({reason})")]
    Unparseable { reason: String, raw: String },
}

/// Drafter failures. No partial draft is ever surfaced to approval.
#[derive(Debug, thiserror::Error)]
pub enum DraftingError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparseable draft ({reason})")]
    Unparseable { reason: String, raw: String },

    #[error("Draft is missing required field: {field}")]
    Incomplete { field: String },
}

/// Sender directory failures. Enrichment falls back to a default context.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Sender directory unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Scheduling service failures. Recovered locally by the engine.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Scheduling service unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Mailbox send failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to send reply: {reason}")]
    SendFailed { reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Mail transport error: {0}")]
    Transport(String),
}

/// Approval gate errors.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Run is not awaiting approval (stage: {stage})")]
    NotAwaitingApproval { stage: Stage },

    #[error("Approval was already decided")]
    AlreadyDecided,
}

/// Workflow engine errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Drafting failed: {0}")]
    Drafting(#[from] DraftingError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("No transition from {from} on {signal}")]
    InvalidTransition { from: Stage, signal: Signal },

    #[error("Run already terminated with status {status}")]
    AlreadyTerminal { status: TerminalStatus },

    #[error("Cannot cancel run at stage {stage}")]
    CancelRejected { stage: Stage },

    #[error("Run at stage {stage} cannot be retried")]
    NotRetryable { stage: Stage },

    #[error("Run state is missing {field} required at stage {stage}")]
    MissingField { stage: Stage, field: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An aborted run: the failing stage, the cause, and the run state as it
/// stood when the stage failed.
#[derive(Debug, thiserror::Error)]
#[error("run {} failed at {stage}: {error}", .state.run_id)]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: WorkflowError,
    pub state: Box<RunState>,
}

impl RunFailure {
    pub fn new(stage: Stage, error: impl Into<WorkflowError>, state: RunState) -> Self {
        Self {
            stage,
            error: error.into(),
            state: Box::new(state),
        }
    }

    /// Recover the preserved run state.
    pub fn into_state(self) -> RunState {
        *self.state
    }
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
