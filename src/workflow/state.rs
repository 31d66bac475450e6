//! Run state machine.
//!
//! A run moves through a closed set of stages driven by signals. The
//! transition table in [`Stage::next`] is the only place stage order is
//! defined; [`RunState::advance`] is the only way a run changes stage.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::pipeline::approval::Approval;
use crate::pipeline::types::{
    CalendarSlot, Classification, DeliveryReceipt, EmailRecord, ResponseDraft, SenderContext,
};

/// Where a run is. Non-terminal stages name the work still to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Enrich,
    Classify,
    CheckCalendar,
    Draft,
    /// Paused for a human decision.
    AwaitApproval,
    Dispatch,
    Ignored,
    Rejected,
    Sent,
    Failed,
    Cancelled,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Start,
        Stage::Enrich,
        Stage::Classify,
        Stage::CheckCalendar,
        Stage::Draft,
        Stage::AwaitApproval,
        Stage::Dispatch,
        Stage::Ignored,
        Stage::Rejected,
        Stage::Sent,
        Stage::Failed,
        Stage::Cancelled,
    ];

    /// The transition table.
    pub fn next(self, signal: Signal) -> Option<Stage> {
        use Signal as S;
        use Stage::*;

        match (self, signal) {
            (Start, S::Begin) => Some(Enrich),
            (Enrich, S::Enriched) => Some(Classify),
            (Classify, S::NoResponseNeeded) => Some(Ignored),
            (Classify, S::NeedsCalendar) => Some(CheckCalendar),
            (Classify, S::NeedsDraft) => Some(Draft),
            (CheckCalendar, S::SlotsResolved) => Some(Draft),
            (Draft, S::Drafted) => Some(AwaitApproval),
            (AwaitApproval, S::Approved) => Some(Dispatch),
            (AwaitApproval, S::Rejected) => Some(Rejected),
            (Dispatch, S::Delivered) => Some(Sent),
            (Dispatch, S::DeliveryFailed) => Some(Failed),
            (s, S::Cancel) if s.is_cancellable() => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.terminal_status().is_some()
    }

    /// Any non-terminal stage before the send.
    pub fn is_cancellable(self) -> bool {
        !self.is_terminal() && self != Stage::Dispatch
    }

    pub fn terminal_status(self) -> Option<TerminalStatus> {
        match self {
            Stage::Ignored => Some(TerminalStatus::Ignored),
            Stage::Rejected => Some(TerminalStatus::Rejected),
            Stage::Sent => Some(TerminalStatus::Sent),
            Stage::Failed => Some(TerminalStatus::Failed),
            Stage::Cancelled => Some(TerminalStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Enrich => "enrich",
            Self::Classify => "classify",
            Self::CheckCalendar => "check_calendar",
            Self::Draft => "draft",
            Self::AwaitApproval => "await_approval",
            Self::Dispatch => "dispatch",
            Self::Ignored => "ignored",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Stage completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Begin,
    Enriched,
    NoResponseNeeded,
    NeedsCalendar,
    NeedsDraft,
    SlotsResolved,
    Drafted,
    Approved,
    /// Reviewer rejection or approval timeout.
    Rejected,
    Delivered,
    DeliveryFailed,
    Cancel,
}

impl Signal {
    pub const ALL: [Signal; 12] = [
        Signal::Begin,
        Signal::Enriched,
        Signal::NoResponseNeeded,
        Signal::NeedsCalendar,
        Signal::NeedsDraft,
        Signal::SlotsResolved,
        Signal::Drafted,
        Signal::Approved,
        Signal::Rejected,
        Signal::Delivered,
        Signal::DeliveryFailed,
        Signal::Cancel,
    ];
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Begin => "begin",
            Self::Enriched => "enriched",
            Self::NoResponseNeeded => "no_response_needed",
            Self::NeedsCalendar => "needs_calendar",
            Self::NeedsDraft => "needs_draft",
            Self::SlotsResolved => "slots_resolved",
            Self::Drafted => "drafted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Delivered => "delivered",
            Self::DeliveryFailed => "delivery_failed",
            Self::Cancel => "cancel",
        };
        write!(f, "{s}")
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Sent,
    Rejected,
    Ignored,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sent => "sent",
            Self::Rejected => "rejected",
            Self::Ignored => "ignored",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: Stage,
    pub to: Stage,
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Everything a run knows. Owned exclusively by its run.
///
/// Stages fill fields in; nothing is cleared. Serializes to a self-contained
/// handle so a paused run can be resumed from another process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    /// Run this one re-dispatches, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    email: EmailRecord,
    stage: Stage,
    pub(crate) sender_context: Option<SenderContext>,
    pub(crate) classification: Option<Classification>,
    /// `None` when no calendar lookup happened.
    pub(crate) slots: Option<Vec<CalendarSlot>>,
    pub(crate) draft: Option<ResponseDraft>,
    pub(crate) approval: Option<Approval>,
    pub(crate) receipt: Option<DeliveryReceipt>,
    /// Most recent stage failure.
    pub(crate) last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    transitions: Vec<StateTransition>,
}

impl RunState {
    pub fn new(email: EmailRecord) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            retry_of: None,
            email,
            stage: Stage::Start,
            sender_context: None,
            classification: None,
            slots: None,
            draft: None,
            approval: None,
            receipt: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        }
    }

    /// A fresh run positioned at dispatch, carrying a failed run's approved
    /// draft. The failed run is left untouched.
    pub fn redispatch_of(failed: &RunState) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            retry_of: Some(failed.run_id.clone()),
            stage: Stage::Dispatch,
            receipt: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
            ..failed.clone()
        }
    }

    /// Apply a signal. Terminal runs never change again.
    pub fn advance(&mut self, signal: Signal, note: Option<String>) -> Result<Stage, WorkflowError> {
        if let Some(status) = self.status() {
            return Err(WorkflowError::AlreadyTerminal { status });
        }
        let to = self
            .stage
            .next(signal)
            .ok_or(WorkflowError::InvalidTransition {
                from: self.stage,
                signal,
            })?;

        let now = Utc::now();
        self.transitions.push(StateTransition {
            from: self.stage,
            to,
            signal,
            timestamp: now,
            note,
        });
        self.stage = to;
        self.updated_at = now;
        Ok(to)
    }

    pub(crate) fn record_error(&mut self, error: &WorkflowError) {
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    pub fn email(&self) -> &EmailRecord {
        &self.email
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Set exactly once, when the run reaches a terminal stage.
    pub fn status(&self) -> Option<TerminalStatus> {
        self.stage.terminal_status()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_paused(&self) -> bool {
        self.stage == Stage::AwaitApproval
    }

    pub fn sender_context(&self) -> Option<&SenderContext> {
        self.sender_context.as_ref()
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn slots(&self) -> Option<&[CalendarSlot]> {
        self.slots.as_deref()
    }

    pub fn draft(&self) -> Option<&ResponseDraft> {
        self.draft.as_ref()
    }

    pub fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    pub fn receipt(&self) -> Option<&DeliveryReceipt> {
        self.receipt.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    // ── Persistence ─────────────────────────────────────────────────

    pub fn to_json(&self) -> Result<String, WorkflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }
}
