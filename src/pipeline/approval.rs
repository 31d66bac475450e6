//! Approval gate — the single point where a run waits on a human.
//!
//! A run paused here carries an [`Approval::Pending`] with a deadline.
//! Resumption may come from another process much later; no decision by the
//! deadline counts as a rejection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;
use crate::pipeline::types::{Classification, EmailRecord, ResponseDraft};

/// Why a draft was not sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    Reviewer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// The approval deadline passed with no decision.
    Timeout { deadline: DateTime<Utc> },
    Cancelled { reason: String },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reviewer { note: Some(note) } => write!(f, "rejected by reviewer: {note}"),
            Self::Reviewer { note: None } => write!(f, "rejected by reviewer"),
            Self::Timeout { deadline } => write!(f, "no decision before {deadline}"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}

/// Tri-state approval record kept on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Approval {
    Pending {
        requested_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    Approved {
        at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reviewer: Option<String>,
    },
    Rejected {
        at: DateTime<Utc>,
        reason: RejectionReason,
    },
}

impl Approval {
    pub fn pending(now: DateTime<Utc>, timeout: Duration) -> Self {
        Self::Pending {
            requested_at: now,
            deadline: now
                .checked_add_signed(timeout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Pending and past its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }
}

/// A reviewer's verdict on a paused run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reviewer: Option<String>,
    },
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self::Approve { reviewer: None }
    }

    pub fn reject(note: impl Into<String>) -> Self {
        Self::Reject {
            note: Some(note.into()),
        }
    }

    /// Resolve against a pending approval. Late decisions resolve as timeouts.
    pub fn resolve(self, pending: &Approval, now: DateTime<Utc>) -> Result<Approval, ApprovalError> {
        let Approval::Pending { deadline, .. } = pending else {
            return Err(ApprovalError::AlreadyDecided);
        };
        if now >= *deadline {
            return Ok(Approval::Rejected {
                at: now,
                reason: RejectionReason::Timeout {
                    deadline: *deadline,
                },
            });
        }
        Ok(match self {
            Self::Approve { reviewer } => Approval::Approved { at: now, reviewer },
            Self::Reject { note } => Approval::Rejected {
                at: now,
                reason: RejectionReason::Reviewer { note },
            },
        })
    }
}

/// What a reviewer sees.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub run_id: String,
    pub email: EmailRecord,
    pub classification: Classification,
    pub draft: ResponseDraft,
    pub deadline: DateTime<Utc>,
}

/// Human-in-the-loop collaborator.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> ReviewDecision;
}

/// Approves everything. For demos and tests.
pub struct AutoApprove;

#[async_trait]
impl Reviewer for AutoApprove {
    async fn review(&self, _request: &ReviewRequest) -> ReviewDecision {
        ReviewDecision::Approve {
            reviewer: Some("auto".into()),
        }
    }
}
