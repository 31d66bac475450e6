//! Workflow engine — drives a run through its stages.
//!
//! `submit` runs until the run is terminal or paused at approval. A paused
//! run is a plain value: persist it, hand it to a reviewer, and `resume` it
//! later, possibly in another process. Aborted runs come back as a
//! [`RunFailure`] carrying the state as it stood when the stage failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::WorkflowConfig;
use crate::error::{ApprovalError, RunFailure, WorkflowError};
use crate::llm::LlmProvider;
use crate::pipeline::approval::{Approval, RejectionReason, ReviewDecision, ReviewRequest, Reviewer};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::dispatch::{Dispatcher, Mailbox};
use crate::pipeline::drafter::{Availability, Drafter};
use crate::pipeline::enrich::{SenderDirectory, enrich_sender};
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::scheduling::{AvailabilityWindow, SchedulingResolver, SchedulingService};
use crate::pipeline::types::{Classification, EmailRecord};
use crate::workflow::state::{RunState, Signal, Stage, TerminalStatus};

/// External collaborators. All must tolerate concurrent use.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub directory: Arc<dyn SenderDirectory>,
    pub calendar: Arc<dyn SchedulingService>,
    pub mailbox: Arc<dyn Mailbox>,
}

pub struct WorkflowEngine {
    config: WorkflowConfig,
    directory: Arc<dyn SenderDirectory>,
    classifier: Classifier,
    resolver: SchedulingResolver,
    drafter: Drafter,
    dispatcher: Dispatcher,
}

impl WorkflowEngine {
    pub fn new(config: WorkflowConfig, deps: WorkflowDeps) -> Self {
        let mut classifier = Classifier::new(deps.llm.clone(), config.response_policy.clone())
            .with_sampling(config.temperature, config.max_tokens);
        if config.use_rules {
            classifier = classifier.with_rules(
                RulesEngine::default_rules().with_always_classify(config.always_classify.clone()),
            );
        }

        Self {
            directory: deps.directory,
            classifier,
            resolver: SchedulingResolver::new(deps.calendar, config.max_slots),
            drafter: Drafter::new(deps.llm).with_sampling(config.temperature, config.max_tokens),
            dispatcher: Dispatcher::new(deps.mailbox),
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    // ── Entry points ────────────────────────────────────────────────

    /// Start a run. Returns a terminal run (`ignored`) or one paused at
    /// `await_approval`.
    pub async fn submit(&self, email: EmailRecord) -> Result<RunState, RunFailure> {
        let state = RunState::new(email);
        info!(
            run_id = %state.run_id,
            sender = %state.email().sender,
            subject = %state.email().subject,
            "Run started"
        );
        self.drive(state).await
    }

    /// Apply a reviewer decision to a paused run.
    pub async fn resume(
        &self,
        state: RunState,
        decision: ReviewDecision,
    ) -> Result<RunState, RunFailure> {
        self.resume_at(state, decision, Utc::now()).await
    }

    /// [`resume`](Self::resume) with an explicit clock. Decisions arriving
    /// at or after the deadline resolve as timeouts.
    pub async fn resume_at(
        &self,
        state: RunState,
        decision: ReviewDecision,
        now: DateTime<Utc>,
    ) -> Result<RunState, RunFailure> {
        let resolved = match pending_approval(&state).and_then(|pending| {
            decision
                .resolve(pending, now)
                .map_err(WorkflowError::from)
        }) {
            Ok(resolved) => resolved,
            Err(e) => return Err(refuse(state, e)),
        };
        self.apply_decision(state, resolved).await
    }

    /// Reject a paused run whose deadline has passed. Runs still inside
    /// their window come back unchanged.
    pub async fn expire(
        &self,
        state: RunState,
        now: DateTime<Utc>,
    ) -> Result<RunState, RunFailure> {
        let deadline = match pending_approval(&state) {
            Ok(pending) => pending.deadline().filter(|_| pending.is_expired(now)),
            Err(e) => return Err(refuse(state, e)),
        };
        let Some(deadline) = deadline else {
            return Ok(state);
        };

        warn!(run_id = %state.run_id, %deadline, "Approval deadline passed, rejecting draft");
        let resolved = Approval::Rejected {
            at: now,
            reason: RejectionReason::Timeout { deadline },
        };
        self.apply_decision(state, resolved).await
    }

    /// Re-execute the stage an aborted, non-terminal run stopped at.
    pub async fn retry(&self, state: RunState) -> Result<RunState, RunFailure> {
        if let Some(status) = state.status() {
            return Err(refuse(state, WorkflowError::AlreadyTerminal { status }));
        }
        if state.is_paused() {
            let stage = state.stage();
            return Err(refuse(state, WorkflowError::NotRetryable { stage }));
        }

        info!(
            run_id = %state.run_id,
            stage = %state.stage(),
            last_error = state.last_error().unwrap_or("none"),
            "Retrying run"
        );
        self.drive(state).await
    }

    /// Send a failed run's approved draft again, as a new run.
    ///
    /// The new run has a fresh id with `retry_of` pointing at `failed`,
    /// which is not modified.
    pub async fn redispatch(&self, failed: &RunState) -> Result<RunState, RunFailure> {
        if failed.status() != Some(TerminalStatus::Failed) {
            let error = WorkflowError::NotRetryable {
                stage: failed.stage(),
            };
            return Err(refuse(failed.clone(), error));
        }
        if failed.draft().is_none() {
            let error = WorkflowError::MissingField {
                stage: failed.stage(),
                field: "draft",
            };
            return Err(refuse(failed.clone(), error));
        }

        let state = RunState::redispatch_of(failed);
        info!(
            run_id = %state.run_id,
            retry_of = %failed.run_id,
            "Re-dispatching preserved draft"
        );
        self.drive(state).await
    }

    /// Cancel a run that has not reached dispatch.
    pub fn cancel(&self, mut state: RunState, reason: &str) -> Result<RunState, RunFailure> {
        if let Some(status) = state.status() {
            return Err(refuse(state, WorkflowError::AlreadyTerminal { status }));
        }
        let stage = state.stage();
        if !stage.is_cancellable() {
            return Err(refuse(state, WorkflowError::CancelRejected { stage }));
        }

        if state.is_paused() {
            state.approval = Some(Approval::Rejected {
                at: Utc::now(),
                reason: RejectionReason::Cancelled {
                    reason: reason.to_string(),
                },
            });
        }
        if let Err(e) = state.advance(Signal::Cancel, Some(reason.to_string())) {
            return Err(refuse(state, e));
        }

        info!(run_id = %state.run_id, %stage, reason, "Run cancelled");
        Ok(state)
    }

    /// Submit, ask `reviewer`, and resume. The reviewer gets until the
    /// approval deadline; after that the draft is rejected.
    pub async fn run_with_reviewer(
        &self,
        email: EmailRecord,
        reviewer: &dyn Reviewer,
    ) -> Result<RunState, RunFailure> {
        let state = self.submit(email).await?;
        if !state.is_paused() {
            return Ok(state);
        }

        let request = match review_request(&state) {
            Ok(request) => request,
            Err(e) => return Err(refuse(state, e)),
        };
        let wait = (request.deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        match tokio::time::timeout(wait, reviewer.review(&request)).await {
            Ok(decision) => self.resume(state, decision).await,
            Err(_) => self.expire(state, request.deadline).await,
        }
    }

    /// Run independent emails concurrently. Results keep input order.
    pub async fn process_batch(
        &self,
        emails: Vec<EmailRecord>,
    ) -> Vec<Result<RunState, RunFailure>> {
        info!(count = emails.len(), "Processing batch");
        stream::iter(emails)
            .map(|email| self.submit(email))
            .buffered(self.config.max_concurrent_runs.max(1))
            .collect()
            .await
    }

    // ── Stage execution ─────────────────────────────────────────────

    async fn drive(&self, mut state: RunState) -> Result<RunState, RunFailure> {
        while !state.is_terminal() && !state.is_paused() {
            let stage = state.stage();
            debug!(run_id = %state.run_id, %stage, "Entering stage");
            if let Err(e) = self.run_stage(&mut state).await {
                state.record_error(&e);
                error!(run_id = %state.run_id, %stage, error = %e, "Run aborted");
                return Err(RunFailure::new(stage, e, state));
            }
        }

        match state.status() {
            Some(status) => info!(run_id = %state.run_id, %status, "Run finished"),
            None => info!(
                run_id = %state.run_id,
                deadline = ?state.approval().and_then(Approval::deadline),
                "Run paused for approval"
            ),
        }
        Ok(state)
    }

    async fn run_stage(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let stage = state.stage();
        match stage {
            Stage::Start => {
                state.advance(Signal::Begin, None)?;
            }

            Stage::Enrich => {
                let context = enrich_sender(self.directory.as_ref(), state.email()).await;
                let note = format!(
                    "importance {}, relationship {}",
                    context.importance, context.relationship
                );
                state.sender_context = Some(context);
                state.advance(Signal::Enriched, Some(note))?;
            }

            Stage::Classify => {
                let context = require(state.sender_context(), stage, "sender_context")?;
                let classification = self.classifier.classify(state.email(), context).await?;
                let signal = route(&classification);
                let note = format!("{} / {}", classification.intent, classification.urgency);
                state.classification = Some(classification);
                state.advance(signal, Some(note))?;
            }

            Stage::CheckCalendar => {
                let window = self.availability_window(Utc::now());
                let slots = match self.resolver.resolve(&window).await {
                    Ok(slots) => slots,
                    Err(e) => {
                        warn!(
                            run_id = %state.run_id,
                            error = %e,
                            "Scheduling unavailable, drafting without slots"
                        );
                        Vec::new()
                    }
                };
                let note = format!("{} slot(s)", slots.len());
                state.slots = Some(slots);
                state.advance(Signal::SlotsResolved, Some(note))?;
            }

            Stage::Draft => {
                let context = require(state.sender_context(), stage, "sender_context")?;
                let classification = require(state.classification(), stage, "classification")?;
                let availability = match state.slots() {
                    Some(slots) => Availability::Slots(slots),
                    None => Availability::NotChecked,
                };
                let draft = self
                    .drafter
                    .draft(state.email(), context, classification, availability)
                    .await?;

                let note = format!("tone: {}", draft.tone);
                state.draft = Some(draft);
                state.approval = Some(Approval::pending(Utc::now(), self.approval_timeout()));
                state.advance(Signal::Drafted, Some(note))?;
            }

            Stage::Dispatch => {
                let draft = require(state.draft(), stage, "draft")?;
                match self.dispatcher.dispatch(draft, state.email()).await {
                    Ok(receipt) => {
                        let note = format!("message id {}", receipt.message_id);
                        state.receipt = Some(receipt);
                        state.advance(Signal::Delivered, Some(note))?;
                    }
                    Err(e) => {
                        state.advance(Signal::DeliveryFailed, Some(e.to_string()))?;
                        return Err(e.into());
                    }
                }
            }

            // Not executable: paused or finished.
            Stage::AwaitApproval
            | Stage::Ignored
            | Stage::Rejected
            | Stage::Sent
            | Stage::Failed
            | Stage::Cancelled => {}
        }
        Ok(())
    }

    async fn apply_decision(
        &self,
        mut state: RunState,
        resolved: Approval,
    ) -> Result<RunState, RunFailure> {
        let (signal, note) = match &resolved {
            Approval::Approved { reviewer, .. } => (
                Signal::Approved,
                reviewer.as_ref().map(|r| format!("approved by {r}")),
            ),
            Approval::Rejected { reason, .. } => (Signal::Rejected, Some(reason.to_string())),
            Approval::Pending { .. } => {
                let error = WorkflowError::Approval(ApprovalError::NotAwaitingApproval {
                    stage: state.stage(),
                });
                return Err(refuse(state, error));
            }
        };

        state.approval = Some(resolved);
        if let Err(e) = state.advance(signal, note) {
            return Err(refuse(state, e));
        }

        if signal == Signal::Approved {
            info!(run_id = %state.run_id, "Draft approved");
            self.drive(state).await
        } else {
            info!(run_id = %state.run_id, "Draft rejected");
            Ok(state)
        }
    }

    fn availability_window(&self, now: DateTime<Utc>) -> AvailabilityWindow {
        AvailabilityWindow::new(now, self.config.days_ahead)
            .with_min_duration(chrono::Duration::minutes(i64::from(
                self.config.min_slot_minutes,
            )))
            .with_working_hours(self.config.workday_start_hour, self.config.workday_end_hour)
    }

    fn approval_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.approval_timeout).unwrap_or(chrono::Duration::MAX)
    }
}

/// What a paused run shows its reviewer.
pub fn review_request(state: &RunState) -> Result<ReviewRequest, WorkflowError> {
    let stage = state.stage();
    let pending = pending_approval(state)?;
    let deadline = pending.deadline().ok_or(ApprovalError::AlreadyDecided)?;
    Ok(ReviewRequest {
        run_id: state.run_id.clone(),
        email: state.email().clone(),
        classification: require(state.classification(), stage, "classification")?.clone(),
        draft: require(state.draft(), stage, "draft")?.clone(),
        deadline,
    })
}

fn route(classification: &Classification) -> Signal {
    if !classification.requires_response {
        Signal::NoResponseNeeded
    } else if classification.needs_calendar() {
        Signal::NeedsCalendar
    } else {
        Signal::NeedsDraft
    }
}

fn pending_approval(state: &RunState) -> Result<&Approval, WorkflowError> {
    if let Some(status) = state.status() {
        return Err(WorkflowError::AlreadyTerminal { status });
    }
    if !state.is_paused() {
        return Err(ApprovalError::NotAwaitingApproval {
            stage: state.stage(),
        }
        .into());
    }
    require(state.approval(), state.stage(), "approval")
}

fn require<'a, T>(
    value: Option<&'a T>,
    stage: Stage,
    field: &'static str,
) -> Result<&'a T, WorkflowError> {
    value.ok_or(WorkflowError::MissingField { stage, field })
}

/// Precondition failure. The state is handed back untouched.
fn refuse(state: RunState, error: WorkflowError) -> RunFailure {
    warn!(run_id = %state.run_id, stage = %state.stage(), error = %error, "Operation refused");
    RunFailure::new(state.stage(), error, state)
}
