//! End-to-end workflow tests with scripted collaborators.
//!
//! The LLM double answers classification and drafting requests from a
//! script keyed on the sender; the calendar and mailbox count their calls so
//! tests can assert which stages ran.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use inbox_agent::config::WorkflowConfig;
use inbox_agent::error::{
    ApprovalError, LlmError, RunFailure, SchedulingError, WorkflowError,
};
use inbox_agent::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use inbox_agent::pipeline::approval::{
    Approval, AutoApprove, RejectionReason, ReviewDecision, ReviewRequest, Reviewer,
};
use inbox_agent::pipeline::scheduling::{AvailabilityWindow, SchedulingService, free_slots};
use inbox_agent::pipeline::types::{CalendarSlot, EmailRecord, Intent};
use inbox_agent::services::{MemoryMailbox, StaticDirectory};
use inbox_agent::workflow::{RunState, Stage, TerminalStatus, WorkflowDeps, WorkflowEngine};

// ── Doubles ─────────────────────────────────────────────────────────

/// Answers by `metadata["purpose"]`: classification keyed on sender,
/// one shared draft reply with `{sender}` filled in from the prompt.
#[derive(Default)]
struct ScriptedLlm {
    classifications: Mutex<HashMap<String, String>>,
    draft: Mutex<Option<String>>,
    classify_calls: AtomicUsize,
    draft_prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn classify_as(&self, sender: &str, intent: &str, urgency: &str) {
        self.classify_raw(
            sender,
            &format!(
                r#"{{"intent": "{intent}", "urgency": "{urgency}", "requires_response": true, "reasoning": "scripted"}}"#
            ),
        );
    }

    fn classify_raw(&self, sender: &str, raw: &str) {
        self.classifications
            .lock()
            .unwrap()
            .insert(sender.to_string(), raw.to_string());
    }

    fn set_draft(&self, raw: Option<&str>) {
        *self.draft.lock().unwrap() = raw.map(String::from);
    }

    fn draft_calls(&self) -> usize {
        self.draft_prompts.lock().unwrap().len()
    }

    fn last_draft_prompt(&self) -> String {
        self.draft_prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn reply(content: String) -> CompletionResponse {
    CompletionResponse {
        content,
        input_tokens: 0,
        output_tokens: 0,
        finish_reason: FinishReason::Stop,
        response_id: None,
    }
}

fn scripted_failure(reason: &str) -> LlmError {
    LlmError::InvalidResponse {
        provider: "scripted".into(),
        reason: reason.into(),
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.last_user_message().unwrap_or_default().to_string();
        match request.metadata.get("purpose").map(String::as_str) {
            Some("classify") => {
                self.classify_calls.fetch_add(1, Ordering::SeqCst);
                let script = self.classifications.lock().unwrap();
                script
                    .iter()
                    .find(|(sender, _)| prompt.contains(&format!("From: {sender} ")))
                    .map(|(_, raw)| reply(raw.clone()))
                    .ok_or_else(|| scripted_failure("no classification scripted"))
            }
            Some("draft") => {
                let sender = prompt
                    .lines()
                    .find_map(|line| line.strip_prefix("From: "))
                    .unwrap_or_default()
                    .to_string();
                self.draft_prompts.lock().unwrap().push(prompt);
                self.draft
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|raw| reply(raw.replace("{sender}", &sender)))
                    .ok_or_else(|| scripted_failure("drafting disabled"))
            }
            other => Err(scripted_failure(&format!("unexpected purpose {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CalendarMode {
    /// Every working day is free.
    Free,
    /// No free time at all.
    Booked,
    Down,
}

struct CountingCalendar {
    mode: Mutex<CalendarMode>,
    calls: AtomicUsize,
}

impl CountingCalendar {
    fn new(mode: CalendarMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulingService for CountingCalendar {
    async fn availability(
        &self,
        window: &AvailabilityWindow,
    ) -> Result<Vec<CalendarSlot>, SchedulingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            CalendarMode::Free => Ok(free_slots(&[], window)),
            CalendarMode::Booked => Ok(Vec::new()),
            CalendarMode::Down => Err(SchedulingError::Unavailable {
                reason: "calendar API returned 503".into(),
            }),
        }
    }
}

/// Never answers in time.
struct AbsentReviewer;

#[async_trait]
impl Reviewer for AbsentReviewer {
    async fn review(&self, _request: &ReviewRequest) -> ReviewDecision {
        tokio::time::sleep(Duration::from_secs(30)).await;
        ReviewDecision::approve()
    }
}

// ── Harness ─────────────────────────────────────────────────────────

const DRAFT: &str = r#"{"subject": "Re: your email", "body": "Thanks for reaching out. Details below.", "tone": "professional", "includes_meeting_times": true}"#;

struct Harness {
    engine: WorkflowEngine,
    llm: Arc<ScriptedLlm>,
    calendar: Arc<CountingCalendar>,
    mailbox: Arc<MemoryMailbox>,
}

fn harness_with(config: WorkflowConfig, mode: CalendarMode) -> Harness {
    let llm = Arc::new(ScriptedLlm::default());
    llm.classify_as("ceo@x.com", "meeting_request", "high");
    llm.classify_as("support@customer.com", "support_question", "medium");
    llm.classify_as("newsletter@deals.example", "newsletter", "low");
    llm.set_draft(Some(DRAFT));

    let calendar = Arc::new(CountingCalendar::new(mode));
    let mailbox = Arc::new(MemoryMailbox::new());
    let engine = WorkflowEngine::new(
        config,
        WorkflowDeps {
            llm: llm.clone(),
            directory: Arc::new(StaticDirectory::demo()),
            calendar: calendar.clone(),
            mailbox: mailbox.clone(),
        },
    );
    Harness {
        engine,
        llm,
        calendar,
        mailbox,
    }
}

fn harness() -> Harness {
    harness_with(WorkflowConfig::default(), CalendarMode::Free)
}

fn meeting_email() -> EmailRecord {
    EmailRecord::new(
        "ceo@x.com",
        "Meeting Request: Q4 Planning",
        "Hi, I'd like to schedule a meeting next week to go over Q4 planning.",
        Utc::now(),
    )
}

fn support_email() -> EmailRecord {
    EmailRecord::new(
        "support@customer.com",
        "Question about your product features",
        "Can you send documentation for the API?",
        Utc::now(),
    )
}

fn newsletter_email() -> EmailRecord {
    EmailRecord::new(
        "newsletter@deals.example",
        "Amazing deals just for you!",
        "Don't miss out! Click here to save 90% on everything. Unsubscribe anytime.",
        Utc::now(),
    )
}

fn unwrap_run(result: Result<RunState, RunFailure>) -> RunState {
    match result {
        Ok(state) => state,
        Err(failure) => panic!("run failed: {failure}"),
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn meeting_request_offers_available_slots() {
    let h = harness();
    let state = unwrap_run(h.engine.submit(meeting_email()).await);

    assert!(state.is_paused());
    assert_eq!(state.status(), None);
    let classification = state.classification().unwrap();
    assert_eq!(classification.intent, Intent::MeetingRequest);
    assert!(classification.requires_response);
    assert_eq!(h.calendar.calls(), 1);

    let slots = state.slots().unwrap();
    assert_eq!(slots.len(), 5, "capped at max_slots");
    let draft = state.draft().unwrap();
    assert_eq!(draft.proposed_times, slots);
    assert!(draft.includes_meeting_times);

    let prompt = h.llm.last_draft_prompt();
    for slot in slots {
        assert!(prompt.contains(&slot.render()), "prompt missing {}", slot.render());
    }

    let stages: Vec<Stage> = state.transitions().iter().map(|t| t.to).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Enrich,
            Stage::Classify,
            Stage::CheckCalendar,
            Stage::Draft,
            Stage::AwaitApproval
        ]
    );
}

#[tokio::test]
async fn meeting_request_without_free_time_still_drafts() {
    let h = harness_with(WorkflowConfig::default(), CalendarMode::Booked);
    let state = unwrap_run(h.engine.submit(meeting_email()).await);

    assert!(state.is_paused());
    assert_eq!(h.calendar.calls(), 1);
    let draft = state.draft().unwrap();
    assert!(draft.proposed_times.is_empty());
    assert!(!draft.includes_meeting_times);
    assert!(h.llm.last_draft_prompt().contains("propose times"));
}

#[tokio::test]
async fn scheduling_outage_degrades_to_no_slots() {
    let h = harness_with(WorkflowConfig::default(), CalendarMode::Down);
    let state = unwrap_run(h.engine.submit(meeting_email()).await);

    assert!(state.is_paused());
    assert_eq!(state.slots(), Some(&[][..]));
    assert!(state.draft().unwrap().proposed_times.is_empty());
}

#[tokio::test]
async fn newsletter_is_ignored_without_drafting() {
    let h = harness();
    let state = unwrap_run(h.engine.submit(newsletter_email()).await);

    assert_eq!(state.status(), Some(TerminalStatus::Ignored));
    assert_eq!(state.classification().unwrap().intent, Intent::Newsletter);
    assert!(!state.classification().unwrap().requires_response);
    assert!(state.draft().is_none());
    assert_eq!(h.llm.draft_calls(), 0);
    assert_eq!(h.calendar.calls(), 0);
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn newsletter_is_ignored_by_the_model_too() {
    let config = WorkflowConfig {
        use_rules: false,
        ..WorkflowConfig::default()
    };
    let h = harness_with(config, CalendarMode::Free);
    let state = unwrap_run(h.engine.submit(newsletter_email()).await);

    assert_eq!(state.status(), Some(TerminalStatus::Ignored));
    assert_eq!(h.llm.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.llm.draft_calls(), 0);
}

#[tokio::test]
async fn rejected_support_reply_is_never_sent() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    assert!(paused.is_paused());
    assert_eq!(h.calendar.calls(), 0);
    assert!(paused.slots().is_none());

    let state = unwrap_run(
        h.engine
            .resume(paused, ReviewDecision::reject("needs links to the docs"))
            .await,
    );

    assert_eq!(state.status(), Some(TerminalStatus::Rejected));
    assert!(matches!(
        state.approval(),
        Some(Approval::Rejected {
            reason: RejectionReason::Reviewer { .. },
            ..
        })
    ));
    assert!(state.draft().is_some());
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn approved_reply_is_sent_in_thread() {
    let h = harness();
    let email = support_email().with_thread_id("thread-42");
    let email_id = email.id.clone();
    let paused = unwrap_run(h.engine.submit(email).await);
    let state = unwrap_run(h.engine.resume(paused, ReviewDecision::approve()).await);

    assert_eq!(state.status(), Some(TerminalStatus::Sent));
    let sent = h.mailbox.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target.in_reply_to, email_id);
    assert_eq!(sent[0].target.thread_id.as_deref(), Some("thread-42"));
    assert_eq!(Some(&sent[0].draft), state.draft());
    assert_eq!(
        state.receipt().map(|r| r.message_id.as_str()),
        Some(sent[0].receipt.message_id.as_str())
    );
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn dispatch_failure_preserves_the_approved_draft() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let approved_draft = paused.draft().cloned().unwrap();

    h.mailbox.set_offline(true);
    let failure = h
        .engine
        .resume(paused, ReviewDecision::approve())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Dispatch);
    assert!(matches!(failure.error, WorkflowError::Dispatch(_)));
    let failed = failure.into_state();
    assert_eq!(failed.status(), Some(TerminalStatus::Failed));
    assert_eq!(failed.draft(), Some(&approved_draft));
    assert!(failed.approval().unwrap().is_approved());
    assert!(failed.last_error().is_some());
    assert_eq!(h.mailbox.sent_count().await, 0);

    // Redispatch: a new run sends the same draft, the failed run is untouched.
    h.mailbox.set_offline(false);
    let snapshot = failed.clone();
    let retried = unwrap_run(h.engine.redispatch(&failed).await);

    assert_eq!(failed, snapshot);
    assert_ne!(retried.run_id, failed.run_id);
    assert_eq!(retried.retry_of.as_deref(), Some(failed.run_id.as_str()));
    assert_eq!(retried.status(), Some(TerminalStatus::Sent));
    assert_eq!(h.mailbox.sent().await[0].draft, approved_draft);
    // No re-classification or re-drafting happened.
    assert_eq!(h.llm.draft_calls(), 1);
}

#[tokio::test]
async fn redispatch_requires_a_failed_run() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let failure = h.engine.redispatch(&paused).await.unwrap_err();
    assert!(matches!(
        failure.error,
        WorkflowError::NotRetryable {
            stage: Stage::AwaitApproval
        }
    ));
    assert_eq!(failure.into_state(), paused);
}

#[tokio::test]
async fn classification_failure_aborts_and_can_be_retried() {
    let h = harness();
    h.llm.classify_raw("support@customer.com", "I'm not sure what this is.");

    let failure = h.engine.submit(support_email()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Classify);
    assert!(matches!(failure.error, WorkflowError::Classification(_)));

    let state = failure.into_state();
    assert_eq!(state.stage(), Stage::Classify);
    assert!(!state.is_terminal());
    assert!(state.classification().is_none(), "no fabricated classification");
    assert!(state.sender_context().is_some());
    assert!(state.last_error().unwrap().contains("Unparseable"));
    assert_eq!(h.llm.draft_calls(), 0);

    h.llm.classify_as("support@customer.com", "support_question", "medium");
    let resumed = unwrap_run(h.engine.retry(state).await);
    assert!(resumed.is_paused());
    assert!(resumed.draft().is_some());
}

#[tokio::test]
async fn drafting_failure_never_reaches_approval() {
    let h = harness();
    h.llm.set_draft(None);

    let failure = h.engine.submit(support_email()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Draft);
    assert!(matches!(failure.error, WorkflowError::Drafting(_)));
    let state = failure.into_state();
    assert!(state.draft().is_none());
    assert!(state.approval().is_none());
    assert!(state.classification().is_some());

    h.llm.set_draft(Some(DRAFT));
    let resumed = unwrap_run(h.engine.retry(state).await);
    assert!(resumed.is_paused());
}

#[tokio::test]
async fn retry_refuses_paused_and_terminal_runs() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let failure = h.engine.retry(paused).await.unwrap_err();
    assert!(matches!(failure.error, WorkflowError::NotRetryable { .. }));

    let ignored = unwrap_run(h.engine.submit(newsletter_email()).await);
    let failure = h.engine.retry(ignored).await.unwrap_err();
    assert!(matches!(
        failure.error,
        WorkflowError::AlreadyTerminal {
            status: TerminalStatus::Ignored
        }
    ));
}

// ── Approval gate ───────────────────────────────────────────────────

#[tokio::test]
async fn overdue_run_expires_as_rejected() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let deadline = paused.approval().unwrap().deadline().unwrap();

    let early = unwrap_run(
        h.engine
            .expire(paused, deadline - chrono::Duration::hours(1))
            .await,
    );
    assert!(early.is_paused(), "not yet due");

    let expired = unwrap_run(
        h.engine
            .expire(early, deadline + chrono::Duration::minutes(1))
            .await,
    );
    assert_eq!(expired.status(), Some(TerminalStatus::Rejected));
    assert!(matches!(
        expired.approval(),
        Some(Approval::Rejected {
            reason: RejectionReason::Timeout { .. },
            ..
        })
    ));
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn late_approval_counts_as_timeout() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let deadline = paused.approval().unwrap().deadline().unwrap();

    let state = unwrap_run(
        h.engine
            .resume_at(paused, ReviewDecision::approve(), deadline)
            .await,
    );
    assert_eq!(state.status(), Some(TerminalStatus::Rejected));
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn resume_requires_a_paused_run() {
    let h = harness();
    let ignored = unwrap_run(h.engine.submit(newsletter_email()).await);
    let failure = h
        .engine
        .resume(ignored, ReviewDecision::approve())
        .await
        .unwrap_err();
    assert!(matches!(failure.error, WorkflowError::AlreadyTerminal { .. }));

    let fresh = RunState::new(support_email());
    let failure = h
        .engine
        .resume(fresh, ReviewDecision::approve())
        .await
        .unwrap_err();
    assert!(matches!(
        failure.error,
        WorkflowError::Approval(ApprovalError::NotAwaitingApproval { stage: Stage::Start })
    ));
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn absent_reviewer_times_out() {
    let config = WorkflowConfig {
        approval_timeout: Duration::from_millis(50),
        ..WorkflowConfig::default()
    };
    let h = harness_with(config, CalendarMode::Free);
    let state = unwrap_run(
        h.engine
            .run_with_reviewer(support_email(), &AbsentReviewer)
            .await,
    );
    assert_eq!(state.status(), Some(TerminalStatus::Rejected));
    assert_eq!(h.mailbox.sent_count().await, 0);
}

#[tokio::test]
async fn reviewer_approval_sends() {
    let h = harness();
    let state = unwrap_run(h.engine.run_with_reviewer(meeting_email(), &AutoApprove).await);
    assert_eq!(state.status(), Some(TerminalStatus::Sent));
    assert_eq!(h.mailbox.sent_count().await, 1);

    let ignored = unwrap_run(
        h.engine
            .run_with_reviewer(newsletter_email(), &AutoApprove)
            .await,
    );
    assert_eq!(ignored.status(), Some(TerminalStatus::Ignored));
    assert_eq!(h.mailbox.sent_count().await, 1);
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn paused_run_can_be_cancelled() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    let state = h.engine.cancel(paused, "customer called instead").unwrap();

    assert_eq!(state.status(), Some(TerminalStatus::Cancelled));
    assert!(matches!(
        state.approval(),
        Some(Approval::Rejected {
            reason: RejectionReason::Cancelled { .. },
            ..
        })
    ));

    let failure = h.engine.cancel(state, "again").unwrap_err();
    assert!(matches!(failure.error, WorkflowError::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn dispatch_stage_cannot_be_cancelled() {
    let h = harness();
    let paused = unwrap_run(h.engine.submit(support_email()).await);
    h.mailbox.set_offline(true);
    let failed = h
        .engine
        .resume(paused, ReviewDecision::approve())
        .await
        .unwrap_err()
        .into_state();

    let at_dispatch = RunState::redispatch_of(&failed);
    assert_eq!(at_dispatch.stage(), Stage::Dispatch);
    let failure = h.engine.cancel(at_dispatch, "too late").unwrap_err();
    assert!(matches!(
        failure.error,
        WorkflowError::CancelRejected {
            stage: Stage::Dispatch
        }
    ));
}

#[tokio::test]
async fn unstarted_run_can_be_cancelled() {
    let h = harness();
    let state = h
        .engine
        .cancel(RunState::new(support_email()), "duplicate")
        .unwrap();
    assert_eq!(state.status(), Some(TerminalStatus::Cancelled));
    assert!(state.approval().is_none());
}

// ── Persistence & concurrency ───────────────────────────────────────

#[tokio::test]
async fn paused_run_resumes_from_disk_in_another_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");

    let first = harness();
    let paused = unwrap_run(first.engine.submit(meeting_email()).await);
    paused.save(&path).await.unwrap();
    drop(first);

    let second = harness();
    let loaded = RunState::load(&path).await.unwrap();
    assert_eq!(loaded, paused);

    let state = unwrap_run(second.engine.resume(loaded, ReviewDecision::approve()).await);
    assert_eq!(state.status(), Some(TerminalStatus::Sent));
    // Nothing before dispatch re-ran in the second engine.
    assert_eq!(second.llm.classify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second.llm.draft_calls(), 0);
    assert_eq!(second.calendar.calls(), 0);
    assert_eq!(second.mailbox.sent_count().await, 1);
}

#[tokio::test]
async fn batch_runs_are_isolated() {
    let h = harness();
    let emails = vec![meeting_email(), support_email(), newsletter_email()];
    let ids: Vec<String> = emails.iter().map(|e| e.id.clone()).collect();

    let results = h.engine.process_batch(emails).await;
    assert_eq!(results.len(), 3);

    let states: Vec<RunState> = results.into_iter().map(unwrap_run).collect();
    for (state, id) in states.iter().zip(&ids) {
        assert_eq!(&state.email().id, id);
    }
    assert!(states[0].is_paused());
    assert_eq!(states[0].classification().unwrap().intent, Intent::MeetingRequest);
    assert!(!states[0].draft().unwrap().proposed_times.is_empty());
    assert!(states[1].is_paused());
    assert!(states[1].slots().is_none());
    assert_eq!(states[2].status(), Some(TerminalStatus::Ignored));

    let mut run_ids: Vec<&str> = states.iter().map(|s| s.run_id.as_str()).collect();
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_runs_keep_their_own_state() {
    let h = harness();
    h.llm.set_draft(Some(
        r#"{"subject": "Re: question", "body": "Reply for {sender}", "tone": "friendly"}"#,
    ));
    let senders: Vec<String> = (0..8).map(|i| format!("client{i}@example.com")).collect();
    for sender in &senders {
        h.llm.classify_as(sender, "support_question", "medium");
    }
    let engine = Arc::new(h.engine);

    let handles: Vec<_> = senders
        .iter()
        .map(|sender| {
            let engine = engine.clone();
            let email = EmailRecord::new(
                sender.clone(),
                format!("Question from {sender}"),
                "How do I rotate my API key?",
                Utc::now(),
            );
            tokio::spawn(async move {
                let paused = engine.submit(email).await?;
                engine.resume(paused, ReviewDecision::approve()).await
            })
        })
        .collect();

    let mut run_ids = Vec::new();
    for (sender, handle) in senders.iter().zip(handles) {
        let state = unwrap_run(handle.await.unwrap());
        assert_eq!(&state.email().sender, sender);
        assert_eq!(state.email().subject, format!("Question from {sender}"));
        assert_eq!(state.draft().unwrap().body, format!("Reply for {sender}"));
        assert_eq!(state.status(), Some(TerminalStatus::Sent));
        run_ids.push(state.run_id.clone());
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), senders.len());

    let sent = h.mailbox.sent().await;
    assert_eq!(sent.len(), senders.len());
    for reply in &sent {
        assert_eq!(reply.draft.body, format!("Reply for {}", reply.target.to));
    }
}

#[tokio::test]
async fn bulk_phrasing_from_key_stakeholder_reaches_classifier() {
    let h = harness();
    let email = EmailRecord::new(
        "ceo@company.com",
        "Meeting Request: Q4 Planning",
        "We need to act now: please schedule a meeting. Opt out of the prep call if busy.",
        Utc::now(),
    );
    h.llm.classify_as("ceo@company.com", "meeting_request", "high");
    let state = unwrap_run(h.engine.submit(email).await);

    assert_eq!(h.llm.classify_calls.load(Ordering::SeqCst), 1);
    assert!(state.is_paused());
    assert_eq!(state.classification().unwrap().intent, Intent::MeetingRequest);
    assert_eq!(h.calendar.calls(), 1);
}
