//! Drafter — turns a classified email into a reply draft.
//!
//! The model writes subject, body and tone. Proposed meeting times are never
//! taken from the model: the draft carries exactly the slots the scheduling
//! resolver produced, in order.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::DraftingError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::pipeline::types::{
    CalendarSlot, Classification, EmailRecord, Intent, ResponseDraft, SenderContext, Urgency,
};

const MAX_BODY_CHARS: usize = 4000;

/// Calendar input to a draft.
#[derive(Debug, Clone, Copy)]
pub enum Availability<'a> {
    /// No calendar lookup was needed for this intent.
    NotChecked,
    /// Free slots found, possibly none.
    Slots(&'a [CalendarSlot]),
}

impl<'a> Availability<'a> {
    pub fn slots(&self) -> &'a [CalendarSlot] {
        match self {
            Self::NotChecked => &[],
            Self::Slots(slots) => slots,
        }
    }
}

pub struct Drafter {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl Drafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub async fn draft(
        &self,
        email: &EmailRecord,
        context: &SenderContext,
        classification: &Classification,
        availability: Availability<'_>,
    ) -> Result<ResponseDraft, DraftingError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_draft_system_prompt()),
            ChatMessage::user(build_draft_user_prompt(
                email,
                context,
                classification,
                availability,
            )),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_metadata("purpose", "draft")
        .with_metadata("intent", classification.intent.as_str());

        let response = self.llm.complete(request).await?;

        let parsed = parse_draft_response(&response.content).map_err(|reason| {
            warn!(
                email_id = %email.id,
                raw_response = %response.content,
                error = %reason,
                "Failed to parse draft response"
            );
            DraftingError::Unparseable {
                reason,
                raw: response.content.clone(),
            }
        })?;

        let body = parsed.body.trim().to_string();
        if body.is_empty() {
            return Err(DraftingError::Incomplete {
                field: "body".into(),
            });
        }

        let subject = match parsed.subject.map(|s| s.trim().to_string()) {
            Some(s) if !s.is_empty() => s,
            _ => reply_subject(&email.subject),
        };

        let proposed_times = availability.slots().to_vec();
        let includes_meeting_times = !proposed_times.is_empty();
        if parsed.includes_meeting_times == Some(true) && !includes_meeting_times {
            warn!(
                email_id = %email.id,
                "Model claimed meeting times but none were available; ignoring"
            );
        }

        let draft = ResponseDraft {
            subject,
            body,
            tone: parsed
                .tone
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "professional".to_string()),
            includes_meeting_times,
            proposed_times,
        };

        info!(
            email_id = %email.id,
            tone = %draft.tone,
            proposed = draft.proposed_times.len(),
            "Drafted response"
        );

        Ok(draft)
    }
}

/// `Re: ` prefix, not doubled.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_draft_system_prompt() -> String {
    "You are a professional email response assistant. Draft a response based on the \
     email content, classification, and available context.\n\n\
     GUIDELINES:\n\
     - Match the tone appropriately (formal for business, casual for internal)\n\
     - If meeting request, offer ONLY the listed time slots. Never invent availability\n\
     - If a meeting is requested and no slots are listed, ask the sender to propose times\n\
     - Be concise but complete\n\
     - Include proper salutation and closing\n\
     - For high urgency items, acknowledge the urgency\n\n\
     Respond with ONLY a JSON object:\n\
     {\"subject\": \"...\", \"body\": \"...\", \"tone\": \"...\", \"includes_meeting_times\": false}"
        .to_string()
}

fn intent_guidance(intent: Intent) -> &'static str {
    match intent {
        Intent::MeetingRequest => "Write a scheduling reply.",
        Intent::SupportQuestion => "Acknowledge the issue and describe next steps.",
        Intent::InformationRequest => "Answer what you can and say what will follow.",
        Intent::UrgentBusiness => "Confirm receipt and give a concrete follow-up time.",
        Intent::FollowUp => "Give a short status update.",
        Intent::Spam | Intent::Newsletter => "Keep it to a single polite sentence.",
    }
}

fn build_draft_user_prompt(
    email: &EmailRecord,
    context: &SenderContext,
    classification: &Classification,
    availability: Availability<'_>,
) -> String {
    let mut prompt = String::with_capacity(2048);

    prompt.push_str("ORIGINAL EMAIL:\n");
    prompt.push_str(&format!("From: {}\n", email.sender));
    prompt.push_str(&format!("Subject: {}\n", email.subject));
    let body: String = email.body.chars().take(MAX_BODY_CHARS).collect();
    prompt.push_str(&format!("Content: {}\n\n", body));

    prompt.push_str("CLASSIFICATION:\n");
    prompt.push_str(&format!("Intent: {}\n", classification.intent));
    prompt.push_str(&format!("Urgency: {}\n\n", classification.urgency));

    prompt.push_str("SENDER CONTEXT:\n");
    if let Some(name) = &context.name {
        prompt.push_str(&format!("Name: {}\n", name));
    }
    prompt.push_str(&format!("Importance: {}\n", context.importance));
    prompt.push_str(&format!("Relationship: {}\n\n", context.relationship));

    prompt.push_str("AVAILABLE TIME SLOTS:\n");
    match availability {
        Availability::NotChecked => prompt.push_str("No calendar check needed\n"),
        Availability::Slots([]) => prompt.push_str(
            "No free slots found. Ask the sender to propose times that work for them.\n",
        ),
        Availability::Slots(slots) => {
            for slot in slots {
                prompt.push_str(&format!("- {}\n", slot.render()));
            }
        }
    }
    prompt.push('\n');

    prompt.push_str(intent_guidance(classification.intent));
    if classification.urgency == Urgency::High {
        prompt.push_str(" This is high urgency.");
    }
    prompt.push_str("\n\nDraft a professional response:");

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DraftResponse {
    #[serde(default)]
    subject: Option<String>,
    #[serde(alias = "content")]
    body: String,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    includes_meeting_times: Option<bool>,
}

fn parse_draft_response(raw: &str) -> Result<DraftResponse, String> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))
}
