//! Classifier — decides intent, urgency and whether an email needs a reply.
//!
//! Flow:
//! 1. Rules engine (fast, no LLM) → may short-circuit bulk senders,
//!    skipped for high-importance senders
//! 2. LLM classification → structured JSON verdict
//! 3. Response policy → deterministic "requires response" from intent + urgency
//!
//! A failed or unparseable LLM call is an error. No default classification
//! is ever invented in its place.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ClassificationError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json_object};
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{
    Classification, EmailRecord, Importance, Intent, SenderContext, Urgency,
};

/// Body characters sent to the model.
const MAX_BODY_CHARS: usize = 2000;

// ── Response policy ─────────────────────────────────────────────────

/// Decides "requires response" from intent and urgency.
///
/// Defaults: spam and newsletters never need a reply, low-urgency
/// follow-ups don't either, everything else does. Per-intent overrides win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePolicy {
    #[serde(default)]
    pub overrides: HashMap<Intent, bool>,
}

impl ResponsePolicy {
    pub fn with_override(mut self, intent: Intent, respond: bool) -> Self {
        self.overrides.insert(intent, respond);
        self
    }

    pub fn requires_response(&self, intent: Intent, urgency: Urgency) -> bool {
        if let Some(respond) = self.overrides.get(&intent) {
            return *respond;
        }
        match intent {
            Intent::Spam | Intent::Newsletter => false,
            Intent::FollowUp => urgency != Urgency::Low,
            Intent::MeetingRequest
            | Intent::SupportQuestion
            | Intent::InformationRequest
            | Intent::UrgentBusiness => true,
        }
    }
}

// ── Classifier ──────────────────────────────────────────────────────

pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    rules: Option<RulesEngine>,
    policy: ResponsePolicy,
    temperature: f32,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>, policy: ResponsePolicy) -> Self {
        Self {
            llm,
            rules: None,
            policy,
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    pub fn with_rules(mut self, rules: RulesEngine) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Classify an email using its sender context.
    pub async fn classify(
        &self,
        email: &EmailRecord,
        context: &SenderContext,
    ) -> Result<Classification, ClassificationError> {
        // High-importance senders always get the model's judgment.
        let rule_hit = match &self.rules {
            Some(rules) if context.importance != Importance::High => rules.evaluate(email),
            _ => None,
        };
        if let Some(hit) = rule_hit {
            let urgency = Urgency::Low;
            return Ok(Classification {
                intent: hit.intent,
                urgency,
                requires_response: self.policy.requires_response(hit.intent, urgency),
                reasoning: format!("Matched rule: {}", hit.reason),
            });
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classification_system_prompt()),
            ChatMessage::user(build_classification_user_prompt(email, context)),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_metadata("purpose", "classify");

        let response = self.llm.complete(request).await?;

        let parsed = parse_classification_response(&response.content).map_err(|reason| {
            warn!(
                email_id = %email.id,
                raw_response = %response.content,
                error = %reason,
                "Failed to parse classification response"
            );
            ClassificationError::Unparseable {
                reason,
                raw: response.content.clone(),
            }
        })?;

        let requires_response = self.policy.requires_response(parsed.intent, parsed.urgency);
        if let Some(model_says) = parsed.model_requires_response
            && model_says != requires_response
        {
            debug!(
                email_id = %email.id,
                intent = %parsed.intent,
                model_says,
                policy_says = requires_response,
                "Response policy overrides model judgment"
            );
        }

        info!(
            email_id = %email.id,
            intent = %parsed.intent,
            urgency = %parsed.urgency,
            requires_response,
            "Email classified"
        );

        Ok(Classification {
            intent: parsed.intent,
            urgency: parsed.urgency,
            requires_response,
            reasoning: parsed.reasoning,
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classification_system_prompt() -> String {
    "You are an expert email classifier. Analyze the email content, sender information, \
     and context to determine:\n\
     1. The primary intent of the email\n\
     2. The urgency level\n\
     3. Whether it requires a response\n\n\
     Consider sender importance and relationship when determining urgency.\n\n\
     Intents: meeting_request, support_question, information_request, urgent_business, \
     follow_up, spam, newsletter.\n\
     Urgency: high, medium, low.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"intent\": \"...\", \"urgency\": \"...\", \"requires_response\": true, \"reasoning\": \"...\"}\n\n\
     Keep the reasoning to one or two sentences."
        .to_string()
}

fn build_classification_user_prompt(email: &EmailRecord, context: &SenderContext) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str("EMAIL DETAILS:\n");
    prompt.push_str(&format!(
        "From: {} ({} at {})\n",
        email.sender,
        context.title.as_deref().unwrap_or("Unknown"),
        context.company.as_deref().unwrap_or("Unknown"),
    ));
    prompt.push_str(&format!("Subject: {}\n", email.subject));

    let body: String = email.body.chars().take(MAX_BODY_CHARS).collect();
    prompt.push_str(&format!("Content: {}\n\n", body));

    prompt.push_str("SENDER CONTEXT:\n");
    prompt.push_str(&format!("Importance: {}\n", context.importance));
    prompt.push_str(&format!("Relationship: {}\n\n", context.relationship));
    prompt.push_str("Classify this email:");

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    intent: String,
    urgency: String,
    #[serde(default)]
    requires_response: Option<bool>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug)]
struct ParsedClassification {
    intent: Intent,
    urgency: Urgency,
    model_requires_response: Option<bool>,
    reasoning: String,
}

fn parse_urgency(raw: &str) -> Result<Urgency, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "high" | "urgent" => Ok(Urgency::High),
        "medium" | "normal" => Ok(Urgency::Medium),
        "low" => Ok(Urgency::Low),
        other => Err(format!("unknown urgency: '{other}'")),
    }
}

fn parse_classification_response(raw: &str) -> Result<ParsedClassification, String> {
    let json_str = extract_json_object(raw);
    let response: ClassificationResponse =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let intent: Intent = response.intent.parse()?;
    let urgency = parse_urgency(&response.urgency)?;

    Ok(ParsedClassification {
        intent,
        urgency,
        model_requires_response: response.requires_response,
        reasoning: response.reasoning,
    })
}
