//! Shared types for the email workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Email record ────────────────────────────────────────────────────

/// One inbound email. Never mutated after it enters a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Unique ID (mailbox-native or generated UUID).
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Sender job title, when the mailbox knows it.
    pub sender_title: Option<String>,
    /// Sender company, when the mailbox knows it.
    pub sender_company: Option<String>,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    pub received_at: DateTime<Utc>,
    /// Mailbox thread identifier, used for threading the reply.
    pub thread_id: Option<String>,
}

impl EmailRecord {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            sender_title: None,
            sender_company: None,
            subject: subject.into(),
            body: body.into(),
            received_at,
            thread_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender_title(mut self, title: impl Into<String>) -> Self {
        self.sender_title = Some(title.into());
        self
    }

    pub fn with_sender_company(mut self, company: impl Into<String>) -> Self {
        self.sender_company = Some(company.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

// ── Sender context ──────────────────────────────────────────────────

/// How much weight the user gives a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Annotations about the sender gathered during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderContext {
    pub name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub importance: Importance,
    /// Free-form relationship label ("customer", "key_stakeholder", ...).
    pub relationship: String,
}

impl Default for SenderContext {
    fn default() -> Self {
        Self {
            name: None,
            title: None,
            company: None,
            importance: Importance::Medium,
            relationship: "unknown".to_string(),
        }
    }
}

impl SenderContext {
    /// Fill missing title/company from the email record itself.
    pub fn fill_from_email(mut self, email: &EmailRecord) -> Self {
        if self.title.is_none() {
            self.title = email.sender_title.clone();
        }
        if self.company.is_none() {
            self.company = email.sender_company.clone();
        }
        self
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Classified purpose of an email.
///
/// Deserialization goes through [`FromStr`](std::str::FromStr), so the short
/// names in [`Intent::aliases`] are accepted everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Intent {
    MeetingRequest,
    SupportQuestion,
    InformationRequest,
    UrgentBusiness,
    FollowUp,
    Spam,
    Newsletter,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Self::MeetingRequest,
        Self::SupportQuestion,
        Self::InformationRequest,
        Self::UrgentBusiness,
        Self::FollowUp,
        Self::Spam,
        Self::Newsletter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeetingRequest => "meeting_request",
            Self::SupportQuestion => "support_question",
            Self::InformationRequest => "information_request",
            Self::UrgentBusiness => "urgent_business",
            Self::FollowUp => "follow_up",
            Self::Spam => "spam",
            Self::Newsletter => "newsletter",
        }
    }

    /// Short names models commonly answer with.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::MeetingRequest => &["meeting"],
            Self::SupportQuestion => &["support"],
            Self::InformationRequest => &["information", "info_request"],
            Self::UrgentBusiness => &["urgent"],
            Self::FollowUp => &["followup"],
            Self::Spam | Self::Newsletter => &[],
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == normalized || i.aliases().contains(&normalized.as_str()))
            .ok_or_else(|| format!("Unknown intent: {s}"))
    }
}

impl TryFrom<String> for Intent {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Classified priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    pub const ALL: [Urgency; 3] = [Self::High, Self::Medium, Self::Low];
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Classifier verdict. Produced once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub urgency: Urgency,
    pub requires_response: bool,
    pub reasoning: String,
}

impl Classification {
    /// Meeting requests that need an answer go through the calendar stage.
    pub fn needs_calendar(&self) -> bool {
        self.requires_response && self.intent == Intent::MeetingRequest
    }
}

// ── Calendar slots ──────────────────────────────────────────────────

/// A free time window on the user's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CalendarSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &CalendarSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Human-readable form used in drafting prompts,
    /// e.g. `Tuesday, March 04 at 09:00 AM - 10:00 AM`.
    pub fn render(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%A, %B %d at %I:%M %p"),
            self.end.format("%I:%M %p")
        )
    }
}

// ── Response draft ──────────────────────────────────────────────────

/// A reply awaiting human approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDraft {
    pub subject: String,
    pub body: String,
    /// Short tone descriptor ("professional", "warm but brief").
    pub tone: String,
    pub includes_meeting_times: bool,
    /// Slots offered to the sender, in chronological order.
    #[serde(default)]
    pub proposed_times: Vec<CalendarSlot>,
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Where and how a reply is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub to: String,
    /// Source email ID, used as the In-Reply-To reference.
    pub in_reply_to: String,
    pub thread_id: Option<String>,
}

impl ReplyTarget {
    pub fn for_email(email: &EmailRecord) -> Self {
        Self {
            to: email.sender.clone(),
            in_reply_to: email.id.clone(),
            thread_id: email.thread_id.clone(),
        }
    }
}

/// Acknowledgement returned by the mailbox after a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}
