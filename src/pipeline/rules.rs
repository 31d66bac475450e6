//! Pre-LLM rules engine for fast classification.
//!
//! Runs before the LLM classifier to short-circuit obvious bulk mail by
//! sender address only:
//! - noreply/no-reply senders → Newsletter
//! - Bulk mailboxes and marketing domains → Newsletter
//! - Mailer daemons → Spam
//!
//! Subject and body text never trigger a rule. A rule match is a real
//! classification with its reason recorded; it is never a stand-in for a
//! failed LLM call.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{EmailRecord, Intent};

/// A single sender rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    /// Human-readable pattern description.
    pub pattern: String,
    pub regex: Regex,
    /// Intent assigned on match.
    pub intent: Intent,
    /// Why this rule triggers.
    pub reason: String,
}

/// Outcome of a rule match.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub intent: Intent,
    pub reason: String,
}

/// Pre-LLM rules engine.
pub struct RulesEngine {
    rules: Vec<ClassificationRule>,
    /// Senders/domains that always go to the LLM classifier.
    always_classify_patterns: Vec<Regex>,
}

impl RulesEngine {
    /// Create a rules engine with default bulk-sender patterns.
    pub fn default_rules() -> Self {
        let rules = vec![
            ClassificationRule {
                pattern: "noreply@*".into(),
                regex: Regex::new(r"(?i)^no[\-_.]?reply@").unwrap(),
                intent: Intent::Newsletter,
                reason: "noreply sender".into(),
            },
            ClassificationRule {
                pattern: "newsletter@*".into(),
                regex: Regex::new(r"(?i)^(newsletter|news|deals|offers|promo|marketing)@").unwrap(),
                intent: Intent::Newsletter,
                reason: "bulk sender mailbox".into(),
            },
            ClassificationRule {
                pattern: "*@marketing.*".into(),
                regex: Regex::new(r"(?i)@(marketing|newsletter|promo|campaign)\.").unwrap(),
                intent: Intent::Newsletter,
                reason: "marketing/newsletter domain".into(),
            },
            ClassificationRule {
                pattern: "mailer-daemon".into(),
                regex: Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
                intent: Intent::Spam,
                reason: "automated mail system".into(),
            },
        ];

        Self {
            rules,
            always_classify_patterns: Vec::new(),
        }
    }

    /// Sender/domain patterns that bypass the rules.
    pub fn with_always_classify(mut self, patterns: impl IntoIterator<Item = Regex>) -> Self {
        self.always_classify_patterns.extend(patterns);
        self
    }

    /// Evaluate an email's sender against all rules; first match wins.
    pub fn evaluate(&self, email: &EmailRecord) -> Option<RuleMatch> {
        if self
            .always_classify_patterns
            .iter()
            .any(|r| r.is_match(&email.sender))
        {
            debug!(
                sender = %email.sender,
                "Sender matches always-classify pattern, bypassing rules"
            );
            return None;
        }

        let rule = self.rules.iter().find(|r| r.regex.is_match(&email.sender))?;
        debug!(
            sender = %email.sender,
            rule = %rule.pattern,
            intent = %rule.intent,
            "Email matched classification rule"
        );
        Some(RuleMatch {
            intent: rule.intent,
            reason: rule.reason.clone(),
        })
    }
}
