//! Configuration types.
//!
//! Everything is constructed explicitly and handed to the engine. The
//! `from_env()` constructors read `INBOX_AGENT_*` variables over the defaults.

use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::classifier::ResponsePolicy;
use crate::pipeline::types::Intent;

/// Workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Model used for classification and drafting.
    pub model_name: String,
    pub temperature: f32,
    /// Retries for transient LLM failures, applied by the provider wrapper.
    pub max_retries: u32,
    pub max_tokens: u32,
    /// Days searched for meeting slots, starting tomorrow.
    pub days_ahead: u32,
    pub min_slot_minutes: u32,
    /// Most slots offered in one draft.
    pub max_slots: usize,
    pub workday_start_hour: u32,
    pub workday_end_hour: u32,
    /// A paused run with no decision after this long is rejected.
    pub approval_timeout: Duration,
    pub response_policy: ResponsePolicy,
    /// Run the sender rules before calling the model.
    pub use_rules: bool,
    /// Sender patterns that always go to the model, even when a rule matches.
    pub always_classify: Vec<Regex>,
    /// Concurrent runs in `process_batch`.
    pub max_concurrent_runs: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4-turbo-preview".to_string(),
            temperature: 0.0,
            max_retries: 2,
            max_tokens: 1024,
            days_ahead: 7,
            min_slot_minutes: 60,
            max_slots: 5,
            workday_start_hour: 9,
            workday_end_hour: 17,
            approval_timeout: Duration::from_secs(48 * 3600), // 48 hours
            response_policy: ResponsePolicy::default(),
            use_rules: true,
            always_classify: Vec::new(),
            max_concurrent_runs: 4,
        }
    }
}

impl WorkflowConfig {
    /// Defaults overridden by `INBOX_AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(model) = lookup("INBOX_AGENT_MODEL").filter(|s| !s.trim().is_empty()) {
            config.model_name = model.trim().to_string();
        }
        parse_into(&lookup, "INBOX_AGENT_TEMPERATURE", &mut config.temperature)?;
        parse_into(&lookup, "INBOX_AGENT_MAX_RETRIES", &mut config.max_retries)?;
        parse_into(&lookup, "INBOX_AGENT_MAX_TOKENS", &mut config.max_tokens)?;
        parse_into(&lookup, "INBOX_AGENT_DAYS_AHEAD", &mut config.days_ahead)?;
        parse_into(&lookup, "INBOX_AGENT_MIN_SLOT_MINUTES", &mut config.min_slot_minutes)?;
        parse_into(&lookup, "INBOX_AGENT_MAX_SLOTS", &mut config.max_slots)?;
        parse_into(&lookup, "INBOX_AGENT_WORKDAY_START", &mut config.workday_start_hour)?;
        parse_into(&lookup, "INBOX_AGENT_WORKDAY_END", &mut config.workday_end_hour)?;
        parse_into(&lookup, "INBOX_AGENT_USE_RULES", &mut config.use_rules)?;
        parse_into(&lookup, "INBOX_AGENT_MAX_CONCURRENT_RUNS", &mut config.max_concurrent_runs)?;

        let mut timeout_hours: u64 = config.approval_timeout.as_secs() / 3600;
        parse_into(&lookup, "INBOX_AGENT_APPROVAL_TIMEOUT_HOURS", &mut timeout_hours)?;
        let timeout_secs = timeout_hours
            .checked_mul(3600)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "INBOX_AGENT_APPROVAL_TIMEOUT_HOURS".into(),
                message: format!("{timeout_hours} hours is out of range"),
            })?;
        config.approval_timeout = Duration::from_secs(timeout_secs);

        if let Some(raw) = lookup("INBOX_AGENT_RESPOND_TO") {
            config.response_policy = parse_policy(&raw)?;
        }
        if let Some(raw) = lookup("INBOX_AGENT_ALWAYS_CLASSIFY") {
            config.always_classify = parse_patterns("INBOX_AGENT_ALWAYS_CLASSIFY", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("INBOX_AGENT_TEMPERATURE", "must be between 0 and 2"));
        }
        if self.workday_end_hour > 24 || self.workday_start_hour >= self.workday_end_hour {
            return Err(invalid(
                "INBOX_AGENT_WORKDAY_END",
                "working hours must satisfy start < end <= 24",
            ));
        }
        if self.max_slots == 0 {
            return Err(invalid("INBOX_AGENT_MAX_SLOTS", "must be at least 1"));
        }
        if self.min_slot_minutes == 0 {
            return Err(invalid("INBOX_AGENT_MIN_SLOT_MINUTES", "must be at least 1"));
        }
        if self.approval_timeout.is_zero() {
            return Err(invalid(
                "INBOX_AGENT_APPROVAL_TIMEOUT_HOURS",
                "must be at least 1 hour",
            ));
        }
        if self.max_concurrent_runs == 0 {
            return Err(invalid("INBOX_AGENT_MAX_CONCURRENT_RUNS", "must be at least 1"));
        }
        Ok(())
    }

    /// LLM provider settings for this workflow's model.
    ///
    /// `INBOX_AGENT_LLM_BACKEND` picks the backend (default `openai`, which
    /// requires `OPENAI_API_KEY`); `INBOX_AGENT_LLM_BASE_URL` overrides the endpoint.
    pub fn llm_config_from_env(&self) -> Result<LlmConfig, ConfigError> {
        let backend: LlmBackend = match std::env::var("INBOX_AGENT_LLM_BACKEND") {
            Ok(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "INBOX_AGENT_LLM_BACKEND".into(),
                message,
            })?,
            Err(_) => LlmBackend::OpenAi,
        };

        let api_key = match (backend, std::env::var("OPENAI_API_KEY")) {
            (_, Ok(key)) if !key.is_empty() => key,
            (LlmBackend::OpenAi, _) => {
                return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".into()));
            }
            (LlmBackend::Ollama, _) => "ollama".to_string(),
        };

        Ok(LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: self.model_name.clone(),
            base_url: std::env::var("INBOX_AGENT_LLM_BASE_URL").ok(),
            max_retries: self.max_retries,
        })
    }
}

fn parse_into<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            })?;
    }
    Ok(())
}

/// `newsletter=true,follow_up=false` → per-intent overrides.
fn parse_policy(raw: &str) -> Result<ResponsePolicy, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "INBOX_AGENT_RESPOND_TO".into(),
        message,
    };

    let mut policy = ResponsePolicy::default();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (intent, respond) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected intent=bool, got '{entry}'")))?;
        let intent: Intent = intent.parse().map_err(invalid)?;
        let respond: bool = respond
            .trim()
            .parse()
            .map_err(|e| invalid(format!("'{entry}': {e}")))?;
        policy = policy.with_override(intent, respond);
    }
    Ok(policy)
}

/// Comma-separated regexes.
fn parse_patterns(key: &str, raw: &str) -> Result<Vec<Regex>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{pattern}': {e}"),
            })
        })
        .collect()
}

/// SMTP settings for the outbound mailbox.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `INBOX_AGENT_SMTP_HOST` is not set (replies stay in memory).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("INBOX_AGENT_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("INBOX_AGENT_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("INBOX_AGENT_SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("INBOX_AGENT_SMTP_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("INBOX_AGENT_SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}
