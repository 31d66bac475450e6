//! SMTP mailbox via lettre.

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::DispatchError;
use crate::pipeline::dispatch::Mailbox;
use crate::pipeline::types::{DeliveryReceipt, ReplyTarget, ResponseDraft};

pub struct SmtpMailbox {
    config: SmtpConfig,
}

impl SmtpMailbox {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn message_domain(&self) -> &str {
        self.config
            .from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost")
    }
}

/// Wrap a bare id in angle brackets for Message-ID style headers.
fn angle_id(id: &str) -> String {
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}

/// Build the reply. Plain text; proposed times are already in the body.
pub fn build_reply(
    from: &str,
    draft: &ResponseDraft,
    target: &ReplyTarget,
    message_id: &str,
) -> Result<Message, DispatchError> {
    let reference = angle_id(target.thread_id.as_deref().unwrap_or(&target.in_reply_to));

    Message::builder()
        .from(from.parse().map_err(|e| DispatchError::InvalidAddress {
            address: from.to_string(),
            reason: format!("{e}"),
        })?)
        .to(target.to.parse().map_err(|e| DispatchError::InvalidAddress {
            address: target.to.clone(),
            reason: format!("{e}"),
        })?)
        .subject(draft.subject.clone())
        .message_id(Some(message_id.to_string()))
        .in_reply_to(angle_id(&target.in_reply_to))
        .references(reference)
        .header(ContentType::TEXT_PLAIN)
        .body(draft.body.clone())
        .map_err(|e| DispatchError::SendFailed {
            reason: format!("Failed to build email: {e}"),
        })
}

#[async_trait]
impl Mailbox for SmtpMailbox {
    async fn send(
        &self,
        draft: &ResponseDraft,
        target: &ReplyTarget,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.message_domain());
        let message = build_reply(&self.config.from_address, draft, target, &message_id)?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| DispatchError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DispatchError::Transport(format!("SMTP task failed: {e}")))?
            .map_err(|e| DispatchError::SendFailed {
                reason: format!("SMTP send failed: {e}"),
            })?;

        tracing::info!(to = %target.to, %message_id, "Email sent via SMTP");
        Ok(DeliveryReceipt {
            message_id,
            sent_at: Utc::now(),
        })
    }
}
