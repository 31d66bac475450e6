//! Dispatcher — sends an approved draft as a reply to the source email.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::error::DispatchError;
use crate::pipeline::types::{DeliveryReceipt, EmailRecord, ReplyTarget, ResponseDraft};

/// Outbound mail collaborator. Sends are assumed non-revocable.
#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn send(
        &self,
        draft: &ResponseDraft,
        target: &ReplyTarget,
    ) -> Result<DeliveryReceipt, DispatchError>;
}

pub struct Dispatcher {
    mailbox: Arc<dyn Mailbox>,
}

impl Dispatcher {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Reply to `email` with `draft`. Exactly one send attempt.
    pub async fn dispatch(
        &self,
        draft: &ResponseDraft,
        email: &EmailRecord,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let target = ReplyTarget::for_email(email);
        validate_address(&target.to)?;

        match self.mailbox.send(draft, &target).await {
            Ok(receipt) => {
                info!(
                    email_id = %email.id,
                    to = %target.to,
                    message_id = %receipt.message_id,
                    "Reply sent"
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(email_id = %email.id, to = %target.to, error = %e, "Reply dispatch failed");
                Err(e)
            }
        }
    }
}

/// Minimal `local@domain` shape check before handing off to the transport.
pub fn validate_address(address: &str) -> Result<(), DispatchError> {
    let invalid = |reason: &str| DispatchError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (local, domain) = address.split_once('@').ok_or_else(|| invalid("missing '@'"))?;
    if local.is_empty() {
        return Err(invalid("empty local part"));
    }
    if domain.is_empty() || domain.contains('@') {
        return Err(invalid("malformed domain"));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    Ok(())
}
