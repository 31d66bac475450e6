//! Sender enrichment — looks the sender up in a contact directory before
//! classification.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::DirectoryError;
use crate::pipeline::types::{EmailRecord, SenderContext};

/// Contact/CRM lookup collaborator.
#[async_trait]
pub trait SenderDirectory: Send + Sync {
    /// Look up a sender by address. `Ok(None)` means "not in the directory".
    async fn lookup(&self, address: &str) -> Result<Option<SenderContext>, DirectoryError>;
}

/// Build the sender context for an email.
///
/// Unknown senders and directory outages both yield the default context
/// (medium importance, unknown relationship); title and company from the
/// email record fill any gaps.
pub async fn enrich_sender(directory: &dyn SenderDirectory, email: &EmailRecord) -> SenderContext {
    let context = match directory.lookup(&email.sender).await {
        Ok(Some(ctx)) => {
            debug!(
                sender = %email.sender,
                importance = %ctx.importance,
                relationship = %ctx.relationship,
                "Sender found in directory"
            );
            ctx
        }
        Ok(None) => SenderContext {
            name: Some(email.sender.clone()),
            ..SenderContext::default()
        },
        Err(e) => {
            warn!(sender = %email.sender, error = %e, "Sender lookup failed, using default context");
            SenderContext::default()
        }
    };

    context.fill_from_email(email)
}
