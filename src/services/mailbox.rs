//! In-memory mailbox that records sent replies.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::pipeline::dispatch::Mailbox;
use crate::pipeline::types::{DeliveryReceipt, ReplyTarget, ResponseDraft};

/// One delivered reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SentReply {
    pub draft: ResponseDraft,
    pub target: ReplyTarget,
    pub receipt: DeliveryReceipt,
}

#[derive(Default)]
pub struct MemoryMailbox {
    sent: RwLock<Vec<SentReply>>,
    offline: AtomicBool,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every send fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentReply> {
        self.sent.read().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn send(
        &self,
        draft: &ResponseDraft,
        target: &ReplyTarget,
    ) -> Result<DeliveryReceipt, DispatchError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("mailbox offline".into()));
        }

        let receipt = DeliveryReceipt {
            message_id: format!("<{}@inbox-agent.local>", Uuid::new_v4()),
            sent_at: Utc::now(),
        };
        self.sent.write().await.push(SentReply {
            draft: draft.clone(),
            target: target.clone(),
            receipt: receipt.clone(),
        });
        tracing::debug!(to = %target.to, subject = %draft.subject, "Reply stored in memory mailbox");
        Ok(receipt)
    }
}
