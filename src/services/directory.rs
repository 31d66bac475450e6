//! In-memory sender directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DirectoryError;
use crate::pipeline::enrich::SenderDirectory;
use crate::pipeline::types::{Importance, SenderContext};

/// Contact lookup backed by a map of lowercase addresses.
#[derive(Default)]
pub struct StaticDirectory {
    contacts: RwLock<HashMap<String, SenderContext>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with the demo contacts.
    pub fn demo() -> Self {
        let contacts = HashMap::from([
            (
                "ceo@company.com".to_string(),
                SenderContext {
                    name: Some("CEO".into()),
                    title: Some("Chief Executive Officer".into()),
                    company: Some("Important Corp".into()),
                    importance: Importance::High,
                    relationship: "key_stakeholder".into(),
                },
            ),
            (
                "support@customer.com".to_string(),
                SenderContext {
                    name: Some("Support Team".into()),
                    title: Some("Customer Support".into()),
                    company: Some("Customer Corp".into()),
                    importance: Importance::Medium,
                    relationship: "customer".into(),
                },
            ),
        ]);
        Self {
            contacts: RwLock::new(contacts),
        }
    }

    pub async fn insert(&self, address: &str, context: SenderContext) {
        self.contacts
            .write()
            .await
            .insert(address.trim().to_ascii_lowercase(), context);
    }
}

#[async_trait]
impl SenderDirectory for StaticDirectory {
    async fn lookup(&self, address: &str) -> Result<Option<SenderContext>, DirectoryError> {
        let key = address.trim().to_ascii_lowercase();
        Ok(self.contacts.read().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let directory = StaticDirectory::demo();
        let ctx = directory.lookup("CEO@Company.com").await.unwrap().unwrap();
        assert_eq!(ctx.importance, Importance::High);
    }

    #[tokio::test]
    async fn insert_then_lookup() {
        let directory = StaticDirectory::new();
        assert!(directory.lookup("vp@x.com").await.unwrap().is_none());
        directory
            .insert(
                "vp@x.com",
                SenderContext {
                    relationship: "internal".into(),
                    ..SenderContext::default()
                },
            )
            .await;
        let ctx = directory.lookup("vp@x.com").await.unwrap().unwrap();
        assert_eq!(ctx.relationship, "internal");
    }
}
