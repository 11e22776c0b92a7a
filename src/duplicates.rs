//! Duplicate detection by `Message-ID`

use std::sync::Arc;
use tracing::debug;

use crate::client::MailboxClient;
use crate::error::Result;
use crate::models::{DuplicateKey, ParsedMessage};
use crate::retry::RetryPolicy;

/// The message's `Message-ID`, trimmed; `None` when absent or blank
pub fn duplicate_key(message: &ParsedMessage) -> Option<DuplicateKey> {
    message.header("Message-ID").and_then(DuplicateKey::new)
}

/// Asks the mailbox whether a Message-ID is already present
///
/// Backed by Gmail search, so a message inserted moments ago may not be
/// found yet.
pub struct DuplicateIndex {
    client: Arc<dyn MailboxClient>,
    retry: RetryPolicy,
}

impl DuplicateIndex {
    pub fn new(client: Arc<dyn MailboxClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// True when at least one existing message carries `key`
    pub async fn lookup(&self, key: &DuplicateKey) -> Result<bool> {
        let query = key.search_query();
        let hits = self
            .retry
            .run("duplicate lookup", || self.client.search_message_ids(&query, 1))
            .await?;

        debug!("Duplicate lookup for {}: {} hit(s)", key, hits.len());
        Ok(!hits.is_empty())
    }
}
