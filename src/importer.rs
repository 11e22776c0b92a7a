//! Inserts messages into the mailbox with their original date and a label

use std::sync::Arc;
use tracing::debug;

use crate::client::{ImportRequest, MailboxClient};
use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::models::ParsedMessage;
use crate::retry::RetryPolicy;

pub struct MailboxImporter {
    client: Arc<dyn MailboxClient>,
    retry: RetryPolicy,
    options: ImportConfig,
}

impl MailboxImporter {
    pub fn new(client: Arc<dyn MailboxClient>, retry: RetryPolicy, options: ImportConfig) -> Self {
        Self {
            client,
            retry,
            options,
        }
    }

    fn request_for(&self, message: &ParsedMessage, label_id: &str) -> ImportRequest {
        ImportRequest {
            raw: message.raw_bytes.clone(),
            label_ids: vec![label_id.to_string()],
            internal_date: message.internal_date,
            date_source: message.date_source,
            never_mark_spam: self.options.never_mark_spam,
            process_for_calendar: self.options.process_for_calendar,
        }
    }

    /// Insert `message` with `label_id` attached, returning the new message ID
    ///
    /// Not idempotent: every successful call adds a message. A rejected
    /// payload (HTTP 400) becomes [`ImportError::InvalidMessage`] and is not
    /// retried.
    pub async fn insert(&self, message: &ParsedMessage, label_id: &str) -> Result<String> {
        let request = self.request_for(message, label_id);

        let id = self
            .retry
            .run("import message", || self.client.import_message(request.clone()))
            .await
            .map_err(|e| match e {
                ImportError::BadRequest(reason) => ImportError::InvalidMessage(reason),
                other => other,
            })?;

        debug!(
            "Imported {} as {} (internal date {})",
            message.path.display(),
            id,
            message.internal_date
        );
        Ok(id)
    }
}
