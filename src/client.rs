//! Gmail API client: the logical mailbox operations the import pipeline needs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Label, Message};
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::config::Config;
use crate::error::{ImportError, Result};
use crate::models::DateSource;
use crate::rate_limiter::{QuotaCost, QuotaRateLimiter, QuotaStats};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One `messages.import` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub raw: Vec<u8>,
    pub label_ids: Vec<String>,
    pub internal_date: DateTime<Utc>,
    pub date_source: DateSource,
    pub never_mark_spam: bool,
    pub process_for_calendar: bool,
}

impl ImportRequest {
    /// Value for the `internalDateSource` query parameter
    pub fn internal_date_source(&self) -> &'static str {
        match self.date_source {
            DateSource::Header => "dateHeader",
            DateSource::FileModified => "receivedTime",
        }
    }
}

/// Mailbox operations used by the pipeline; one call, no retries
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Message IDs matching a Gmail search query, at most `max_results`
    async fn search_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its ID
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Insert raw RFC 5322 bytes, returning the new message ID
    async fn import_message(&self, request: ImportRequest) -> Result<String>;
}

/// Production Gmail client with quota throttling and per-request timeouts
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: QuotaRateLimiter,
    timeout: Duration,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub, rate_limiter: QuotaRateLimiter, timeout: Duration) -> Self {
        Self {
            hub,
            rate_limiter,
            timeout,
        }
    }

    pub fn from_config(hub: GmailHub, config: &Config) -> Self {
        Self::new(
            hub,
            QuotaRateLimiter::from_config(&config.rate_limit),
            Duration::from_secs(config.import.request_timeout_secs),
        )
    }

    pub async fn quota_stats(&self) -> QuotaStats {
        self.rate_limiter.stats().await
    }

    /// Reserve quota, then run the call under the request timeout
    async fn call<T, Fut>(&self, operation: &str, cost: QuotaCost, api_call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        let _permit = self.rate_limiter.acquire(cost).await;
        debug!("Calling Gmail API: {}", operation);

        match tokio::time::timeout(self.timeout, api_call).await {
            Ok(result) => result.map_err(ImportError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation, self.timeout);
                Err(ImportError::NetworkError(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn search_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let (_, response) = self
            .call(
                "messages.list",
                QuotaCost::Search,
                self.hub
                    .users()
                    .messages_list("me")
                    .q(query)
                    .max_results(max_results)
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
            .await?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let (_, response) = self
            .call(
                "labels.list",
                QuotaCost::ListLabels,
                self.hub
                    .users()
                    .labels_list("me")
                    .add_scope(LABELS_SCOPE)
                    .doit(),
            )
            .await?;

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .call(
                "labels.create",
                QuotaCost::CreateLabel,
                self.hub
                    .users()
                    .labels_create(label, "me")
                    .add_scope(LABELS_SCOPE)
                    .doit(),
            )
            .await?;

        created
            .id
            .ok_or_else(|| ImportError::LabelError("Created label has no ID".to_string()))
    }

    async fn import_message(&self, request: ImportRequest) -> Result<String> {
        let date_source = request.internal_date_source();
        let metadata = Message {
            label_ids: Some(request.label_ids),
            internal_date: Some(request.internal_date.timestamp_millis()),
            ..Default::default()
        };
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| ImportError::ApiError(format!("Invalid upload MIME type: {}", e)))?;

        let (_, imported) = self
            .call(
                "messages.import",
                QuotaCost::Import,
                self.hub
                    .users()
                    .messages_import(metadata, "me")
                    .internal_date_source(date_source)
                    .never_mark_spam(request.never_mark_spam)
                    .process_for_calendar(request.process_for_calendar)
                    .add_scope(MODIFY_SCOPE)
                    .upload(Cursor::new(request.raw), mime_type),
            )
            .await?;

        imported
            .id
            .ok_or_else(|| ImportError::ApiError("Imported message has no ID".to_string()))
    }
}

#[cfg(test)]
mockall::mock! {
    pub Mailbox {}

    #[async_trait]
    impl MailboxClient for Mailbox {
        async fn search_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn import_message(&self, request: ImportRequest) -> Result<String>;
    }
}
