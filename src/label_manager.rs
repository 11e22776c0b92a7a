//! Resolves label names to Gmail label IDs, creating labels on first use
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::MailboxClient;
use crate::error::{ImportError, Result};
use crate::retry::RetryPolicy;

/// Gmail's limit on label name length
const MAX_LABEL_LEN: usize = 225;

/// Run-scoped label name -> ID binding
pub struct LabelManager {
    client: Arc<dyn MailboxClient>,
    retry: RetryPolicy,
    label_cache: HashMap<String, String>,
}

impl LabelManager {
    pub fn new(client: Arc<dyn MailboxClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            label_cache: HashMap::new(),
        }
    }

    /// Label ID for `name`, looking it up or creating it the first time
    ///
    /// Only the first call per name touches the network. Existing labels are
    /// matched exactly first, then case-insensitively, since Gmail refuses to
    /// create a label that differs from an existing one only by case.
    pub async fn resolve(&mut self, name: &str) -> Result<String> {
        let name = validate_label_name(name)?;

        if let Some(id) = self.label_cache.get(name) {
            return Ok(id.clone());
        }

        let existing = self
            .retry
            .run("list labels", || self.client.list_labels())
            .await?;

        let found = existing
            .iter()
            .find(|label| label.name == name)
            .or_else(|| {
                existing
                    .iter()
                    .find(|label| label.name.to_lowercase() == name.to_lowercase())
            });

        let label_id = match found {
            Some(label) => {
                debug!("Using existing label '{}' ({})", label.name, label.id);
                label.id.clone()
            }
            None => {
                info!("Creating label: {}", name);
                let id = self
                    .retry
                    .run("create label", || self.client.create_label(name))
                    .await
                    .map_err(|e| match e {
                        e if e.is_transient() => e,
                        e => ImportError::LabelError(format!(
                            "Failed to create label '{}': {}",
                            name, e
                        )),
                    })?;
                info!("Created label '{}' with ID: {}", name, id);
                id
            }
        };

        self.label_cache.insert(name.to_string(), label_id.clone());
        Ok(label_id)
    }
}

/// Trimmed label name; rejects empty and over-long names
pub fn validate_label_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ImportError::ConfigError(
            "Label name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(ImportError::ConfigError(format!(
            "Label name exceeds {} characters",
            MAX_LABEL_LEN
        )));
    }
    if trimmed.starts_with('/') || trimmed.ends_with('/') || trimmed.contains("//") {
        return Err(ImportError::ConfigError(format!(
            "Label name '{}' has an empty path segment",
            trimmed
        )));
    }
    Ok(trimmed)
}
