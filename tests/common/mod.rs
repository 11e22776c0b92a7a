//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_eml_import::client::{ImportRequest, LabelInfo, MailboxClient};
use gmail_eml_import::config::{Config, RunConfiguration};
use gmail_eml_import::error::{ImportError, Result};
use gmail_eml_import::loader::parse_message;
use gmail_eml_import::duplicates::duplicate_key;
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// Mock implementation of MailboxClient for testing
mock! {
    pub MailboxClient {}

    #[async_trait]
    impl MailboxClient for MailboxClient {
        async fn search_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn import_message(&self, request: ImportRequest) -> Result<String>;
    }
}

#[derive(Default)]
struct FakeState {
    labels: Vec<LabelInfo>,
    imported: Vec<ImportRequest>,
    create_label_calls: usize,
    search_calls: usize,
    transient_import_failures: usize,
}

/// In-memory mailbox that indexes imported messages by Message-ID
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<FakeState>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(id: &str, name: &str) -> Self {
        let fake = Self::new();
        fake.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        fake
    }

    /// The next `n` import calls fail with a 503
    pub fn fail_next_imports(&self, n: usize) {
        self.state.lock().unwrap().transient_import_failures = n;
    }

    pub fn imported(&self) -> Vec<ImportRequest> {
        self.state.lock().unwrap().imported.clone()
    }

    pub fn create_label_calls(&self) -> usize {
        self.state.lock().unwrap().create_label_calls
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().unwrap().search_calls
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn search_message_ids(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.search_calls += 1;

        let hits = state
            .imported
            .iter()
            .enumerate()
            .filter(|(_, request)| {
                parse_message(PathBuf::from("stored.eml"), request.raw.clone(), None)
                    .ok()
                    .and_then(|m| duplicate_key(&m))
                    .map_or(false, |key| key.search_query() == query)
            })
            .map(|(i, _)| format!("stored-{}", i))
            .take(max_results as usize)
            .collect();
        Ok(hits)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.create_label_calls += 1;
        if state.labels.iter().any(|l| l.name == name) {
            return Err(ImportError::ApiError(format!("Label name exists: {}", name)));
        }
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn import_message(&self, request: ImportRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.transient_import_failures > 0 {
            state.transient_import_failures -= 1;
            return Err(ImportError::ServerError {
                status: 503,
                message: "Backend Error".to_string(),
            });
        }
        state.imported.push(request);
        Ok(format!("msg-{}", state.imported.len()))
    }
}

/// Tuning with millisecond backoff so retry tests stay fast
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_secs = 1;
    config
}

pub fn run_config(root: &Path, label: &str) -> RunConfiguration {
    RunConfiguration {
        root_path: root.to_path_buf(),
        credentials_path: PathBuf::from("credentials.json"),
        label_name: label.to_string(),
        recursive: false,
        skip_duplicates: true,
    }
}

/// Build a minimal RFC 5322 message
pub fn eml(message_id: Option<&str>, date: Option<&str>, subject: &str) -> String {
    let mut raw = String::new();
    if let Some(id) = message_id {
        raw.push_str(&format!("Message-ID: {}\r\n", id));
    }
    if let Some(date) = date {
        raw.push_str(&format!("Date: {}\r\n", date));
    }
    raw.push_str("From: Alice <alice@example.com>\r\n");
    raw.push_str(&format!("Subject: {}\r\n", subject));
    raw.push_str("\r\n");
    raw.push_str("Hello from an old mailbox.\r\n");
    raw
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}
