//! Drives one import run over a directory of `.eml` files
//!
//! Files are processed strictly one at a time in walker order. Each file
//! ends in exactly one of imported, skipped as duplicate, or failed; a
//! failure is recorded and the run moves on to the next file.
//!
//! Cancellation is observed between files, between the network stages of a
//! file, and inside retry backoff. A file interrupted mid-way is recorded as
//! failed and the run halts.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::MailboxClient;
use crate::config::{Config, ImportConfig, RunConfiguration};
use crate::duplicates::{duplicate_key, DuplicateIndex};
use crate::error::{ImportError, Result};
use crate::importer::MailboxImporter;
use crate::label_manager::{validate_label_name, LabelManager};
use crate::loader;
use crate::models::{FileOutcome, ImportStats, ProgressEvent};
use crate::retry::RetryPolicy;
use crate::walker;

/// Receives one event per processed file, in processing order
pub trait ProgressSink: Send + Sync {
    /// Called once before the first file
    fn started(&self, _total: usize) {}

    fn file_processed(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn file_processed(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards all events
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn file_processed(&self, _event: &ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Scanning,
    ProcessingFile,
    Importing,
    SkippingDuplicate,
    RecordingFailure,
    Completed,
}

/// Result of a run that got past setup
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: ImportStats,
    pub total: usize,
    /// Halted early by the cancellation token
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Mailbox-facing components for one run, sharing the run's retry policy
struct Pipeline {
    duplicates: DuplicateIndex,
    labels: LabelManager,
    importer: MailboxImporter,
}

impl Pipeline {
    fn new(client: Arc<dyn MailboxClient>, retry: RetryPolicy, import: ImportConfig) -> Self {
        Self {
            duplicates: DuplicateIndex::new(Arc::clone(&client), retry.clone()),
            labels: LabelManager::new(Arc::clone(&client), retry.clone()),
            importer: MailboxImporter::new(client, retry, import),
        }
    }
}

pub struct RunOrchestrator {
    config: RunConfiguration,
    client: Arc<dyn MailboxClient>,
    retry: RetryPolicy,
    import: ImportConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    state: RunState,
    stats: ImportStats,
}

impl RunOrchestrator {
    pub fn new(config: RunConfiguration, client: Arc<dyn MailboxClient>, tuning: &Config) -> Self {
        Self {
            config,
            client,
            retry: RetryPolicy::from_config(&tuning.retry),
            import: tuning.import.clone(),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
            state: RunState::Scanning,
            stats: ImportStats::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn transition(&mut self, next: RunState) {
        trace!("Run state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Process every candidate file and return the accumulated statistics
    ///
    /// Fails only on setup errors (missing root, invalid label name).
    pub async fn run(mut self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        validate_label_name(&self.config.label_name)?;

        let root = self.config.root_path.clone();
        let recursive = self.config.recursive;
        let files = walker::walk(&root, recursive)?;
        let total = walker::count(&root, recursive)?;

        info!(
            "Found {} .eml file(s) under {} (recursive: {}, duplicate check: {})",
            total,
            root.display(),
            recursive,
            self.config.skip_duplicates
        );
        if total == 0 {
            info!("No .eml files found under {}", root.display());
        }

        let retry = self.retry.clone().with_cancellation(self.cancel.clone());
        let mut pipeline = Pipeline::new(Arc::clone(&self.client), retry, self.import.clone());

        self.progress.started(total);
        self.transition(RunState::Scanning);

        let mut cancelled = false;
        for path in files {
            if self.cancel.is_cancelled() {
                warn!(
                    "Import cancelled after {} of {} file(s)",
                    self.stats.scanned, total
                );
                cancelled = true;
                break;
            }

            let outcome = self.process_file(&mut pipeline, &path).await;
            debug_assert!(self.stats.is_consistent());

            self.progress.file_processed(&ProgressEvent::from_stats(
                &self.stats,
                total,
                path,
                outcome,
            ));
            self.transition(RunState::Scanning);
        }

        // Token may have fired while the last file was in flight
        cancelled |= self.cancel.is_cancelled();

        self.transition(RunState::Completed);
        info!(
            "Import finished: {} scanned, {} imported, {} duplicate(s) skipped, {} failed",
            self.stats.scanned,
            self.stats.imported,
            self.stats.skipped_duplicate,
            self.stats.failed
        );

        Ok(RunOutcome {
            stats: self.stats,
            total,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn process_file(&mut self, pipeline: &mut Pipeline, path: &Path) -> FileOutcome {
        self.transition(RunState::ProcessingFile);
        debug!("Processing {}", path.display());

        let message = match loader::load_message(path).await {
            Ok(message) => message,
            Err(e) => return self.record_failure(path, e),
        };

        if self.config.skip_duplicates {
            if let Some(key) = duplicate_key(&message) {
                if let Err(e) = self.ensure_not_cancelled() {
                    return self.record_failure(path, e);
                }
                match pipeline.duplicates.lookup(&key).await {
                    Ok(true) => {
                        self.transition(RunState::SkippingDuplicate);
                        debug!("Skipping duplicate {} ({})", path.display(), key);
                        self.stats.record_duplicate();
                        return FileOutcome::SkippedDuplicate;
                    }
                    Ok(false) => {}
                    Err(e) => return self.record_failure(path, e),
                }
            }
        }

        self.transition(RunState::Importing);
        if let Err(e) = self.ensure_not_cancelled() {
            return self.record_failure(path, e);
        }
        let label_id = match pipeline.labels.resolve(&self.config.label_name).await {
            Ok(id) => id,
            Err(e) => return self.record_failure(path, e),
        };

        if let Err(e) = self.ensure_not_cancelled() {
            return self.record_failure(path, e);
        }
        match pipeline.importer.insert(&message, &label_id).await {
            Ok(_) => {
                self.stats.record_imported();
                FileOutcome::Imported
            }
            Err(e) => self.record_failure(path, e),
        }
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn record_failure(&mut self, path: &Path, error: ImportError) -> FileOutcome {
        self.transition(RunState::RecordingFailure);
        warn!("Failed to import {}: {}", path.display(), error);
        self.stats
            .record_failure(path.to_path_buf(), error.to_string());
        FileOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LabelInfo, MockMailbox};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.retry.max_attempts = 2;
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_secs = 1;
        config
    }

    fn run_config(root: &Path, skip_duplicates: bool) -> RunConfiguration {
        RunConfiguration {
            root_path: root.to_path_buf(),
            credentials_path: PathBuf::from("credentials.json"),
            label_name: "Imported".to_string(),
            recursive: false,
            skip_duplicates,
        }
    }

    fn write_eml(root: &Path, name: &str, message_id: &str) {
        std::fs::write(
            root.join(name),
            format!("Message-ID: {}\r\nSubject: test\r\n\r\nbody\r\n", message_id),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mock = MockMailbox::new();
        let orchestrator = RunOrchestrator::new(
            run_config(&dir.path().join("missing"), true),
            Arc::new(mock),
            &fast_config(),
        );

        assert!(matches!(
            orchestrator.run().await,
            Err(ImportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_label_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = run_config(dir.path(), true);
        config.label_name = " ".to_string();

        let orchestrator = RunOrchestrator::new(config, Arc::new(MockMailbox::new()), &fast_config());
        assert!(matches!(
            orchestrator.run().await,
            Err(ImportError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_directory_completes_with_zero_stats() {
        let dir = TempDir::new().unwrap();
        let orchestrator =
            RunOrchestrator::new(run_config(dir.path(), true), Arc::new(MockMailbox::new()), &fast_config());

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(outcome.stats, ImportStats::default());
        assert_eq!(outcome.total, 0);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_duplicate_is_skipped_and_new_is_imported() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<old@host>");
        write_eml(dir.path(), "2.eml", "<new@host>");

        let mut mock = MockMailbox::new();
        mock.expect_search_message_ids().returning(|query, _| {
            if query == "rfc822msgid:old@host" {
                Ok(vec!["existing".to_string()])
            } else {
                Ok(vec![])
            }
        });
        mock.expect_list_labels().times(1).returning(|| Ok(vec![]));
        mock.expect_create_label()
            .times(1)
            .returning(|_| Ok("Label_1".to_string()));
        mock.expect_import_message()
            .times(1)
            .returning(|_| Ok("m1".to_string()));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let orchestrator =
            RunOrchestrator::new(run_config(dir.path(), true), Arc::new(mock), &fast_config())
                .with_progress(Arc::new(move |e: &ProgressEvent| {
                    sink_events.lock().unwrap().push(e.clone())
                }));

        let outcome = orchestrator.run().await.unwrap();
        assert_eq!(outcome.stats.scanned, 2);
        assert_eq!(outcome.stats.skipped_duplicate, 1);
        assert_eq!(outcome.stats.imported, 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, FileOutcome::SkippedDuplicate);
        assert_eq!(events[1].outcome, FileOutcome::Imported);
        assert_eq!(events[1].total, 2);
        assert_eq!(events[1].scanned, 2);
    }

    #[tokio::test]
    async fn test_duplicate_check_disabled_never_searches() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<old@host>");

        let mut mock = MockMailbox::new();
        mock.expect_search_message_ids().never();
        mock.expect_list_labels()
            .returning(|| Ok(vec![LabelInfo { id: "L".to_string(), name: "Imported".to_string() }]));
        mock.expect_import_message()
            .times(1)
            .returning(|_| Ok("m1".to_string()));

        let outcome = RunOrchestrator::new(run_config(dir.path(), false), Arc::new(mock), &fast_config())
            .run()
            .await
            .unwrap();
        assert_eq!(outcome.stats.imported, 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_recorded_per_file() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<a@host>");

        let mut mock = MockMailbox::new();
        mock.expect_search_message_ids()
            .times(2)
            .returning(|_, _| Err(ImportError::NetworkError("down".to_string())));
        mock.expect_import_message().never();

        let outcome = RunOrchestrator::new(run_config(dir.path(), true), Arc::new(mock), &fast_config())
            .run()
            .await
            .unwrap();
        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.stats.failures[0].error.contains("Network error"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_processes_nothing() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<a@host>");

        let token = CancellationToken::new();
        token.cancel();

        let outcome = RunOrchestrator::new(run_config(dir.path(), true), Arc::new(MockMailbox::new()), &fast_config())
            .with_cancellation(token)
            .run()
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.stats.scanned, 0);
        assert_eq!(outcome.total, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_server_error_storm_stops_after_one_call() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<a@host>");
        write_eml(dir.path(), "2.eml", "<b@host>");

        let mut config = fast_config();
        config.retry.max_attempts = 5;
        config.retry.initial_backoff_ms = 10_000;
        config.retry.max_backoff_secs = 30;

        let token = CancellationToken::new();
        let op_token = token.clone();
        let mut mock = MockMailbox::new();
        mock.expect_search_message_ids()
            .times(1)
            .returning(move |_, _| {
                op_token.cancel();
                Err(ImportError::ServerError {
                    status: 503,
                    message: "Service unavailable".to_string(),
                })
            });
        mock.expect_list_labels().never();
        mock.expect_import_message().never();

        let start = Instant::now();
        let outcome = RunOrchestrator::new(run_config(dir.path(), true), Arc::new(mock), &config)
            .with_cancellation(token)
            .run()
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(outcome.cancelled);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.stats.scanned, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.stats.failures[0].error.contains("503"));
    }

    #[tokio::test]
    async fn test_cancel_between_stages_fails_file_without_importing() {
        let dir = TempDir::new().unwrap();
        write_eml(dir.path(), "1.eml", "<a@host>");

        let token = CancellationToken::new();
        let op_token = token.clone();
        let mut mock = MockMailbox::new();
        mock.expect_search_message_ids()
            .times(1)
            .returning(move |_, _| {
                op_token.cancel();
                Ok(vec![])
            });
        mock.expect_list_labels().never();
        mock.expect_import_message().never();

        let outcome = RunOrchestrator::new(run_config(dir.path(), true), Arc::new(mock), &fast_config())
            .with_cancellation(token)
            .run()
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.stats.scanned, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.stats.failures[0].error.contains("cancelled"));
    }
}
