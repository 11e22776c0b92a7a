//! Command-line interface

use chrono::{DateTime, Utc};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth;
use crate::client::{MailboxClient, ProductionGmailClient};
use crate::config::{Config, RunConfiguration};
use crate::error::{ImportError, Result};
use crate::models::{FileOutcome, ImportStats, ProgressEvent};
use crate::orchestrator::{ProgressSink, RunOrchestrator, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "gmail-eml-import")]
#[command(version = "0.1.0")]
#[command(about = "Import .eml files into Gmail, keeping their original dates", long_about = None)]
pub struct Cli {
    /// Directory containing .eml files
    #[arg(required_unless_present = "init_config")]
    pub path: Option<PathBuf>,

    /// Path to OAuth2 credentials file
    #[arg(short, long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Gmail label applied to every imported message (created if missing)
    #[arg(short, long, required_unless_present = "init_config")]
    pub label: Option<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Import messages even if their Message-ID already exists in the mailbox
    #[arg(long)]
    pub no_duplicates: bool,

    /// Path to tuning file
    #[arg(long, default_value = "gmail-eml-import.toml")]
    pub config: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = "token.json")]
    pub token_cache: PathBuf,

    /// Write a Markdown report of the run to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write an example tuning file to this path and exit
    #[arg(long, value_name = "PATH")]
    pub init_config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_run_configuration(self) -> Result<RunConfiguration> {
        let root_path = self
            .path
            .ok_or_else(|| ImportError::ConfigError("No input directory given".to_string()))?;
        let label_name = self
            .label
            .ok_or_else(|| ImportError::ConfigError("No label given".to_string()))?;

        Ok(RunConfiguration {
            root_path,
            credentials_path: self.credentials,
            label_name,
            recursive: self.recursive,
            skip_duplicates: !self.no_duplicates,
        })
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        // Templates are static, so these never fail
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        let bar = ProgressBar::hidden();
        bar.set_style(bar_style);

        Self {
            multi,
            spinner_style,
            bar,
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ProgressReporter {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        if total > 0 {
            let bar = self.multi.add(self.bar.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
        }
    }

    fn file_processed(&self, event: &ProgressEvent) {
        self.bar.set_position(event.scanned as u64);
        let marker = match event.outcome {
            FileOutcome::Imported => "imported",
            FileOutcome::SkippedDuplicate => "duplicate",
            FileOutcome::Failed => "failed",
        };
        let name = event
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(format!(
            "{} {} | {} imported, {} skipped, {} failed",
            marker,
            truncate_string(&name, 32),
            event.imported,
            event.skipped_duplicate,
            event.failed
        ));
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Summary of one import run, printable and saveable as Markdown
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub run_id: String,
    pub root_path: PathBuf,
    pub label_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub total: usize,
    pub cancelled: bool,
    pub stats: ImportStats,
}

impl ImportReport {
    pub fn new(run_id: String, config: &RunConfiguration, outcome: RunOutcome) -> Self {
        Self {
            run_id,
            root_path: config.root_path.clone(),
            label_name: config.label_name.clone(),
            started_at: outcome.started_at,
            completed_at: outcome.finished_at,
            duration_seconds: (outcome.finished_at - outcome.started_at).num_seconds(),
            total: outcome.total,
            cancelled: outcome.cancelled,
            stats: outcome.stats,
        }
    }

    /// Generate Markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Gmail Import Report\n\n");
        if self.cancelled {
            md.push_str("> **Cancelled** - the run was interrupted; counts cover the files processed before the interruption.\n\n");
        }
        md.push_str(&format!(
            "Generated: {}\n\n",
            self.completed_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Run ID:** {}\n", self.run_id));
        md.push_str(&format!("- **Source:** `{}`\n", self.root_path.display()));
        md.push_str(&format!("- **Label:** `{}`\n", self.label_name));
        md.push_str(&format!(
            "- **Started:** {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        md.push_str(&format!(
            "- **Processing time:** {} minutes {} seconds\n\n",
            self.duration_seconds / 60,
            self.duration_seconds % 60
        ));

        md.push_str("## Results\n\n");
        md.push_str("| Outcome | Files |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Found | {} |\n", self.total));
        md.push_str(&format!("| Scanned | {} |\n", self.stats.scanned));
        md.push_str(&format!("| Imported | {} |\n", self.stats.imported));
        md.push_str(&format!(
            "| Skipped (duplicate) | {} |\n",
            self.stats.skipped_duplicate
        ));
        md.push_str(&format!("| Failed | {} |\n\n", self.stats.failed));

        if !self.stats.failures.is_empty() {
            md.push_str("## Failures\n\n");
            md.push_str("| File | Error |\n");
            md.push_str("|------|-------|\n");
            for failure in &self.stats.failures {
                md.push_str(&format!(
                    "| `{}` | {} |\n",
                    failure.path.display(),
                    failure.error.replace('|', "\\|")
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Save report to file
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.to_markdown()).await
    }

    /// Plain-text summary for the terminal
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "========================================".to_string(),
            if self.cancelled {
                "Import Cancelled".to_string()
            } else {
                "Import Summary".to_string()
            },
            "========================================".to_string(),
            format!("Run ID: {}", self.run_id),
            format!("Duration: {} seconds", self.duration_seconds),
            format!("Files scanned: {}", self.stats.scanned),
            format!("Imported: {}", self.stats.imported),
            format!("Skipped (duplicate): {}", self.stats.skipped_duplicate),
            format!("Failed: {}", self.stats.failed),
        ];
        if !self.stats.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failed files:".to_string());
            for failure in &self.stats.failures {
                lines.push(format!("  - {}: {}", failure.path.display(), failure.error));
            }
        }
        lines.push("========================================".to_string());
        lines
    }
}

/// Authenticate, then import every `.eml` file under the configured root
///
/// Setup problems (bad credentials, missing directory, bad tuning file) are
/// returned as errors. Per-file problems end up in the report instead.
pub async fn run_import(
    cli: Cli,
    multi: MultiProgress,
    cancel: CancellationToken,
) -> Result<ImportReport> {
    let reporter = Arc::new(ProgressReporter::with_multi_progress(multi));
    let run_id = uuid::Uuid::new_v4().to_string();

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let tuning = Config::load(&cli.config).await?;
    reporter.finish_spinner(
        &config_spinner,
        &format!("Configuration loaded from {:?}", cli.config),
    );

    let token_cache = cli.token_cache.clone();
    let report_path = cli.report.clone();
    let run_config = cli.into_run_configuration()?;

    auth::check_credentials(&run_config.credentials_path).await?;
    if !run_config.root_path.is_dir() {
        return Err(ImportError::NotFound(run_config.root_path.clone()));
    }

    if let Some(parent) = token_cache.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&run_config.credentials_path, &token_cache).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

    let client = Arc::new(ProductionGmailClient::from_config(hub, &tuning));
    let mailbox: Arc<dyn MailboxClient> = client.clone();

    info!(
        "Run {}: importing {} into label '{}'",
        run_id,
        run_config.root_path.display(),
        run_config.label_name
    );

    let outcome = RunOrchestrator::new(run_config.clone(), mailbox, &tuning)
        .with_progress(reporter.clone())
        .with_cancellation(cancel)
        .run()
        .await?;
    reporter.finish();

    let quota = client.quota_stats().await;
    info!(
        "Quota used: {} units over {} request(s)",
        quota.total_consumed, quota.total_operations
    );

    let report = ImportReport::new(run_id, &run_config, outcome);
    if let Some(path) = report_path {
        save_report(&report, &path).await;
    }

    Ok(report)
}

/// Write the Markdown report; a write failure never fails a finished run
async fn save_report(report: &ImportReport, path: &Path) -> bool {
    match report.save(path).await {
        Ok(()) => {
            info!("Report saved to {:?}", path);
            true
        }
        Err(e) => {
            warn!("Could not write report to {:?}: {}", path, e);
            false
        }
    }
}
