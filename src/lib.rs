//! Gmail EML Importer
//!
//! Imports a directory of RFC 5322 `.eml` files into a Gmail mailbox through
//! the Gmail API, preserving each message's original date, attaching a
//! user-chosen label, and skipping messages whose `Message-ID` is already
//! present.
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_eml_import::{auth, client::ProductionGmailClient, config::Config};
//! use gmail_eml_import::{RunConfiguration, RunOrchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tuning = Config::load("gmail-eml-import.toml".as_ref()).await?;
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         "token.json".as_ref(),
//!     ).await?;
//!
//!     let run = RunConfiguration {
//!         root_path: "./export".into(),
//!         credentials_path: "credentials.json".into(),
//!         label_name: "Imported".to_string(),
//!         recursive: true,
//!         skip_duplicates: true,
//!     };
//!
//!     let client = Arc::new(ProductionGmailClient::from_config(hub, &tuning));
//!     let outcome = RunOrchestrator::new(run, client, &tuning).run().await?;
//!     println!("{} imported", outcome.stats.imported);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`walker`] - Deterministic discovery of `.eml` files
//! - [`loader`] - Reading files and parsing header blocks
//! - [`duplicates`] - Message-ID duplicate detection
//! - [`label_manager`] - Label lookup and creation
//! - [`importer`] - Message insertion with original dates
//! - [`orchestrator`] - Per-run state machine and statistics
//! - [`client`] - Quota-aware Gmail API client
//! - [`retry`] - Bounded exponential backoff
//! - [`auth`] - OAuth2 authentication and Gmail hub setup

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod importer;
pub mod label_manager;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod walker;

pub use error::{ImportError, Result};

pub use models::{
    DateSource, DuplicateKey, FileFailure, FileOutcome, ImportStats, ParsedMessage, ProgressEvent,
};

pub use config::{Config, RunConfiguration};

pub use client::{ImportRequest, LabelInfo, MailboxClient, ProductionGmailClient};

pub use duplicates::DuplicateIndex;
pub use importer::MailboxImporter;
pub use label_manager::LabelManager;
pub use orchestrator::{ProgressSink, RunOrchestrator, RunOutcome};
pub use retry::RetryPolicy;

pub use cli::{Cli, ImportReport, ProgressReporter};
