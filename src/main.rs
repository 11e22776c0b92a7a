use anyhow::Result;
use clap::Parser;
use gmail_eml_import::auth::CREDENTIALS_HELP;
use gmail_eml_import::cli::{self, Cli};
use gmail_eml_import::config::Config;
use gmail_eml_import::error::ImportError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C
const EXIT_CANCELLED: i32 = 130;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(self.multi.clone())
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            display_error(&e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    // On non-Windows platforms, use aws-lc-rs; on Windows, use ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_eml_import=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_eml_import=info,warn"))
    };

    // Logs print above the progress bar
    let multi_progress = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi_progress.clone(),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if let Some(output) = &cli.init_config {
        if output.exists() {
            return Err(ImportError::ConfigError(format!(
                "Configuration file already exists at {:?}",
                output
            ))
            .into());
        }
        Config::create_example(output).await?;
        println!("Created example configuration file at: {:?}", output);
        return Ok(0);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping... press Ctrl-C again to exit immediately");
        on_interrupt.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, exiting now");
            process::exit(EXIT_CANCELLED);
        }
    });

    let report = cli::run_import(cli, multi_progress.clone(), cancel).await?;

    multi_progress.suspend(|| {
        for line in report.summary_lines() {
            println!("{}", line);
        }
    });

    Ok(if report.cancelled { EXIT_CANCELLED } else { 0 })
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(import_err) = error.downcast_ref::<ImportError>() {
        match import_err {
            ImportError::AuthError(_) => {
                eprintln!("\n{}", CREDENTIALS_HELP);
            }
            ImportError::NotFound(_) => {
                eprintln!("\nHint: Pass the directory that holds your .eml files.");
            }
            ImportError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-eml-import --init-config gmail-eml-import.toml");
            }
            _ => {}
        }
    }
}
