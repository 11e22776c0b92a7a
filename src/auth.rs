//! OAuth2 authentication management for Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ImportError, Result};

/// Scopes needed to search, label and import messages
///
/// - gmail.modify: messages.list and messages.import
/// - gmail.labels: label listing and creation
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Printed when the credentials file is missing
pub const CREDENTIALS_HELP: &str = "To get Gmail API credentials:
1. Go to https://console.cloud.google.com/
2. Create a new project or select existing one
3. Enable Gmail API
4. Create OAuth2 credentials (Desktop application)
5. Download the credentials.json file";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    #[serde(default)]
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Fail fast on a missing or malformed credentials file, before any OAuth flow
pub async fn check_credentials(path: &Path) -> Result<Credentials> {
    if !path.exists() {
        return Err(ImportError::AuthError(format!(
            "Credentials file not found: {}",
            path.display()
        )));
    }

    load_credentials(path).await.map_err(|e| {
        ImportError::AuthError(format!(
            "Credentials file {} is not a desktop OAuth2 client: {}",
            path.display(),
            e
        ))
    })
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Runs the installed-app flow (opening a browser when no cached token exists),
/// persists tokens to `token_cache_path`, and pre-fetches a token for
/// [`REQUIRED_SCOPES`] so authentication failures surface before the run starts.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| ImportError::AuthError(format!("Failed to read credentials: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| ImportError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| ImportError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    // HTTP/1 works better with google-gmail1 uploads
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| ImportError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // Windows relies on the profile directory ACLs
    Ok(())
}
