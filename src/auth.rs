//! OAuth2 authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use tracing::{debug, info};
use yup_oauth2::ApplicationSecret;

use crate::error::{ClientResult, GmailError};

/// Scope requested for audits: read access to messages and labels
pub const READONLY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Scope needed by label creation and bulk label mutation
pub const MODIFY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Read the OAuth client secret
///
/// The credentials file wins; when it does not exist, `GMAIL_CLIENT_ID` and
/// `GMAIL_CLIENT_SECRET` are used instead.
pub async fn load_application_secret(credentials_path: &Path) -> ClientResult<ApplicationSecret> {
    if tokio::fs::try_exists(credentials_path).await.unwrap_or(false) {
        return yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)));
    }

    debug!(
        path = %credentials_path.display(),
        "Credentials file not found, trying environment"
    );
    load_credentials_from_env().map_err(|e| {
        GmailError::AuthError(format!(
            "{} not found and {}",
            credentials_path.display(),
            e
        ))
    })
}

/// Build an application secret from environment variables
///
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: optional, defaults to http://localhost:8080
pub fn load_credentials_from_env() -> ClientResult<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| GmailError::AuthError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| GmailError::AuthError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri =
        env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Initialize the Gmail hub with installed-app OAuth2
///
/// Tokens are cached at `token_cache_path` and pre-fetched for `scopes`, so
/// the browser consent happens here rather than in the middle of a run.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    scopes: &[&str],
) -> ClientResult<GmailHub> {
    let secret = load_application_secret(credentials_path).await?;

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    let _token = auth
        .token(scopes)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if tokio::fs::try_exists(token_cache_path).await.unwrap_or(false) {
        secure_token_file(token_cache_path).await?;
    }
    info!(token_cache = %token_cache_path.display(), "Authenticated with Gmail");

    // HTTP/1 works better with google-gmail1
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Remove a cached token so the next run re-authorizes
pub async fn clear_token_cache(token_cache_path: &Path) -> ClientResult<bool> {
    match tokio::fs::remove_file(token_cache_path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Restrict the token cache to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> ClientResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; the token cache keeps its inherited permissions
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> ClientResult<()> {
    Ok(())
}
