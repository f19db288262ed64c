//! CLI session command handlers for status, import, refresh and logout.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::auth::{FileSessionStore, RefreshTokenProvider, SessionStore, StoredSession};
use crate::config::{ClientConfig, ConfigError};

use super::{connect, ImportArgs};

fn provider(config: &ClientConfig) -> Result<RefreshTokenProvider, ConfigError> {
    let auth_url = config
        .auth_url
        .clone()
        .ok_or_else(|| ConfigError::Missing("auth_url".to_string()))?;
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(config.session_dir.clone()));
    Ok(RefreshTokenProvider::new(auth_url, store).with_api_key(config.api_key.clone()))
}

/// Handle `tryon session status`.
pub async fn handle_status(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = provider(&config)?;
    match provider.session()? {
        Some(session) => {
            let credential = session.credential();
            let ttl = credential.ttl_secs();
            if ttl > 0 {
                println!("Signed in (expires in {ttl}s at {})", credential.expires_at());
            } else {
                println!("Signed in, access token expired {}s ago", -ttl);
            }
            if let Some(user) = &session.user_id {
                println!("   User: {user}");
            }
            println!("   Session dir: {}", config.session_dir.display());
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

/// Handle `tryon session import`.
pub async fn handle_import(
    config: ClientConfig,
    args: &ImportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.access_token.trim().is_empty() || args.refresh_token.trim().is_empty() {
        return Err("access and refresh tokens must not be empty".into());
    }
    let session = StoredSession {
        access_token: args.access_token.clone(),
        refresh_token: args.refresh_token.clone(),
        expires_at: Utc::now() + Duration::seconds(args.expires_in),
        user_id: None,
    };
    provider(&config)?.sign_in(&session)?;
    println!("Session saved to {}", config.session_dir.display());
    Ok(())
}

/// Handle `tryon session refresh`.
pub async fn handle_refresh(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = connect(config).await?;
    let credential = client.refresh_now().await?;
    println!("Session refreshed (expires in {}s)", credential.ttl_secs());
    Ok(())
}

/// Handle `tryon session logout`.
pub async fn handle_logout(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = connect(config).await?;
    client.sign_out().await?;
    println!("Signed out");
    Ok(())
}
