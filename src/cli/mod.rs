//! CLI entry point for tryon.

pub mod session;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::client::ResilientClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::request::MethodKind;

/// Try-on backend CLI
#[derive(Parser, Debug)]
#[command(name = "tryon", version, about = "Authenticated calls to try-on backend functions")]
pub struct Cli {
    /// TOML config file; TRYON_* environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Call a remote function
    Call(CallArgs),
    /// Session management
    Session(SessionArgs),
}

/// Arguments for `tryon call`.
#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Function name, e.g. `generate-tryon`
    pub operation: String,

    /// HTTP method
    #[arg(short, long, default_value = "post")]
    pub method: MethodKind,

    /// JSON payload (query parameters for GET)
    #[arg(short, long)]
    pub data: Option<String>,
}

/// Arguments for the `session` subcommand group.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Show the stored session
    Status,
    /// Store a session obtained elsewhere
    Import(ImportArgs),
    /// Refresh the session now
    Refresh,
    /// Forget the stored session
    Logout,
}

/// Arguments for `tryon session import`.
#[derive(Parser, Debug)]
pub struct ImportArgs {
    #[arg(long)]
    pub access_token: String,

    #[arg(long)]
    pub refresh_token: String,

    /// Seconds until the access token expires
    #[arg(long, default_value_t = 3600)]
    pub expires_in: i64,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Load layered config for a command.
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    Ok(ClientConfig::load(path)?)
}

/// Build a client over the file-backed refresh-token session and seed it.
pub async fn connect(config: ClientConfig) -> Result<ResilientClient, Box<dyn std::error::Error>> {
    let client = ResilientClient::builder(config)
        .refresh_token_session()?
        .build()?;
    client.bootstrap().await?;
    Ok(client)
}

/// Handle `tryon call`.
pub async fn handle_call(
    config: ClientConfig,
    args: &CallArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = match &args.data {
        Some(raw) => Some(
            serde_json::from_str::<Value>(raw).map_err(|e| format!("--data is not valid JSON: {e}"))?,
        ),
        None => None,
    };
    let client = connect(config).await?;
    let result = client
        .call(&args.operation, payload.as_ref(), args.method)
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Exit code for a failed command: 2 when the user has to sign in again.
pub fn exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    match error.downcast_ref::<ClientError>() {
        Some(e) if e.requires_reauthentication() => 2,
        _ => 1,
    }
}

/// Human-readable message for a failed command.
pub fn error_message(error: &(dyn std::error::Error + 'static)) -> String {
    match error.downcast_ref::<ClientError>() {
        Some(e) => e.user_message(),
        None => error.to_string(),
    }
}
