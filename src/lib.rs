//! tryon-client: resilient authenticated calls to try-on backend functions.
//!
//! Attaches a bearer credential to every call, keeps it fresh under
//! concurrent use with a single-flight refresh, retries once on an
//! authentication rejection, and bounds every call with a timeout.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use tryon_client::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://project.functions.example.co/functions/v1")
//!     .with_auth_url("https://project.example.co/auth/v1")
//!     .with_api_key("public-anon-key");
//! let client = ResilientClient::builder(config)
//!     .refresh_token_session()?
//!     .build()?;
//! client.bootstrap().await?;
//!
//! let jobs = JobClient::new(client);
//! let handle = jobs
//!     .start("generate-tryon", &json!({ "garment_id": "g1", "photo_id": "p1" }))
//!     .await?;
//! let result = jobs.wait("tryon-status", &handle, PollPolicy::default()).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod jobs;
pub mod prelude;
pub mod request;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
