//! Library root for `llmariner-slackbot`.
//!
//! The slackbot relays Slack app mentions to an LLMariner chat-completion
//! endpoint and streams the answer back into Slack:
//! - Receives events over a socket-mode connection and acknowledges them
//! - Posts a placeholder message for every mention
//! - Edits that message in place as the completion streams in
//!
//! The architecture is built around extensible traits so that the chat
//! platform and the LLM backend can each be swapped or mocked.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use anyhow::anyhow;
use base::{
    config::{Config, Secrets},
    types::Void,
};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the slackbot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the LLM and chat clients
/// - Runs the event dispatcher and socket transport until shutdown
pub async fn start(config: Config, secrets: Secrets) -> Void {
    info!("Starting llmariner-slackbot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install the rustls crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config, &secrets).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
