//! Runtime services and shared state for the slackbot.

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::{Config, Secrets},
        types::{Res, Void},
    },
    interaction::dispatcher::EventDispatcher,
    service::{chat::ChatClient, llm::LlmClient},
};

/// Envelopes buffered between the socket transport and the dispatcher.
const EVENT_QUEUE_CAPACITY: usize = 16;

/// Runtime service context that can be shared across the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The LLM client instance.
    pub llm: LlmClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config, secrets: &Secrets) -> Res<Self> {
        // Initialize the LLM client.
        let llm = LlmClient::llmariner(&config, &secrets.llmariner_api_key);

        // Initialize the slack client.
        let chat = ChatClient::slack(secrets).await?;

        Ok(Self { config, llm, chat })
    }

    /// Run the dispatcher and the socket transport until either stops or Ctrl-C is pressed.
    pub async fn start(&self) -> Void {
        self.run(shutdown_on(tokio::signal::ctrl_c())).await
    }

    /// Run the dispatcher and the socket transport until either stops or `shutdown` resolves.
    ///
    /// Whichever side finishes first decides the result; the other is dropped.
    pub async fn run<F>(&self, shutdown: F) -> Void
    where
        F: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let dispatcher = EventDispatcher::with_app_mention(self.llm.clone(), self.chat.clone());

        info!("Listening for app mentions (model `{}`) ...", self.config.model_id);

        tokio::select! {
            result = dispatcher.run(rx, shutdown) => result,
            result = self.chat.listen(tx) => result,
        }
    }
}

/// Resolve once `signal` fires.
///
/// If the handler cannot be installed, this never resolves and the bot runs until the transport or dispatcher stops.
async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        warn!("Failed to listen for Ctrl-C, shutdown on signal is disabled: {err}");
        std::future::pending::<()>().await;
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn signal_resolves_shutdown() {
        shutdown_on(async { Ok(()) }).await;
    }

    #[tokio::test]
    async fn failed_signal_registration_never_shuts_down() {
        let shutdown = shutdown_on(async { Err(std::io::Error::other("no signal support")) });

        assert!(tokio::time::timeout(Duration::from_millis(50), shutdown).await.is_err());
    }
}
