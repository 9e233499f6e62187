pub mod llmariner;

use std::{
    ops::Deref,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::base::types::{Res, Void};

// Traits.

/// Generic LLM client trait that clients must implement.
///
/// Implementations start the completion in the background and hand back a
/// [`FragmentStream`] immediately.
#[async_trait]
pub trait GenericLlmClient: Send + Sync + 'static {
    /// Start a streaming chat completion for a single user prompt.
    ///
    /// Failures after the request has been started are logged by the producer
    /// and simply end the stream early.
    async fn create_chat_completion(&self, prompt: &str) -> Res<FragmentStream>;
}

// Structs.

/// LLM client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct LlmClient {
    inner: Arc<dyn GenericLlmClient>,
}

impl Deref for LlmClient {
    type Target = dyn GenericLlmClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl LlmClient {
    pub fn new(inner: Arc<dyn GenericLlmClient>) -> Self {
        Self { inner }
    }
}

/// Single-pass sequence of content fragments from a streaming completion.
///
/// The stream ends when the producer closes the channel: either the
/// completion finished or it failed. [`FragmentStream::finish`] reports which.
pub struct FragmentStream {
    rx: mpsc::Receiver<String>,
    producer: Option<JoinHandle<Void>>,
}

impl FragmentStream {
    /// Wrap a channel fed by a background producer task.
    pub fn new(rx: mpsc::Receiver<String>, producer: JoinHandle<Void>) -> Self {
        Self { rx, producer: Some(producer) }
    }

    /// A stream that yields the given fragments and then ends.
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(fragments.len().max(1));

        for fragment in fragments {
            // The channel was sized to hold everything.
            let _ = tx.try_send(fragment);
        }

        Self { rx, producer: None }
    }

    /// Wait for the producer to exit and return its result.
    ///
    /// Remaining fragments are discarded.
    pub async fn finish(mut self) -> Void {
        self.rx.close();

        match self.producer.take() {
            Some(producer) => producer.await?,
            None => Ok(()),
        }
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn from_fragments_yields_in_order() {
        let stream = FragmentStream::from_fragments(["a", "b", "c"]);
        let fragments: Vec<String> = stream.collect().await;

        assert_eq!(fragments, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn finish_reports_producer_error() {
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            drop(tx);
            Err::<(), _>(anyhow::anyhow!("boom"))
        });

        let mut stream = FragmentStream::new(rx, producer);
        assert!(stream.next().await.is_none());

        let err = stream.finish().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
