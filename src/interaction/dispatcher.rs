//! Routes socket-mode envelopes to event handlers.
//!
//! Only Events API envelopes are handled; they are acknowledged first and then
//! routed by their callback event type. Anything the dispatcher has no
//! handler for stops the run loop with a [`DispatchError`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{Instrument, info, instrument, warn};

use crate::{
    base::types::Void,
    service::{chat::ChatClient, llm::LlmClient},
};

use super::{
    app_mention::AppMentionHandler,
    event::{CallbackEvent, CallbackEventType, EventsApiEvent, SocketEvent, SocketPayload},
};

// Errors.

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The Events API envelope was not an `event_callback`.
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),
    /// No handler is registered for the callback event.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),
}

// Traits.

/// A handler for one callback event type.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The tag this handler is registered under.
    fn event_type(&self) -> CallbackEventType;

    /// Handle one event; an error stops the dispatcher.
    async fn handle(&self, event: CallbackEvent) -> Void;
}

// Structs.

/// Dispatch table keyed by callback event type.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<CallbackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that relays app mentions to the LLM.
    pub fn with_app_mention(llm: LlmClient, chat: ChatClient) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(AppMentionHandler::new(llm, chat));
        dispatcher
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Process events until `shutdown` resolves, the queue closes, or something fails.
    ///
    /// Handlers run concurrently, one task per event. The first handler error,
    /// or an event with no handler, ends the loop with that error. When the
    /// queue closes, in-flight handlers are awaited first.
    #[instrument(name = "EventDispatcher::run", skip_all)]
    pub async fn run<F>(&self, mut events: mpsc::Receiver<SocketEvent>, shutdown: F) -> Void
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut in_flight: JoinSet<Void> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutting down socket mode listener.");
                    return Ok(());
                }
                Some(result) = in_flight.join_next() => {
                    result??;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event queue closed; waiting for {} in-flight handler(s) ...", in_flight.len());

                        while let Some(result) = in_flight.join_next().await {
                            result??;
                        }

                        return Ok(());
                    };

                    self.accept(event, &mut in_flight)?;
                }
            }
        }
    }

    /// Acknowledge an Events API envelope and start its handler.
    fn accept(&self, event: SocketEvent, in_flight: &mut JoinSet<Void>) -> Void {
        let (payload, ack) = event.into_parts();

        let api_event = match payload {
            SocketPayload::EventsApi(api_event) => api_event,
            other => {
                info!("Ignoring {} envelope: {:?}", other.kind(), other);
                return Ok(());
            }
        };

        ack.ack();

        let callback = match api_event {
            EventsApiEvent::Callback(callback) => callback,
            other => return Err(DispatchError::UnsupportedEventType(other.event_type().to_string()).into()),
        };

        let event_type = callback.event_type();
        let Some(handler) = self.handlers.get(&event_type).cloned() else {
            warn!("No handler for `{event_type}` events.");
            return Err(DispatchError::UnsupportedDataType(event_type.to_string()).into());
        };

        in_flight.spawn(async move { handler.handle(callback).await }.in_current_span());

        Ok(())
    }
}

// Tests.
