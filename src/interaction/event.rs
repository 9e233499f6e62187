//! Envelopes handed from the socket transport to the dispatcher.

use std::fmt;

use tokio::sync::oneshot;

/// An envelope received over the socket-mode connection.
///
/// The transport waits on the acknowledgement before confirming the envelope to Slack.
#[derive(Debug)]
pub struct SocketEvent {
    pub payload: SocketPayload,
    ack: oneshot::Sender<()>,
}

impl SocketEvent {
    /// Build an event along with the receiver that resolves once it is acknowledged.
    ///
    /// If the event is dropped without [`SocketEvent::ack`], the receiver resolves to an error.
    pub fn new(payload: SocketPayload) -> (Self, oneshot::Receiver<()>) {
        let (ack, acked) = oneshot::channel();
        (Self { payload, ack }, acked)
    }

    /// Split into the payload and a handle that acknowledges it.
    pub fn into_parts(self) -> (SocketPayload, Acknowledger) {
        (self.payload, Acknowledger(self.ack))
    }
}

/// Confirms receipt of one envelope.
#[derive(Debug)]
pub struct Acknowledger(oneshot::Sender<()>);

impl Acknowledger {
    pub fn ack(self) {
        // The transport may have given up on this envelope already.
        let _ = self.0.send(());
    }
}

/// Envelope types delivered over socket mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPayload {
    /// An Events API envelope.
    EventsApi(EventsApiEvent),
    /// A block action, shortcut or view submission.
    Interactive { interaction_type: String },
    /// A slash command.
    SlashCommand { command: String },
}

impl SocketPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EventsApi(_) => "events_api",
            Self::Interactive { .. } => "interactive",
            Self::SlashCommand { .. } => "slash_commands",
        }
    }
}

/// The outer Events API event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventsApiEvent {
    /// An `event_callback` wrapping a workspace event.
    Callback(CallbackEvent),
    /// Any other outer type (`url_verification`, `app_rate_limited`, ...).
    Other { event_type: String },
}

impl EventsApiEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::Callback(_) => "event_callback",
            Self::Other { event_type } => event_type,
        }
    }
}

/// The workspace event inside an `event_callback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    AppMention(MentionEvent),
    Other { event_type: String },
}

impl CallbackEvent {
    pub fn event_type(&self) -> CallbackEventType {
        match self {
            Self::AppMention(_) => CallbackEventType::AppMention,
            Self::Other { event_type } => CallbackEventType::Other(event_type.clone()),
        }
    }
}

/// Tag used to route callback events to their handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackEventType {
    AppMention,
    Other(String),
}

impl fmt::Display for CallbackEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppMention => f.write_str("app_mention"),
            Self::Other(event_type) => f.write_str(event_type),
        }
    }
}

/// A user mentioned the bot in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
}

// Tests.
