pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    base::types::{Res, Void},
    interaction::event::SocketEvent,
};

/// Title of every message the bot posts.
pub const ATTACHMENT_TITLE: &str = "LLMariner Slackbot";

/// Accent color of every message the bot posts.
pub const ATTACHMENT_COLOR: &str = "#3d3d3d";

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the slackbot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Run the socket-mode transport.
    ///
    /// Every envelope received is sent into `events`; the transport only
    /// confirms an envelope to the platform once the receiver acknowledges it.
    async fn listen(&self, events: mpsc::Sender<SocketEvent>) -> Void;

    /// Post a new message to a channel and return its timestamp.
    ///
    /// The timestamp identifies the message for later updates.
    async fn post_message(&self, channel_id: &str, attachment: &Attachment) -> Res<String>;

    /// Replace the contents of a previously posted message.
    async fn update_message(&self, channel_id: &str, ts: &str, attachment: &Attachment) -> Void;
}

// Structs.

/// A single message attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub title: String,
    pub text: String,
    pub color: String,
}

impl Attachment {
    /// An attachment with the bot's title and color.
    pub fn relay(text: impl Into<String>) -> Self {
        Self {
            title: ATTACHMENT_TITLE.to_string(),
            text: text.into(),
            color: ATTACHMENT_COLOR.to_string(),
        }
    }
}

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
