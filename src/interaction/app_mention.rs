//! Relays an LLM completion into a Slack message.
//!
//! A placeholder is posted first, then edited in place as fragments arrive.

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, instrument};

use crate::{
    base::types::Void,
    service::{
        chat::{Attachment, ChatClient},
        llm::LlmClient,
    },
};

use super::{
    dispatcher::{DispatchError, EventHandler},
    event::{CallbackEvent, CallbackEventType, MentionEvent},
};

/// Bytes of new text that trigger an edit once exceeded.
pub const EDIT_THRESHOLD: usize = 100;

/// Text of the placeholder message.
pub const PLACEHOLDER_TEXT: &str = "...";

/// Handles `app_mention` events.
pub struct AppMentionHandler {
    llm: LlmClient,
    chat: ChatClient,
}

impl AppMentionHandler {
    pub fn new(llm: LlmClient, chat: ChatClient) -> Self {
        Self { llm, chat }
    }
}

#[async_trait]
impl EventHandler for AppMentionHandler {
    fn event_type(&self) -> CallbackEventType {
        CallbackEventType::AppMention
    }

    async fn handle(&self, event: CallbackEvent) -> Void {
        let mention = match event {
            CallbackEvent::AppMention(mention) => mention,
            other => return Err(DispatchError::UnsupportedDataType(other.event_type().to_string()).into()),
        };

        handle_app_mention(&mention, &self.llm, &self.chat).await
    }
}

/// Post a placeholder, stream the completion for the mention text into it, and finish with a newline.
///
/// Every edit shows everything received so far. Chat API failures are returned;
/// completion failures only cut the text short.
#[instrument(skip_all, fields(channel = %event.channel_id, user = %event.user_id))]
pub async fn handle_app_mention(event: &MentionEvent, llm: &LlmClient, chat: &ChatClient) -> Void {
    info!("Received an app mention event ...");

    let ts = chat.post_message(&event.channel_id, &Attachment::relay(PLACEHOLDER_TEXT)).await.context("post message")?;

    let mut fragments = llm.create_chat_completion(&event.text).await?;

    let mut message = String::new();
    let mut pending = 0;

    while let Some(fragment) = fragments.next().await {
        message.push_str(&fragment);
        pending += fragment.len();

        if pending > EDIT_THRESHOLD {
            debug!("Updating message with {} bytes ...", message.len());

            chat.update_message(&event.channel_id, &ts, &Attachment::relay(message.as_str())).await.context("update message")?;
            pending = 0;
        }
    }

    message.push('\n');

    chat.update_message(&event.channel_id, &ts, &Attachment::relay(message)).await.context("update message")?;

    info!("Relayed completion to message `{ts}`.");

    Ok(())
}
