//! Slack integration for the slackbot.
//!
//! This module provides both halves of the Slack connection:
//! - The socket-mode transport that receives envelopes and hands them to the dispatcher
//! - Web API calls that post and update the relayed messages

use crate::{
    base::{
        config::Secrets,
        types::{Res, Void},
    },
    interaction::event::{CallbackEvent, EventsApiEvent, MentionEvent, SocketEvent, SocketPayload},
};
use anyhow::anyhow;
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use serde::Serialize;
use slack_morphism::prelude::*;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use std::sync::Arc;

use super::{Attachment, ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;
type CallbackResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(secrets: &Secrets) -> Res<Self> {
        let client = SlackChatClient::new(secrets).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// User state for the slack socket client.
struct TransportState {
    events: mpsc::Sender<SocketEvent>,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    client: Arc<FullClient>,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(secrets: &Secrets) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(secrets.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(secrets.slack_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Check the bot token before any event arrives.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await.map_err(|e| anyhow!("Failed to authenticate the Slack bot token: {}", e))?;

        info!("Slack bot user ID: {}", bot_user.user_id.0);

        Ok(Self { app_token, bot_token, client })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    async fn listen(&self, events: mpsc::Sender<SocketEvent>) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(TransportState { events }));

        let socket_mode_listener = SlackClientSocketModeListener::new(&SlackClientSocketModeConfig::new(), listener_environment, socket_mode_callbacks);

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, attachment))]
    async fn post_message(&self, channel_id: &str, attachment: &Attachment) -> Res<String> {
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), to_message_content(attachment));

        let session = self.client.open_session(&self.bot_token);

        let response = session.chat_post_message(&request).await.map_err(|e| anyhow!("post message: {}", e))?;

        Ok(response.ts.0)
    }

    #[instrument(skip(self, attachment))]
    async fn update_message(&self, channel_id: &str, ts: &str, attachment: &Attachment) -> Void {
        let request = SlackApiChatUpdateRequest::new(SlackChannelId(channel_id.to_string()), to_message_content(attachment), SlackTs(ts.to_string()));

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_update(&request).await.map_err(|e| anyhow!("update message: {}", e))?;

        Ok(())
    }
}

// Conversions.

fn to_message_content(attachment: &Attachment) -> SlackMessageContent {
    let attachment = SlackMessageAttachment::new()
        .with_title(attachment.title.clone())
        .with_text(attachment.text.clone())
        .with_color(attachment.color.clone());

    SlackMessageContent::new().with_attachments(vec![attachment])
}

/// Map a Slack callback body onto the dispatcher's event type.
fn to_callback_event(body: SlackEventCallbackBody) -> CallbackEvent {
    match body {
        SlackEventCallbackBody::AppMention(event) => CallbackEvent::AppMention(MentionEvent {
            channel_id: event.channel.0,
            user_id: event.user.0,
            text: event.content.text.unwrap_or_default(),
            ts: event.origin.ts.0,
        }),
        other => CallbackEvent::Other { event_type: type_tag(&other) },
    }
}

/// The serde `type` tag of a Slack payload.
fn type_tag<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

// Socket mode listener callbacks for Slack.

/// Hand an envelope to the dispatcher and wait for it to be acknowledged.
async fn forward(states: &SlackClientEventsUserState, payload: SocketPayload) -> CallbackResult<()> {
    let events = {
        let states = states.read().await;
        let user_state = states.get_user_state::<TransportState>().ok_or(anyhow!("Failed to get user state"))?;
        user_state.events.clone()
    };

    forward_to(&events, payload).await?;

    Ok(())
}

/// Send one envelope into the queue; succeeds only once the receiver acks it.
async fn forward_to(events: &mpsc::Sender<SocketEvent>, payload: SocketPayload) -> Void {
    let (event, acked) = SocketEvent::new(payload);

    events.send(event).await.map_err(|_| anyhow!("The event dispatcher has stopped."))?;
    acked.await.map_err(|_| anyhow!("The envelope was not acknowledged."))?;

    Ok(())
}

/// Handles command events from Slack.
///
/// Commands are left unacknowledged: the dispatcher ignores them, so `forward` fails.
async fn handle_command_event(event: SlackCommandEvent, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> CallbackResult<SlackCommandEventResponse> {
    debug!("[COMMAND] {:#?}", event);

    forward(&states, SocketPayload::SlashCommand { command: event.command.0 }).await?;

    Err(anyhow!("Slash commands are not supported.").into())
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> CallbackResult<()> {
    debug!("[INTERACTION] {:#?}", event);

    forward(&states, SocketPayload::Interactive { interaction_type: type_tag(&event) }).await
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> CallbackResult<()> {
    let event = to_callback_event(event_callback.event);

    forward(&states, SocketPayload::EventsApi(EventsApiEvent::Callback(event))).await
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mention_is_mapped() {
        let body: SlackEventCallbackBody = serde_json::from_value(serde_json::json!({
            "type": "app_mention",
            "user": "U061F7AUR",
            "channel": "C0LAN2Q65",
            "text": "<@U0LAN0Z89> is it everything a river should be?",
            "ts": "1515449522.000016",
            "event_ts": "1515449522000016",
        }))
        .unwrap();

        assert_eq!(
            to_callback_event(body),
            CallbackEvent::AppMention(MentionEvent {
                channel_id: "C0LAN2Q65".into(),
                user_id: "U061F7AUR".into(),
                text: "<@U0LAN0Z89> is it everything a river should be?".into(),
                ts: "1515449522.000016".into(),
            })
        );
    }

    #[test]
    fn attachment_carries_title_text_and_color() {
        let content = to_message_content(&Attachment::relay("partial answer"));
        let attachments = content.attachments.unwrap();

        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].title.as_deref(), Some("LLMariner Slackbot"));
        assert_eq!(attachments[0].text.as_deref(), Some("partial answer"));
        assert_eq!(attachments[0].color.as_deref(), Some("#3d3d3d"));
    }

    fn command() -> SocketPayload {
        SocketPayload::SlashCommand { command: "/ask".into() }
    }

    #[tokio::test]
    async fn forward_succeeds_once_acked() {
        let (tx, mut rx) = mpsc::channel(1);

        let dispatcher = tokio::spawn(async move {
            let event: SocketEvent = rx.recv().await.unwrap();
            let (payload, ack) = event.into_parts();
            ack.ack();
            payload
        });

        forward_to(&tx, command()).await.unwrap();
        assert_eq!(dispatcher.await.unwrap(), command());
    }

    #[tokio::test]
    async fn forward_fails_when_dropped_unacked() {
        let (tx, mut rx) = mpsc::channel(1);

        let dispatcher = tokio::spawn(async move {
            drop(rx.recv().await);
        });

        let err = forward_to(&tx, command()).await.unwrap_err();
        dispatcher.await.unwrap();

        assert_eq!(err.to_string(), "The envelope was not acknowledged.");
    }

    #[tokio::test]
    async fn forward_fails_when_the_queue_is_closed() {
        let (tx, rx) = mpsc::channel::<SocketEvent>(1);
        drop(rx);

        let err = forward_to(&tx, command()).await.unwrap_err();

        assert_eq!(err.to_string(), "The event dispatcher has stopped.");
    }

    #[test]
    fn type_tag_reads_the_serde_tag() {
        assert_eq!(type_tag(&serde_json::json!({ "type": "block_actions" })), "block_actions");
        assert_eq!(type_tag(&serde_json::json!({ "kind": "nope" })), "unknown");
    }
}
