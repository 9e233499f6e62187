//! Event handling for the slackbot.
//!
//! This module provides functionality for handling socket-mode events:
//! - Envelope types passed from the transport to the dispatcher
//! - The dispatcher that acknowledges and routes them
//! - The app-mention handler that relays completions into Slack

pub mod app_mention;
pub mod dispatcher;
pub mod event;
