//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services used by the slackbot:
//! - Chat services (e.g., Slack)
//! - LLM services (e.g., LLMariner)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod llm;
