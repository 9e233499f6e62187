//! Core components and types for the slackbot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration file parsing and secrets from the environment.
//! - Common result types.

pub mod config;
pub mod types;
