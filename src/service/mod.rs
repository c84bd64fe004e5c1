//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the pepito-bot:
//! - Chat services (e.g., Slack)
//! - Installation storage (e.g., SurrealDB)
//! - The upstream event stream (server-sent events)
//! - Image downloads
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod image;
pub mod stream;
