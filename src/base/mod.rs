//! Core components, types, and utilities for the pepito-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Upstream event decoding and message formatting.
//! - Common types and result handling.

pub mod config;
pub mod event;
pub mod types;
