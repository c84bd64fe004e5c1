//! Per-installation bot sessions.
//!
//! This module provides the core of the bot:
//! - Running one session per installation against the upstream event stream
//! - Turning frames into notifications and delivering them
//! - Launching and replacing sessions as installations come and go

pub mod delivery;
pub mod session;
pub mod supervisor;
