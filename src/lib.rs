//! Library root for `pepito-bot`.
//!
//! Pepito-bot relays Pepito the cat's comings and goings to Slack:
//! - Every installed workspace gets its own session on the upstream event stream
//! - Presence changes are posted to the workspace's chosen channel, with the photo
//! - Heartbeats and malformed events are filtered out along the way
//!
//! The bot integrates with Slack for chat and SurrealDB for storing
//! installations.  The architecture is built around extensible traits that
//! allow for different implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod frontend;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the pepito-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the store, chat and stream clients
/// - Launches the sessions and the installation front end
pub async fn start(config: Config) -> Void {
    info!("Starting pepito-bot ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
