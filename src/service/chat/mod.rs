pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ChannelSummary, Installation, Res, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines everything the bot needs from a chat platform: posting
/// on behalf of an installation, and completing the installation itself.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Upload an image to the installation's channel with `caption` as the accompanying message.
    ///
    /// Fails when the installation has no channel, or when the platform rejects the upload.
    async fn upload_image(&self, installation: &Installation, image: Vec<u8>, caption: &str) -> Void;

    /// Post a plain text message to the installation's channel.
    async fn post_message(&self, installation: &Installation, text: &str) -> Void;

    /// Exchange an OAuth authorization code for a new installation (without a channel).
    async fn exchange_code(&self, code: &str) -> Res<Installation>;

    /// List the channels the installation's bot can post to.
    async fn list_channels(&self, installation: &Installation) -> Res<Vec<ChannelSummary>>;
}

// Structs.

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

/// The channel an installation posts to, or an error if none was selected.
pub(crate) fn target_channel(installation: &Installation) -> Res<&str> {
    installation
        .channel_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Installation {} has no target channel.", installation.team_id))
}
