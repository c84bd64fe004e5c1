//! Common types shared across the bot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Application error type.
pub type Err = anyhow::Error;
/// Application result type.
pub type Res<T> = Result<T, Err>;
/// Application result type for calls that return nothing.
pub type Void = Res<()>;

/// A workspace that has installed the bot.
///
/// Owned by the installation store; sessions only ever hold a snapshot.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installation {
    /// The Slack team (workspace) ID.  This is the unique key.
    pub team_id: String,
    /// The Slack team name, if Slack reported one.
    #[serde(default)]
    pub team_name: Option<String>,
    /// The bot access token granted during OAuth.
    pub bot_token: String,
    /// The bot user ID, if Slack reported one.
    #[serde(default)]
    pub bot_user_id: Option<String>,
    /// The channel updates are posted to, once selected.
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Installation {
    /// Create a new installation that has not selected a channel yet.
    pub fn new(team_id: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: None,
            bot_token: bot_token.into(),
            bot_user_id: None,
            channel_id: None,
        }
    }

    /// Set the target channel.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }
}

// The bot token must never end up in the logs.
impl fmt::Debug for Installation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installation")
            .field("team_id", &self.team_id)
            .field("team_name", &self.team_name)
            .field("bot_token", &"<redacted>")
            .field("bot_user_id", &self.bot_user_id)
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

/// A channel the bot can see, as offered in the channel selection form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSummary {
    /// The channel ID.
    pub id: String,
    /// The channel name, without the leading `#`.
    pub name: String,
}

/// A message ready to be posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The message text (used as the image caption when the image is available).
    pub text: String,
    /// The image to attach.
    pub image_url: String,
}
