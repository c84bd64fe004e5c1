//! Slack integration for pepito-bot.
//!
//! This module provides the Slack implementation of `GenericChatClient`:
//! - Uploading images with a caption, and posting plain text
//! - Completing the OAuth v2 installation flow
//! - Listing the channels an installation can post to
//!
//! One underlying client is shared by every installation; each call opens a
//! session with the installation's own bot token.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use reqwest::Url;
use rustls::{ClientConfig, RootCertStore, crypto};
use slack_morphism::{errors::SlackClientError, prelude::*};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{ChannelSummary, Installation, Res, Void},
};

use super::{ChatClient, GenericChatClient, target_channel};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub fn slack(config: &Config) -> Res<Self> {
        let client = SlackChatClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// Slack client implementation.
struct SlackChatClient {
    client: Arc<FullClient>,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<Url>,
    image_filename: String,
    timeout: Duration,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    fn new(config: &Config) -> Res<Self> {
        let api_url = config.slack_api_url.as_deref().map(Url::parse).transpose()?;
        let plain_http = api_url.as_ref().is_some_and(|url| url.scheme() == "http");

        let builder = if plain_http {
            // Plain HTTP never negotiates TLS, so there are no roots to trust.
            let tls = ClientConfig::builder_with_provider(Arc::new(crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(RootCertStore::empty())
                .with_no_client_auth();

            HttpsConnector::<HttpConnector>::builder().with_tls_config(tls).https_or_http()
        } else {
            HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only()
        };

        let mut connector = SlackClientHyperConnector::with_connector(builder.enable_all_versions().build());

        if let Some(api_url) = &api_url {
            connector = connector.with_slack_api_url(api_url.as_str().trim_end_matches('/'));
        }

        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        Ok(Self {
            client,
            client_id: config.slack_client_id.clone(),
            client_secret: config.slack_client_secret.clone(),
            redirect_uri: config.slack_redirect_uri.as_deref().map(Url::parse).transpose()?,
            image_filename: config.image_filename.clone(),
            timeout: config.http_timeout(),
        })
    }

    /// Await a Slack API call, bounded by the configured timeout.
    ///
    /// API rejections are reported with the error code Slack returned.
    async fn call<T, F>(&self, method: &str, call: F) -> Res<T>
    where
        F: Future<Output = Result<T, SlackClientError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(SlackClientError::ApiError(e))) => Err(anyhow::anyhow!("Slack rejected `{}`: {}", method, e.code)),
            Ok(Err(e)) => Err(anyhow::anyhow!("Slack call `{}` failed: {}", method, e)),
            Err(_) => Err(anyhow::anyhow!("Slack call `{}` timed out after {:?}", method, self.timeout)),
        }
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    #[instrument(skip(self, image, caption), fields(team_id = %installation.team_id, bytes = image.len()))]
    async fn upload_image(&self, installation: &Installation, image: Vec<u8>, caption: &str) -> Void {
        let channel = target_channel(installation)?;
        let token = bot_token(installation);
        let session = self.client.open_session(&token);

        // Reserve an upload slot.

        let request = SlackApiFilesGetUploadUrlExternalRequest::new(self.image_filename.clone(), image.len());
        let slot = self.call("files.getUploadURLExternal", session.get_upload_url_external(&request)).await?;

        // Send the bytes.

        let content_type = image_content_type(&image).to_string();
        let request = SlackApiFilesUploadViaUrlRequest::new(slot.upload_url, image, content_type);
        self.call("files.upload", session.files_upload_via_url(&request)).await?;

        // Share the file to the channel with the caption.

        let request = SlackApiFilesCompleteUploadExternalRequest::new(vec![SlackApiFilesComplete::new(slot.file_id)])
            .with_channel_id(SlackChannelId(channel.to_string()))
            .with_initial_comment(caption.to_string());
        self.call("files.completeUploadExternal", session.files_complete_upload_external(&request)).await?;

        debug!("Uploaded image to channel {}", channel);

        Ok(())
    }

    #[instrument(skip(self, text), fields(team_id = %installation.team_id))]
    async fn post_message(&self, installation: &Installation, text: &str) -> Void {
        let channel = target_channel(installation)?;
        let token = bot_token(installation);
        let session = self.client.open_session(&token);

        let message = SlackMessageContent::new().with_text(text.to_string());
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel.to_string()), message);

        self.call("chat.postMessage", session.chat_post_message(&request)).await?;

        debug!("Posted message to channel {}", channel);

        Ok(())
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Res<Installation> {
        let mut request = SlackOAuthV2AccessTokenRequest::new(
            SlackClientId(self.client_id.clone()),
            SlackClientSecret(self.client_secret.clone()),
            SlackOAuthCode(code.to_string()),
        );

        if let Some(redirect_uri) = &self.redirect_uri {
            request = request.with_redirect_uri(redirect_uri.clone());
        }

        let response = self.call("oauth.v2.access", self.client.oauth2_access(&request)).await?;

        info!("Slack workspace {} authorized the app", response.team.id.0);

        Ok(Installation {
            team_id: response.team.id.0,
            team_name: response.team.name,
            bot_token: response.access_token.0,
            bot_user_id: response.bot_user_id.map(|id| id.0),
            channel_id: None,
        })
    }

    #[instrument(skip(self), fields(team_id = %installation.team_id))]
    async fn list_channels(&self, installation: &Installation) -> Res<Vec<ChannelSummary>> {
        let token = bot_token(installation);
        let session = self.client.open_session(&token);

        let mut channels = Vec::new();
        let mut cursor = None;

        loop {
            let mut request = SlackApiConversationsListRequest::new()
                .with_types(vec![SlackConversationType::Public, SlackConversationType::Private])
                .with_exclude_archived(true);

            if let Some(cursor) = cursor.take() {
                request = request.with_cursor(cursor);
            }

            let response = self.call("conversations.list", session.conversations_list(&request)).await?;

            channels.extend(response.channels.into_iter().map(|channel| ChannelSummary {
                name: channel.name.unwrap_or_else(|| channel.id.0.clone()),
                id: channel.id.0,
            }));

            match response.response_metadata.and_then(|m| m.next_cursor).filter(|c| !c.0.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(channels)
    }
}

// Helpers.

fn bot_token(installation: &Installation) -> SlackApiToken {
    SlackApiToken::new(SlackApiTokenValue(installation.bot_token.clone()))
}

/// Sniff the image format from its magic bytes.
fn image_content_type(image: &[u8]) -> &'static str {
    infer::get(image).map(|kind| kind.mime_type()).unwrap_or("application/octet-stream")
}

// Tests.
