//! Delivery of a single notification to an installation's channel.

use tracing::{instrument, warn};

use crate::{
    base::types::{Installation, Notification, Res},
    service::{chat::ChatClient, image::ImageClient},
};

/// How a notification ended up being posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The image was uploaded with the message as its caption.
    ImageUploaded,
    /// The image could not be downloaded, so only the message was posted.
    TextOnly,
}

/// Deliver a notification, falling back to text only when the image cannot be downloaded.
///
/// Nothing is retried.  Errors mean the notification was lost.
#[instrument(skip_all, fields(team_id = %installation.team_id, image_url = %notification.image_url))]
pub async fn deliver(installation: &Installation, notification: &Notification, images: &ImageClient, chat: &ChatClient) -> Res<DeliveryOutcome> {
    match images.fetch(&notification.image_url).await {
        Ok(image) => {
            chat.upload_image(installation, image, &notification.text).await?;
            Ok(DeliveryOutcome::ImageUploaded)
        }
        Err(e) => {
            warn!("Failed to download image, posting text only: {}", e);
            chat.post_message(installation, &notification.text).await?;
            Ok(DeliveryOutcome::TextOnly)
        }
    }
}
