//! The receive-format-deliver loop for one installation.

use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    base::{event, types::Installation},
    runtime::Runtime,
    service::{
        chat::ChatClient,
        image::ImageClient,
        stream::{EventStreamClient, FrameStream, ReconnectPolicy, StreamError, sse::SseFrame},
    },
};

use super::delivery::deliver;

/// What one connection produced before it ended.
struct StreamProgress {
    frames: usize,
    retry: Option<Duration>,
    failure: StreamError,
}

/// A bot session bound to one installation for its whole life.
///
/// The installation is a snapshot taken at construction; later changes to
/// the stored installation are not seen by a running session.
pub struct BotSession {
    installation: Installation,
    events_url: String,
    reconnect: ReconnectPolicy,
    stream: EventStreamClient,
    chat: ChatClient,
    images: ImageClient,
}

impl BotSession {
    pub fn new(runtime: &Runtime, installation: Installation) -> Self {
        let config = &runtime.config;

        Self {
            installation,
            events_url: config.events_url.clone(),
            reconnect: ReconnectPolicy {
                max_attempts: config.reconnect_max_attempts,
                base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            },
            stream: runtime.stream.clone(),
            chat: runtime.chat.clone(),
            images: runtime.images.clone(),
        }
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Run the session until the upstream connection fails for good.
    ///
    /// There is no normal exit: the returned error is the failure that ended
    /// the session, after the reconnect policy (if any) was exhausted.
    #[instrument(name = "session", skip_all, fields(team_id = %self.installation.team_id))]
    pub async fn run(&self) -> StreamError {
        info!("Starting session for channel {:?}", self.installation.channel_id);

        let mut attempt = 0;
        let mut retry_hint = None;

        loop {
            // Connecting.

            let failure = match self.stream.open(&self.events_url).await {
                Ok(frames) => {
                    info!("Connected to the event stream");

                    // Streaming.

                    let progress = self.stream_frames(frames).await;

                    // A connection that closes before sending anything counts as a failed attempt.
                    if progress.frames > 0 {
                        attempt = 0;
                    }

                    retry_hint = progress.retry.or(retry_hint);
                    progress.failure
                }
                Err(e) => e,
            };

            let Some(delay) = self.reconnect.delay_with_hint(attempt, retry_hint) else {
                error!("Session terminated: {}", failure);
                return failure;
            };

            attempt += 1;
            warn!("Event stream failed ({}), reconnecting in {:?} (attempt {}/{})", failure, delay, attempt, self.reconnect.max_attempts);

            tokio::time::sleep(delay).await;
        }
    }

    /// Process frames until the stream fails or closes.
    async fn stream_frames(&self, mut frames: FrameStream) -> StreamProgress {
        let mut progress = StreamProgress {
            frames: 0,
            retry: None,
            failure: StreamError::Closed,
        };

        loop {
            match frames.next_frame().await {
                Ok(Some(frame)) => {
                    progress.frames += 1;
                    progress.retry = frame.retry.or(progress.retry);
                    self.handle_frame(&frame).await;
                }
                Ok(None) => return progress,
                Err(e) => {
                    progress.failure = e;
                    return progress;
                }
            }
        }
    }

    /// Handle one frame.  Nothing that happens here ends the session.
    async fn handle_frame(&self, frame: &SseFrame) {
        debug!(event = ?frame.event, id = ?frame.id, "Received frame");

        let notification = match event::notification_for(&frame.data, &Local) {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                debug!("Nothing to deliver for frame: {}", frame.data);
                return;
            }
            Err(e) => {
                warn!("Dropping malformed frame ({}): {}", e, frame.data);
                return;
            }
        };

        match deliver(&self.installation, &notification, &self.images, &self.chat).await {
            Ok(outcome) => info!("Delivered notification ({:?})", outcome),
            Err(e) => error!("Failed to deliver notification: {}", e),
        }
    }
}
