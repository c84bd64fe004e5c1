pub mod sse;

use std::{ops::Deref, pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;

use sse::SseFrame;

// Types.

/// Boxed stream of frames as produced by a stream client implementation.
pub type BoxedFrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send>>;

/// Everything that can go wrong with the upstream connection.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The request could not be sent, or the connection could not be established.
    #[error("failed to connect to the event stream: {0}")]
    Connect(#[source] reqwest::Error),
    /// The upstream answered with a non-2xx status.
    #[error("event stream responded with status {0}")]
    Status(reqwest::StatusCode),
    /// Reading the body failed mid-stream.
    #[error("failed to read from the event stream: {0}")]
    Read(#[source] reqwest::Error),
    /// Nothing arrived within the idle timeout.
    #[error("event stream was idle for {0:?}")]
    IdleTimeout(Duration),
    /// The upstream closed the connection.
    #[error("event stream was closed by the upstream")]
    Closed,
}

// Traits.

/// Generic event stream client trait that clients must implement.
///
/// Opening is the only fallible step that is retried by callers; the client
/// itself never retries.
#[async_trait]
pub trait GenericEventStreamClient: Send + Sync + 'static {
    /// Start a streaming request against `url`.
    ///
    /// Fails if the request cannot be established or the status is not 2xx.
    async fn open(&self, url: &str) -> Result<FrameStream, StreamError>;
}

// Structs.

/// Event stream client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct EventStreamClient {
    inner: Arc<dyn GenericEventStreamClient>,
}

impl Deref for EventStreamClient {
    type Target = dyn GenericEventStreamClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl EventStreamClient {
    pub fn new(inner: Arc<dyn GenericEventStreamClient>) -> Self {
        Self { inner }
    }
}

/// Handle over one open upstream connection.
pub struct FrameStream {
    frames: BoxedFrameStream,
    idle_timeout: Option<Duration>,
}

impl FrameStream {
    pub fn new(frames: BoxedFrameStream, idle_timeout: Option<Duration>) -> Self {
        Self { frames, idle_timeout }
    }

    /// Wait for the next frame.
    ///
    /// Frames come out in the order they were received.  `Ok(None)` means the
    /// upstream closed the connection; the stream is finished after that, as
    /// it is after any error.
    pub async fn next_frame(&mut self) -> Result<Option<SseFrame>, StreamError> {
        let next = match self.idle_timeout {
            Some(idle_timeout) => tokio::time::timeout(idle_timeout, self.frames.next()).await.map_err(|_| StreamError::IdleTimeout(idle_timeout))?,
            None => self.frames.next().await,
        };

        next.transpose()
    }
}

/// Bounded exponential backoff for re-opening a failed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before reconnect attempt `attempt` (zero based), or `None` once the attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.checked_mul(factor).unwrap_or(self.max_delay);

        Some(delay.min(self.max_delay))
    }

    /// Like [`ReconnectPolicy::delay_for`], but never shorter than the server's `retry:` hint.
    ///
    /// The hint is still capped at `max_delay`.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Option<Duration> {
        let floor = hint.unwrap_or_default().min(self.max_delay);
        self.delay_for(attempt).map(|delay| delay.max(floor))
    }
}

// Tests.
