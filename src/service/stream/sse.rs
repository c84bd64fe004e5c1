//! Server-sent events transport.
//!
//! This module turns a streaming HTTP response into discrete frames.  It knows
//! nothing about what the frame payloads mean.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::{debug, instrument};

use crate::base::{config::Config, types::Res};

use super::{EventStreamClient, FrameStream, GenericEventStreamClient, StreamError};

// Extra methods on `EventStreamClient` applied by the SSE implementation.

impl EventStreamClient {
    /// Creates a new SSE stream client.
    pub fn sse(config: &Config) -> Res<Self> {
        let client = SseStreamClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` name, if the block had one.
    pub event: Option<String>,
    /// The `data:` lines, joined with `\n`.
    pub data: String,
    /// The last `id:` seen on the stream.
    pub id: Option<String>,
    /// The reconnection time last requested with `retry:`.
    pub retry: Option<Duration>,
}

/// Incremental decoder from raw bytes to [`SseFrame`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    after_cr: bool,
    started: bool,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    /// Feed a chunk of bytes, returning every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for &byte in chunk {
            // A CRLF pair may straddle two chunks.
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }

            match byte {
                b'\r' => {
                    self.after_cr = true;
                    frames.extend(self.end_line());
                }
                b'\n' => frames.extend(self.end_line()),
                _ => self.line.push(byte),
            }
        }

        frames
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        let mut bytes = std::mem::take(&mut self.line);

        if !std::mem::replace(&mut self.started, true) && bytes.starts_with(b"\xEF\xBB\xBF") {
            bytes.drain(..3);
        }

        if bytes.is_empty() {
            return self.dispatch();
        }

        let line = String::from_utf8_lossy(&bytes);

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };

        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_owned()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();

        if self.data.is_empty() {
            return None;
        }

        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.last_id.clone(),
            retry: self.retry,
        })
    }
}

/// Decode a byte stream into a stream of frames.
///
/// The frame stream ends when the byte stream ends; a trailing block without
/// its terminating blank line is discarded.
pub fn decode_frames<S, B>(bytes: S) -> impl Stream<Item = Result<SseFrame, StreamError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = (Box::pin(bytes), SseDecoder::default(), VecDeque::new());

    futures::stream::unfold(state, |(mut bytes, mut decoder, mut pending)| async move {
        loop {
            if let Some(frame) = pending.pop_front() {
                return Some((Ok(frame), (bytes, decoder, pending)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                Some(Err(e)) => return Some((Err(StreamError::Read(e)), (bytes, decoder, pending))),
                None => return None,
            }
        }
    })
}

/// SSE client implementation over `reqwest`.
struct SseStreamClient {
    http: reqwest::Client,
    idle_timeout: Option<Duration>,
}

impl SseStreamClient {
    fn new(config: &Config) -> Res<Self> {
        // No overall request timeout: the response never finishes by design.
        let http = reqwest::Client::builder().connect_timeout(config.connect_timeout()).build()?;

        Ok(Self {
            http,
            idle_timeout: config.stream_idle_timeout(),
        })
    }
}

#[async_trait]
impl GenericEventStreamClient for SseStreamClient {
    #[instrument(skip(self))]
    async fn open(&self, url: &str) -> Result<FrameStream, StreamError> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(StreamError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status));
        }

        debug!("Event stream opened with status {}", status);

        let frames = decode_frames(response.bytes_stream());

        Ok(FrameStream::new(Box::pin(frames), self.idle_timeout))
    }
}

// Tests.
