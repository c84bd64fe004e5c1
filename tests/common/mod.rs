//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mockall::mock;
use pepito_bot::{
    base::{
        config::{Config, ConfigInner},
        types::{ChannelSummary, Installation, Res, Void},
    },
    runtime::Runtime,
    service::{
        chat::{ChatClient, GenericChatClient},
        db::InstallationStore,
        image::ImageClient,
        stream::{EventStreamClient, FrameStream, GenericEventStreamClient, StreamError, sse::SseFrame},
    },
};

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn upload_image(&self, installation: &Installation, image: Vec<u8>, caption: &str) -> Void;
        async fn post_message(&self, installation: &Installation, text: &str) -> Void;
        async fn exchange_code(&self, code: &str) -> Res<Installation>;
        async fn list_channels(&self, installation: &Installation) -> Res<Vec<ChannelSummary>>;
    }
}

/// Stream client that plays back one scripted result per `open`.
///
/// Once the script runs out, every `open` fails with a 503.
#[derive(Default)]
pub struct ScriptedStreamClient {
    script: Mutex<VecDeque<Result<Vec<SseFrame>, StreamError>>>,
    opens: AtomicUsize,
}

impl ScriptedStreamClient {
    pub fn new(script: Vec<Result<Vec<SseFrame>, StreamError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenericEventStreamClient for ScriptedStreamClient {
    async fn open(&self, _url: &str) -> Result<FrameStream, StreamError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let frames = next.unwrap_or(Err(StreamError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)))?;

        Ok(FrameStream::new(Box::pin(futures::stream::iter(frames.into_iter().map(Ok))), None))
    }
}

/// Stream client whose streams stay open forever without producing anything.
pub struct PendingStreamClient;

#[async_trait]
impl GenericEventStreamClient for PendingStreamClient {
    async fn open(&self, _url: &str) -> Result<FrameStream, StreamError> {
        let frames = futures::stream::pending::<Result<SseFrame, StreamError>>();
        Ok(FrameStream::new(Box::pin(frames), None))
    }
}

// Helpers.

/// A frame carrying `data`.
pub fn frame(data: &str) -> SseFrame {
    SseFrame {
        data: data.to_string(),
        ..Default::default()
    }
}

/// A presence change payload pointing at `img`.
pub fn pepito_event(direction: &str, img: &str) -> String {
    serde_json::json!({"event": "pepito", "type": direction, "time": 1_700_000_000, "img": img}).to_string()
}

/// An SSE body made of one frame per payload.
pub fn sse_body(payloads: &[String]) -> String {
    payloads.iter().map(|payload| format!("data: {payload}\n\n")).collect()
}

/// A config suitable for tests: short timeouts, no reconnects.
pub fn test_config(events_url: &str) -> Config {
    Config::from(ConfigInner {
        slack_client_id: "123.456".to_string(),
        slack_client_secret: "shh".to_string(),
        events_url: events_url.to_string(),
        db_endpoint: "mem://".to_string(),
        connect_timeout_secs: 2,
        http_timeout_secs: 5,
        stream_idle_timeout_secs: 5,
        reconnect_base_delay_ms: 1,
        reconnect_max_delay_ms: 5,
        ..Default::default()
    })
}

/// Build a runtime around the given chat and stream clients, with an in-memory store.
pub async fn test_runtime(config: Config, chat: MockChat, stream: EventStreamClient) -> Runtime {
    let store = InstallationStore::surreal_memory().await.expect("Failed to create the store");
    let images = ImageClient::new(&config).expect("Failed to create the image client");

    Runtime {
        config,
        store,
        chat: ChatClient::new(Arc::new(chat)),
        stream,
        images,
    }
}

/// An installation with a channel.
pub fn installation(team_id: &str, channel_id: &str) -> Installation {
    Installation::new(team_id, format!("xoxb-{team_id}")).with_channel(channel_id)
}

/// Poll `condition` until it holds, failing after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    panic!("Timed out waiting for condition");
}
