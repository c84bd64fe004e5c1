//! Runtime services and shared state for the pepito-bot.

use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    frontend::{self, FrontendState},
    interaction::supervisor::Supervisor,
    service::{chat::ChatClient, db::InstallationStore, image::ImageClient, stream::EventStreamClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the installation store, the chat, stream and image
/// clients, and configuration.  It is designed to be trivially cloneable,
/// allowing it to be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The installation store instance.
    pub store: InstallationStore,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The upstream event stream client instance.
    pub stream: EventStreamClient,
    /// The image download client instance.
    pub images: ImageClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the installation store.
        let store = InstallationStore::surreal(&config).await?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config)?;

        // Initialize the upstream clients.
        let stream = EventStreamClient::sse(&config)?;
        let images = ImageClient::new(&config)?;

        Ok(Self { config, store, chat, stream, images })
    }

    /// Launch sessions for the existing installations, serve the installation
    /// front end, and launch a session for every newly completed installation.
    ///
    /// Runs until Ctrl-C, or until the front end fails.
    pub async fn start(&self) -> Void {
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();

        // Start sessions for everything that is already configured.

        let mut supervisor = Supervisor::new(self.clone());
        supervisor.launch_existing().await?;

        // Start the front end.

        let listener = TcpListener::bind(&self.config.listen_address).await?;
        info!("Installation front end listening on {}", listener.local_addr()?);

        let state = FrontendState::new(self, ready_tx);
        let mut server = tokio::spawn(frontend::serve(listener, state));

        // Launch a session every time an installation selects its channel.

        let result = loop {
            tokio::select! {
                Some(installation) = ready_rx.recv() => {
                    supervisor.launch(installation);
                }
                result = &mut server => {
                    break match result {
                        Ok(Ok(())) => Err(anyhow::anyhow!("The installation front end stopped unexpectedly.")),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(e.into()),
                    };
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down ...");
                    break Ok(());
                }
            }
        };

        supervisor.shutdown();
        server.abort();

        result
    }
}
