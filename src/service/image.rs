//! Downloads of the images attached to upstream events.

use tracing::instrument;

use crate::base::{config::Config, types::Res};

/// Plain HTTP image fetcher.
///
/// In contrast to the other services, it does not expose a generic trait interface.
/// It is trivially cloneable.
#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
}

impl ImageClient {
    /// Creates a new image client, bounded by the configured timeouts.
    pub fn new(config: &Config) -> Res<Self> {
        let http = reqwest::Client::builder().connect_timeout(config.connect_timeout()).timeout(config.http_timeout()).build()?;

        Ok(Self { http })
    }

    /// Download the image at `url`.
    ///
    /// Any non-2xx status is an error.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Res<Vec<u8>> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Image download returned status {}.", status));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
