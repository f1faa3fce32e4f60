use futures::{future::BoxFuture, FutureExt};
use log::debug;

use super::{MediaBuffer, MediaSource, PlayerError};

/// Downloads a media resource. The returned future is dropped when the load is cancelled, so
/// implementations must not keep work running past that point.
pub trait MediaFetcher: Send + Sync + 'static {
    fn fetch(&self, source: MediaSource) -> BoxFuture<'static, Result<MediaBuffer, PlayerError>>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, source: MediaSource) -> BoxFuture<'static, Result<MediaBuffer, PlayerError>> {
        let client = self.client.clone();
        async move {
            debug!("Fetching media from {source}");
            let response = client
                .get(source.as_str())
                .send()
                .await
                .map_err(|err| PlayerError::LoadFailure(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PlayerError::LoadFailure(format!(
                    "{source} responded with {status}"
                )));
            }

            let data = response
                .bytes()
                .await
                .map_err(|err| PlayerError::LoadFailure(err.to_string()))?;
            debug!("Fetched {} bytes from {source}", data.len());
            Ok(MediaBuffer::new(source, data.to_vec()))
        }
        .boxed()
    }
}
