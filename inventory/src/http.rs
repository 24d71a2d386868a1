use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::warn;

use crate::Error;

/// A streamed HTTP response.
pub struct HttpResponse {
    pub status: u16,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

/// Minimal GET client seam. The production implementation wraps reqwest;
/// tests serve canned payloads.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, Error>;
}

/// [HttpClient] backed by a shared [reqwest::Client].
#[derive(Default, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, Error> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let status = response.status().as_u16();
        let body = StreamReader::new(response.bytes_stream().map_err(|e| {
            let e = e.without_url();
            warn!(%e, "failed to read response body");
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)
        }));

        Ok(HttpResponse {
            status,
            body: Box::new(body),
        })
    }
}
