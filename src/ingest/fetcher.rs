use std::time::Duration;
use reqwest::blocking::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Retrieves the raw markup of one listing page.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<String, TransportError>;
}

/// Blocking GET with a fixed browser-like user agent and a hard timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let request_error = |source| TransportError::Request { url: url.to_string(), source };

        let response = self.client.get(url).send().map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { url: url.to_string(), status: status.as_u16() });
        }
        response.text().map_err(request_error)
    }
}
