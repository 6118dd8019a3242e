//! Admin console origin client

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName};
use http::{Method, Response};
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::ProxyError;

/// Origin client configuration
#[derive(Clone, Debug)]
pub struct OriginClientConfig {
    /// Base URL of the admin console origin
    pub url: String,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

/// HTTP client for the admin console origin
pub struct OriginClient {
    origin: Url,
    client: Client,
}

impl OriginClient {
    /// Create a new origin client
    pub fn new(config: OriginClientConfig) -> Result<Self, ProxyError> {
        let origin = Url::parse(&config.url)
            .map_err(|e| ProxyError::InvalidUrl(format!("{}: {}", config.url, e)))?;

        // Redirects belong to the caller, along with any cookies they set
        let mut builder = Client::builder().redirect(redirect::Policy::none());

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;

        info!("Created origin client for {}", origin);

        Ok(Self { origin, client })
    }

    /// Base URL of the origin
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Issue a request and buffer the full response.
    ///
    /// Any status the origin answers with is returned as a response; only
    /// transport failures are errors.
    pub async fn fetch(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Bytes>, ProxyError> {
        debug!("Fetching {} {}", method, url);

        let mut forwarded = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            if name == header::HOST || is_hop_by_hop(name) {
                continue;
            }
            forwarded.append(name.clone(), value.clone());
        }

        let mut request = self.client.request(method, url.clone()).headers(forwarded);
        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream = request.send().await?;
        let status = upstream.status();
        let mut response_headers = HeaderMap::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            // The body is fully buffered and re-framed on the way out
            if name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
                continue;
            }
            response_headers.append(name.clone(), value.clone());
        }

        let body = upstream.bytes().await?;
        debug!("Fetched {} -> {} ({} bytes)", url, status, body.len());

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    /// GET a URL with no extra headers
    pub async fn get(&self, url: &Url) -> Result<Response<Bytes>, ProxyError> {
        self.fetch(Method::GET, url, &HeaderMap::new(), Bytes::new())
            .await
    }

    /// Check if the origin is reachable
    pub async fn ping(&self) -> Result<bool, ProxyError> {
        let response = self.get(&self.origin).await?;
        Ok(!response.status().is_server_error())
    }
}

/// Headers that apply to a single connection and must not be forwarded
fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name == header::TE
        || name == header::TRAILER
        || name == header::PROXY_AUTHORIZATION
        || name == header::PROXY_AUTHENTICATE
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}
