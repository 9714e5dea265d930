//! The HTTP transport shared by every download job.
//!
//! A thin wrapper over [`reqwest::Client`] that applies the configured
//! timeouts, signs requests through an optional [`AuthMethod`], follows
//! redirects manually (carrying caller headers and cookies across hops, up
//! to a configured cap), and on a single 401 resets the auth method and
//! retries exactly once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::{Client, Method, Response, StatusCode};
use snafu::{OptionExt, ResultExt};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthMethod;
use crate::error::{
    CancelledSnafu, MissingLocationSnafu, NetworkUnavailableSnafu, TooManyRedirectsSnafu,
    TransportError,
};

/// Extra headers a caller wants attached to a request (e.g. `Accept`).
pub type Headers = Vec<(String, String)>;

pub struct Transport {
    client: Client,
    auth: Option<Arc<dyn AuthMethod>>,
    max_redirects: u32,
}

impl Transport {
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        max_redirects: u32,
        auth: Option<Arc<dyn AuthMethod>>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            // Redirects are followed by hand below so that headers set on
            // the original request (notably Authorization) survive hops
            // that reqwest's own follow-redirect policy would otherwise
            // strip per RFC guidance.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|source| TransportError::NetworkUnavailable {
                url: "<client construction>".to_string(),
                source,
            })?;
        Ok(Transport {
            client,
            auth,
            max_redirects,
        })
    }

    /// Issues a GET request, following redirects and retrying once on a 401
    /// after resetting the auth method.
    pub async fn get(
        &self,
        url: &str,
        headers: &Headers,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        self.execute(Method::GET, url, headers, cancel, true).await
    }

    /// Issues a no-body POST request, with the same redirect-following and
    /// 401-retry behavior as [`Transport::get`].
    pub async fn post(
        &self,
        url: &str,
        headers: &Headers,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        self.execute(Method::POST, url, headers, cancel, true).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        cancel: &CancellationToken,
        allow_auth_retry: bool,
    ) -> Result<Response, TransportError> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            if cancel.is_cancelled() {
                return CancelledSnafu { url: url.to_string() }.fail();
            }

            let mut request = self.client.request(method.clone(), &current_url);
            for (k, v) in headers {
                request = request.header(k, v);
            }
            if let Some(auth) = &self.auth {
                if let Some(token) = auth.get_token().await {
                    request = request.bearer_auth(token);
                }
            }

            let send = request.send();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return CancelledSnafu { url: current_url }.fail();
                }
                result = send => result.with_context(|_| NetworkUnavailableSnafu {
                    url: current_url.clone(),
                })?,
            };

            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > self.max_redirects {
                    return TooManyRedirectsSnafu {
                        url: current_url,
                        max: self.max_redirects,
                    }
                    .fail();
                }
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .context(MissingLocationSnafu {
                        url: current_url.clone(),
                    })?;
                current_url = resolve_redirect(&current_url, location);
                continue;
            }

            if status == StatusCode::UNAUTHORIZED && allow_auth_retry && self.auth.is_some() {
                if let Some(auth) = &self.auth {
                    auth.reset_token().await;
                }
                return Box::pin(self.execute(method, url, headers, cancel, false)).await;
            }

            if !status.is_success() {
                return crate::error::HttpStatusSnafu {
                    url: current_url,
                    status,
                }
                .fail();
            }

            return Ok(response);
        }
    }
}

fn resolve_redirect(base: &str, location: &str) -> String {
    reqwest::Url::parse(base)
        .and_then(|b| b.join(location))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}

/// Adapts a [`Response`] into the byte stream the multipart reader and
/// rewriter consume.
pub fn byte_stream(response: Response) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
    response.bytes_stream()
}
