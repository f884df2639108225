//! Bounded execution of a validated request.
//!
//! # Design
//! The whole call (every redirect hop and the body read) runs under a single
//! `tokio::time::timeout`, so a slow-drip upstream cannot hold a request past
//! its deadline. Redirects are followed here rather than by reqwest: each
//! target is checked against the [`DestinationPolicy`] and the connection is
//! pinned to the addresses that were checked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
    COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION, USER_AGENT,
};
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::envelope::is_hop_by_hop;
use crate::error::{ForwardError, MIB};
use crate::http::{HttpMethod, RequestSpec};
use crate::policy::{Destination, DestinationPolicy, DestinationVerdict};

/// Largest upstream body returned to the caller.
pub const MAX_RESPONSE_BYTES: usize = MIB;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str = "Developer-API-Explorer/1.0";

/// Limits applied to every outbound call.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_response_bytes: usize,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: MAX_RESPONSE_BYTES,
            max_redirects: MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Upstream response as received, before sanitizing.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub final_url: Url,
    /// Method the caller asked for.
    pub method: HttpMethod,
    pub elapsed: Duration,
}

/// Performs outbound calls for already-validated requests.
pub struct Executor {
    config: ExecutorConfig,
    policy: Arc<dyn DestinationPolicy>,
}

impl Executor {
    /// `policy` re-checks redirect targets.
    pub fn new(config: ExecutorConfig, policy: Arc<dyn DestinationPolicy>) -> Self {
        Self { config, policy }
    }

    /// Send `spec` to `url`, connecting only to `destination`'s addresses.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        url: Url,
        destination: Destination,
    ) -> Result<RawResponse, ForwardError> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(spec.timeout, self.run(spec, url, destination)).await;
        let elapsed = started.elapsed();
        match outcome {
            Ok(Ok(mut raw)) => {
                raw.elapsed = elapsed;
                Ok(raw)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!(timeout_secs = spec.timeout.as_secs(), "outbound call hit its deadline");
                Err(ForwardError::Timeout)
            }
        }
    }

    async fn run(
        &self,
        spec: &RequestSpec,
        mut url: Url,
        mut destination: Destination,
    ) -> Result<RawResponse, ForwardError> {
        let mut headers = self.merged_headers(spec)?;
        let mut method: Method = spec.method.into();
        let mut body = match spec.outbound_body() {
            Some(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| ForwardError::Unexpected(format!("Invalid body: {e}")))?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(Bytes::from(bytes))
            }
            None => None,
        };

        let mut hops = 0;
        loop {
            let client = pinned_client(&destination)?;
            let mut request = client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            let response = request.send().await?;
            let status = response.status();

            let next = if spec.allow_redirects {
                redirect_target(&url, status, response.headers())
            } else {
                None
            };
            let Some(next) = next else {
                let headers = response.headers().clone();
                let body = self.read_body(response).await?;
                debug!(status = status.as_u16(), bytes = body.len(), hops, "upstream responded");
                return Ok(RawResponse {
                    status: status.as_u16(),
                    headers,
                    body,
                    final_url: url,
                    method: spec.method,
                    elapsed: Duration::ZERO,
                });
            };

            hops += 1;
            if hops > self.config.max_redirects {
                return Err(ForwardError::Unexpected(format!(
                    "Exceeded {} redirects",
                    self.config.max_redirects
                )));
            }
            destination = match self.policy.check(&next).await {
                DestinationVerdict::Allowed(d) => d,
                DestinationVerdict::Denied(reason) => {
                    return Err(ForwardError::PolicyDenied(format!(
                        "redirect to {next}: {reason}"
                    )))
                }
            };

            if matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) && method != Method::GET
            {
                method = Method::GET;
                body = None;
                headers.remove(CONTENT_TYPE);
            }
            if url.origin() != next.origin() {
                headers.remove(AUTHORIZATION);
                headers.remove(COOKIE);
                headers.remove(PROXY_AUTHORIZATION);
            }
            debug!(status = status.as_u16(), to = %next, hops, "following redirect");
            url = next;
        }
    }

    /// Defaults first, caller headers on top. Headers that would corrupt the
    /// framing of the outbound message are dropped.
    fn merged_headers(&self, spec: &RequestSpec) -> Result<HeaderMap, ForwardError> {
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&self.config.user_agent)
            .map_err(|_| ForwardError::Unexpected("Invalid default User-Agent".to_string()))?;
        headers.insert(USER_AGENT, agent);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in &spec.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ForwardError::InvalidInput(format!("Invalid header name: {name}")))?;
            if is_hop_by_hop(header.as_str()) || header == HOST || header == CONTENT_LENGTH {
                debug!(header = %header, "dropping caller header");
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|_| {
                ForwardError::InvalidInput(format!("Invalid value for header {name}"))
            })?;
            headers.insert(header, value);
        }
        Ok(headers)
    }

    /// Read the full body, failing as soon as it crosses the ceiling.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Bytes, ForwardError> {
        let limit = self.config.max_response_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(ForwardError::PayloadTooLarge { limit });
            }
        }
        let mut buf = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if buf.len() + chunk.len() > limit {
                return Err(ForwardError::PayloadTooLarge { limit });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// A client that connects to `destination`'s checked addresses only.
fn pinned_client(destination: &Destination) -> Result<reqwest::Client, ForwardError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy();
    if !destination.is_ip_literal() {
        builder = builder.resolve_to_addrs(&destination.host, &destination.addrs);
    }
    builder
        .build()
        .map_err(|e| ForwardError::Unexpected(format!("HTTP client: {e}")))
}

/// Absolute URL of the next hop when `status` is a followable redirect.
fn redirect_target(current: &Url, status: StatusCode, headers: &HeaderMap) -> Option<Url> {
    if !matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return None;
    }
    let location = headers.get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}
