//! The guarded forwarder: validate, execute, sanitize.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::envelope::{self, ResponseEnvelope};
use crate::error::ForwardError;
use crate::executor::{Executor, ExecutorConfig, RawResponse};
use crate::http::RequestSpec;
use crate::policy::{DestinationPolicy, DestinationVerdict};

/// Runs caller requests through the destination policy and the bounded
/// executor. Holds no per-request state; share it behind an `Arc`.
pub struct Forwarder {
    policy: Arc<dyn DestinationPolicy>,
    executor: Executor,
    default_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        policy: Arc<dyn DestinationPolicy>,
        config: ExecutorConfig,
        default_timeout: Duration,
    ) -> Self {
        Self {
            executor: Executor::new(config, Arc::clone(&policy)),
            policy,
            default_timeout,
        }
    }

    /// Decode a JSON request description and forward it.
    pub async fn forward_json(&self, value: &Value) -> Result<ResponseEnvelope, ForwardError> {
        let spec = RequestSpec::from_json(value, self.default_timeout)?;
        self.forward(&spec).await
    }

    /// Validate and execute `spec`. Destination checks (DNS included) and
    /// the outbound call share the one `spec.timeout` deadline.
    pub async fn forward(&self, spec: &RequestSpec) -> Result<ResponseEnvelope, ForwardError> {
        let url = spec
            .target_url()
            .map_err(|e| ForwardError::PolicyDenied(format!("unparseable URL: {e}")))?;

        let outcome = tokio::time::timeout(spec.timeout, self.check_and_execute(spec, url))
            .await
            .unwrap_or(Err(ForwardError::Timeout));

        match outcome {
            Ok(raw) => {
                let envelope = envelope::build(raw);
                info!(
                    method = %spec.method,
                    url = %spec.url,
                    status = envelope.status_code,
                    elapsed_ms = envelope.elapsed_ms,
                    size_bytes = envelope.size_bytes,
                    "outbound request completed"
                );
                Ok(envelope)
            }
            Err(e) => {
                warn!(
                    method = %spec.method,
                    url = %spec.url,
                    kind = e.kind(),
                    error = %e,
                    "outbound request failed"
                );
                Err(e)
            }
        }
    }

    async fn check_and_execute(
        &self,
        spec: &RequestSpec,
        url: Url,
    ) -> Result<RawResponse, ForwardError> {
        let destination = match self.policy.check(&url).await {
            DestinationVerdict::Allowed(d) => d,
            DestinationVerdict::Denied(reason) => {
                debug!(url = %spec.url, reason = %reason, "denied by destination policy");
                return Err(ForwardError::PolicyDenied(reason));
            }
        };
        self.executor.execute(spec, url, destination).await
    }
}
