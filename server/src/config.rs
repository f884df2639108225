use std::time::Duration;

use clap::Parser;
use forwarder_core::executor::{ExecutorConfig, MAX_RESPONSE_BYTES};
use forwarder_core::http::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

use crate::generator::DEFAULT_MODEL;
use crate::rate_limit::RateLimiterConfig;

/// Command-line and environment configuration for the explorer service.
#[derive(Parser, Debug, Clone)]
#[command(name = "api-explorer", version, about = "Catalog browser and guarded API test console")]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "EXPLORER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "EXPLORER_PORT", default_value_t = 5001)]
    pub port: u16,

    /// Default outbound timeout in seconds when a request names none.
    #[arg(long, env = "EXPLORER_REQUEST_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Largest upstream body relayed to callers, in bytes.
    #[arg(long, env = "EXPLORER_MAX_RESPONSE_BYTES", default_value_t = MAX_RESPONSE_BYTES)]
    pub max_response_bytes: usize,

    #[arg(long, env = "EXPLORER_RATE_LIMIT_RPS", default_value_t = 5)]
    pub rate_limit_rps: u32,

    #[arg(long, env = "EXPLORER_RATE_LIMIT_BURST", default_value_t = 20)]
    pub rate_limit_burst: u32,

    /// Enables /api/codegen and /api/summarize when set.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub gemini_model: String,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured default, kept inside the per-request bounds.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout
                .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
        )
    }

    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_response_bytes: self.max_response_bytes,
            ..ExecutorConfig::default()
        }
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            rps: self.rate_limit_rps,
            burst: self.rate_limit_burst,
            ..RateLimiterConfig::default()
        }
    }

    /// Blank keys count as unset.
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
