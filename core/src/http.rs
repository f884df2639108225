//! Caller-facing request description for the guarded forwarder.
//!
//! # Design
//! `RequestSpec` is decoded from a loose JSON object with
//! [`RequestSpec::from_json`] instead of a derived `Deserialize`, because the
//! decoding rules are lenient in some places (case-insensitive method,
//! non-numeric timeouts fall back to the default) and strict in others
//! (unsupported methods, non-string headers). Every rejection is an
//! `InvalidInput` raised before any network action.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::error::ForwardError;

/// Lower bound for a caller-supplied timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Upper bound for a caller-supplied timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 20;

/// Timeout used when the caller does not supply a usable one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP method accepted by the forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Parse a method name case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ForwardError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ForwardError::InvalidInput(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only POST and PUT ever carry a request body.
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// An outbound request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub url: String,
    pub method: HttpMethod,
    /// Caller headers in the order supplied. Names are matched
    /// case-insensitively when merged with the defaults.
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub allow_redirects: bool,
    pub timeout: Duration,
}

impl RequestSpec {
    /// A bare GET with every optional field at its default.
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            query_params: Vec::new(),
            body: None,
            allow_redirects: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Decode a request description from a JSON object.
    ///
    /// `default_timeout` is used when `timeoutSeconds` is absent or not a
    /// number; it is clamped like any caller value.
    pub fn from_json(value: &Value, default_timeout: Duration) -> Result<Self, ForwardError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ForwardError::InvalidInput("URL is required".to_string()))?;

        let url = match obj.get("url") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(ForwardError::InvalidInput("URL is required".to_string()))
            }
            Some(_) => {
                return Err(ForwardError::InvalidInput(
                    "URL must be a string".to_string(),
                ))
            }
        };

        let method = match obj.get("method") {
            None | Some(Value::Null) => HttpMethod::Get,
            Some(Value::String(s)) => HttpMethod::parse(s)?,
            Some(other) => {
                return Err(ForwardError::InvalidInput(format!(
                    "Unsupported HTTP method: {other}"
                )))
            }
        };

        let headers = string_map(obj, "headers", |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })?;

        let params_key = if obj.contains_key("queryParams") {
            "queryParams"
        } else {
            "params"
        };
        let query_params = string_map(obj, params_key, scalar_to_string)?;

        let body = match obj.get("body") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        };

        let allow_redirects = match obj.get("allowRedirects") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                return Err(ForwardError::InvalidInput(
                    "allowRedirects must be a boolean".to_string(),
                ))
            }
        };

        let timeout = resolve_timeout(obj.get("timeoutSeconds"), default_timeout);

        Ok(Self {
            url,
            method,
            headers,
            query_params,
            body,
            allow_redirects,
            timeout,
        })
    }

    /// The URL with `query_params` appended to any existing query string.
    pub fn target_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.url)?;
        if !self.query_params.is_empty() && !url.cannot_be_a_base() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query_params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// The JSON body to send, if any. GET and DELETE never send one; POST and
    /// PUT send it only when it is non-empty.
    pub fn outbound_body(&self) -> Option<&Value> {
        if !self.method.allows_body() {
            return None;
        }
        self.body.as_ref().filter(|b| !is_empty_json(b))
    }
}

/// Clamp a caller timeout into `[MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS]`.
///
/// Non-numeric and missing values fall back to `default`, which is clamped
/// as well so the wait is never unbounded.
pub fn resolve_timeout(raw: Option<&Value>, default: Duration) -> Duration {
    let secs = match raw.and_then(Value::as_f64) {
        Some(n) if n.is_finite() => {
            if n <= 0.0 {
                MIN_TIMEOUT_SECS
            } else {
                (n.trunc() as u64).clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
            }
        }
        _ => default.as_secs().clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
    };
    Duration::from_secs(secs)
}

/// Empty in the sense of "nothing worth sending": null, false, zero and empty
/// strings, arrays and objects.
fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_map(
    obj: &Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<String>,
) -> Result<Vec<(String, String)>, ForwardError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                convert(v).map(|s| (k.clone(), s)).ok_or_else(|| {
                    ForwardError::InvalidInput(format!("{key}.{k} must be a string"))
                })
            })
            .collect(),
        Some(_) => Err(ForwardError::InvalidInput(format!(
            "{key} must be an object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFAULT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

    #[test]
    fn minimal_spec_uses_defaults() {
        let spec = RequestSpec::from_json(&json!({"url": "https://example.com"}), DEFAULT).unwrap();
        assert_eq!(spec.method, HttpMethod::Get);
        assert!(spec.allow_redirects);
        assert_eq!(spec.timeout, Duration::from_secs(10));
        assert!(spec.headers.is_empty());
        assert!(spec.body.is_none());
    }

    #[test]
    fn missing_url_is_invalid_input() {
        let err = RequestSpec::from_json(&json!({"method": "GET"}), DEFAULT).unwrap_err();
        assert!(matches!(err, ForwardError::InvalidInput(ref m) if m == "URL is required"));

        let err = RequestSpec::from_json(&json!("https://example.com"), DEFAULT).unwrap_err();
        assert!(matches!(err, ForwardError::InvalidInput(_)));
    }

    #[test]
    fn method_is_case_insensitive() {
        let spec =
            RequestSpec::from_json(&json!({"url": "http://a.example", "method": "post"}), DEFAULT)
                .unwrap();
        assert_eq!(spec.method, HttpMethod::Post);
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let err =
            RequestSpec::from_json(&json!({"url": "http://a.example", "method": "PATCH"}), DEFAULT)
                .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported HTTP method: PATCH");
    }

    #[test]
    fn timeout_is_clamped() {
        let cases = [
            (json!(0), 1),
            (json!(-5), 1),
            (json!(3), 3),
            (json!(2.9), 2),
            (json!(20), 20),
            (json!(600), 20),
            (json!("fast"), 10),
            (json!(null), 10),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                resolve_timeout(Some(&raw), DEFAULT),
                Duration::from_secs(expected),
                "timeoutSeconds = {raw}"
            );
        }
        assert_eq!(resolve_timeout(None, DEFAULT), Duration::from_secs(10));
        assert_eq!(
            resolve_timeout(None, Duration::from_secs(0)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn params_alias_and_scalar_values() {
        let spec = RequestSpec::from_json(
            &json!({"url": "http://a.example", "params": {"page": 2, "q": "cats", "all": true}}),
            DEFAULT,
        )
        .unwrap();
        let mut params = spec.query_params.clone();
        params.sort();
        assert_eq!(
            params,
            vec![
                ("all".to_string(), "true".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "cats".to_string()),
            ]
        );
    }

    #[test]
    fn query_params_are_appended() {
        let mut spec = RequestSpec::get("https://api.example.com/search?lang=en");
        spec.query_params = vec![("q".to_string(), "rust lang".to_string())];
        assert_eq!(
            spec.target_url().unwrap().as_str(),
            "https://api.example.com/search?lang=en&q=rust+lang"
        );
        assert!(RequestSpec::get("::nope").target_url().is_err());
    }

    #[test]
    fn non_string_header_is_rejected() {
        let err = RequestSpec::from_json(
            &json!({"url": "http://a.example", "headers": {"X-Count": 3}}),
            DEFAULT,
        )
        .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidInput(_)));
    }

    #[test]
    fn body_only_sent_for_post_and_put_when_non_empty() {
        let mut spec = RequestSpec::get("http://a.example");
        spec.body = Some(json!({"a": 1}));
        assert!(spec.outbound_body().is_none());

        spec.method = HttpMethod::Delete;
        assert!(spec.outbound_body().is_none());

        spec.method = HttpMethod::Post;
        assert_eq!(spec.outbound_body(), Some(&json!({"a": 1})));

        spec.method = HttpMethod::Put;
        for empty in [json!({}), json!([]), json!(""), json!(false), json!(0)] {
            spec.body = Some(empty);
            assert!(spec.outbound_body().is_none());
        }
    }
}
