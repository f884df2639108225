//! Response sanitizing and the caller-facing result envelope.
//!
//! Building an envelope is a pure, single-pass transform of a
//! [`RawResponse`]: drop per-connection headers, decide once whether the body
//! is JSON, copy the timing and size figures.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, CONNECTION};
use serde::Serialize;
use serde_json::Value;

use crate::error::ForwardError;
use crate::executor::RawResponse;

/// Headers that only describe a single connection and are never relayed.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Upstream body: parsed JSON when possible, otherwise the raw text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Json(Value),
    Text(String),
}

impl ResponseData {
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => ResponseData::Json(value),
            Err(_) => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(v) => Some(v),
            ResponseData::Text(_) => None,
        }
    }
}

/// Successful forwarding result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub data: ResponseData,
    pub final_url: String,
    pub method: String,
    pub elapsed_ms: u64,
    pub size_bytes: usize,
}

/// Failed forwarding result. The HTTP status travels separately.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
}

impl From<&ForwardError> for ErrorEnvelope {
    fn from(e: &ForwardError) -> Self {
        Self {
            success: false,
            error: e.public_message(),
        }
    }
}

/// Turn a raw upstream response into the envelope returned to the caller.
pub fn build(raw: RawResponse) -> ResponseEnvelope {
    ResponseEnvelope {
        success: true,
        status_code: raw.status,
        headers: sanitize_headers(&raw.headers),
        data: ResponseData::from_body(&raw.body),
        final_url: raw.final_url.to_string(),
        method: raw.method.to_string(),
        elapsed_ms: raw.elapsed.as_millis() as u64,
        size_bytes: raw.body.len(),
    }
}

/// Flatten upstream headers, minus hop-by-hop ones.
///
/// Names listed in the upstream `Connection` header are per-connection too
/// and are dropped with the fixed set. Repeated fields are joined with `", "`.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let connection_listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if is_hop_by_hop(name) || connection_listed.iter().any(|c| c == name) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use bytes::Bytes;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;

    fn raw(headers: HeaderMap, body: &str) -> RawResponse {
        RawResponse {
            status: 200,
            headers,
            body: Bytes::from(body.to_string()),
            final_url: Url::parse("https://example.com/posts/1").unwrap(),
            method: HttpMethod::Get,
            elapsed: Duration::from_millis(42),
        }
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-session"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("upgrade", HeaderValue::from_static("h2c"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let clean = sanitize_headers(&headers);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.get("content-type").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let clean = sanitize_headers(&headers);
        assert_eq!(clean.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
    }

    #[test]
    fn json_body_becomes_json_data() {
        let env = build(raw(HeaderMap::new(), r#"{"id": 1, "title": "hello"}"#));
        assert_eq!(env.data, ResponseData::Json(json!({"id": 1, "title": "hello"})));
        assert_eq!(env.size_bytes, 27);
        assert_eq!(env.elapsed_ms, 42);
        assert_eq!(env.method, "GET");
        assert_eq!(env.final_url, "https://example.com/posts/1");
    }

    #[test]
    fn non_json_body_is_kept_as_text() {
        let env = build(raw(HeaderMap::new(), "<html>hi</html>"));
        assert_eq!(env.data, ResponseData::Text("<html>hi</html>".to_string()));
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let env = build(raw(HeaderMap::new(), "[1,2]"));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["finalUrl"], "https://example.com/posts/1");
        assert_eq!(value["elapsedMs"], 42);
        assert_eq!(value["sizeBytes"], 5);
        assert_eq!(value["data"], json!([1, 2]));
    }

    #[test]
    fn error_envelope_uses_public_message() {
        let env = ErrorEnvelope::from(&ForwardError::PolicyDenied("10.0.0.1".into()));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"success": false, "error": "URL not allowed"}));
    }
}
