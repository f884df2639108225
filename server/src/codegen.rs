//! Prompts for the generation endpoints and best-effort parsing of the
//! model's free-form answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest slice of a response body quoted in a summary prompt, in chars.
pub const SUMMARY_DATA_LIMIT: usize = 8000;

#[derive(Debug, Clone, Deserialize)]
pub struct CodegenRequest {
    pub api_name: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub headers: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    pub api_name: Option<String>,
    pub status_code: Option<u16>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSamples {
    pub python_code: String,
    pub javascript_code: String,
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn pretty_or_none(value: &Value) -> String {
    if is_blank(value) {
        return "None".to_string();
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn codegen_prompt(
    api_name: &str,
    endpoint: &str,
    method: &str,
    params: &Value,
    headers: &Value,
) -> String {
    format!(
        "\nGenerate clean, production-ready code examples for calling the {api_name} API.\n\
         \n\
         API Details:\n\
         - Endpoint: {endpoint}\n\
         - Method: {method}\n\
         - Parameters: {params}\n\
         - Headers: {headers}\n\
         \n\
         Please provide:\n\
         1. Python code using the requests library\n\
         2. JavaScript code using fetch API\n\
         \n\
         Requirements:\n\
         - Include proper error handling\n\
         - Add comments explaining each step\n\
         - Use modern best practices\n\
         - Make the code copy-paste ready\n\
         - Include example usage\n\
         \n\
         Format the response as JSON with 'python_code' and 'javascript_code' fields.\n",
        params = pretty_or_none(params),
        headers = pretty_or_none(headers),
    )
}

pub fn summary_prompt(api_name: Option<&str>, status_code: Option<u16>, data: &Value) -> String {
    let rendered = match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    let quoted: String = rendered.chars().take(SUMMARY_DATA_LIMIT).collect();
    let truncated = if quoted.len() < rendered.len() {
        "\n(The response was truncated.)"
    } else {
        ""
    };
    let subject = api_name.unwrap_or("an HTTP API");
    let status = status_code
        .map(|s| format!(" with HTTP status {s}"))
        .unwrap_or_default();

    format!(
        "Summarize the following response from {subject}{status} for a developer \
         exploring the API. Use two or three plain sentences: what the data \
         represents, its overall shape, and any fields worth noticing.\n\
         \n\
         Response:\n{quoted}{truncated}\n"
    )
}

/// Lines between the first pair of fence markers (lines starting with
/// three backticks), joined with newlines. `None` when nothing is fenced.
pub fn extract_code_block(text: &str) -> Option<String> {
    let mut in_block = false;
    let mut lines = Vec::new();
    for line in text.split('\n') {
        if line.trim().starts_with("```") {
            in_block = !in_block;
            continue;
        }
        if in_block {
            lines.push(line);
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Strip a fence wrapping the whole answer, keeping its inner text.
fn strip_outer_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = rest.strip_suffix("```")?;
    let (_, inner) = rest.split_once('\n')?;
    Some(inner.trim())
}

/// Pull Python and JavaScript samples out of a model answer.
pub fn parse_code_response(text: &str) -> CodeSamples {
    let trimmed = text.trim();
    let candidate = match strip_outer_fence(trimmed) {
        Some(inner) if inner.starts_with('{') => inner,
        _ => trimmed,
    };

    if candidate.starts_with('{') {
        return match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                let field = |name: &str| match value.get(name) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                CodeSamples {
                    python_code: field("python_code"),
                    javascript_code: field("javascript_code"),
                }
            }
            Err(_) => CodeSamples {
                python_code: text.to_string(),
                javascript_code: text.to_string(),
            },
        };
    }

    let (python_part, js_part) = match text.split_once("JavaScript") {
        Some((python, js)) => (python.replace("Python", ""), js.trim().to_string()),
        None => (text.replace("Python", ""), String::new()),
    };
    let python_part = python_part.trim();
    CodeSamples {
        python_code: extract_code_block(python_part).unwrap_or_else(|| python_part.to_string()),
        javascript_code: extract_code_block(&js_part).unwrap_or(js_part),
    }
}
