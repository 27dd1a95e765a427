//! Translation of non-success HTTP responses into domain errors

use crate::error::ProductboardError;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Seconds to wait when a 429 carries no usable `retry-after`
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Consume a failed response and classify it
pub async fn error_from_response(response: reqwest::Response) -> ProductboardError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read error response body: {}", e);
            String::new()
        }
    };
    map_http_error(status, retry_after.as_deref(), &body)
}

/// Fixed status mapping: 400, 401, 403, 404, 429, 5xx, everything else generic
pub fn map_http_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> ProductboardError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(extract_message)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && parsed.is_none() && trimmed.len() <= 512).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    let error = match status.as_u16() {
        400 => ProductboardError::validation(message),
        401 => ProductboardError::authentication(message),
        403 => ProductboardError::authorization(message),
        404 => ProductboardError::not_found(message, parsed.as_ref().and_then(extract_resource)),
        429 => ProductboardError::rate_limit(message, parse_retry_after(retry_after)),
        code if code >= 500 => ProductboardError::server_error(message, code),
        code => ProductboardError::Generic {
            message,
            code: parsed
                .as_ref()
                .and_then(extract_code)
                .unwrap_or_else(|| format!("HTTP_{}", code)),
            status: code,
            details: None,
        },
    };

    match parsed {
        Some(details) => error.with_details(details),
        None => error,
    }
}

/// `message`, then `error.message` (or a string `error`), then `errors[0].detail`
fn extract_message(body: &Value) -> Option<String> {
    let candidates = [
        body.get("message"),
        body.get("error").and_then(|e| e.get("message")),
        body.get("error").filter(|e| e.is_string()),
        body.pointer("/errors/0/detail"),
        body.pointer("/errors/0/title"),
        body.pointer("/errors/0/message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
}

fn extract_resource(body: &Value) -> Option<String> {
    body.get("resource")
        .or_else(|| body.pointer("/error/resource"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn extract_code(body: &Value) -> Option<String> {
    body.get("code")
        .or_else(|| body.pointer("/error/code"))
        .or_else(|| body.pointer("/errors/0/code"))
        .and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Delta seconds or an HTTP date; anything unusable falls back to the default
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return DEFAULT_RETRY_AFTER_SECS;
    };
    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let remaining = date.with_timezone(&Utc) - Utc::now();
        return remaining.num_seconds().max(0) as u64;
    }
    DEFAULT_RETRY_AFTER_SECS
}
