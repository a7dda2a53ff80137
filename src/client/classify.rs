//! Outcome Classification
//!
//! Maps raw HTTP status, headers and body of a failed attempt onto the
//! [`ClassifiedError`] taxonomy the gateway state machine switches on.

use crate::error::ClassifiedError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

const MAX_BODY_IN_ERROR: usize = 300;

/// Longest cooldown a provider hint may impose on a key
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(86_400);

/// Classify a non-success response
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ClassifiedError {
    let detail = format!("status {}: {}", status.as_u16(), truncate(body));

    if status == StatusCode::PAYMENT_REQUIRED || is_quota_body(body) {
        return ClassifiedError::Exhausted(detail);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_body(body) {
        return ClassifiedError::RateLimited {
            retry_after: retry_after(headers),
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ClassifiedError::Auth(detail);
    }

    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        return ClassifiedError::Unavailable(detail);
    }

    ClassifiedError::Fatal(detail)
}

/// Classify a transport-level failure
pub fn classify_transport(err: &reqwest::Error) -> ClassifiedError {
    if err.is_timeout() {
        ClassifiedError::Unavailable(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ClassifiedError::Unavailable(format!("connection failed: {}", err))
    } else if err.is_builder() {
        ClassifiedError::Fatal(format!("invalid request: {}", err))
    } else {
        ClassifiedError::Unavailable(err.to_string())
    }
}

/// Detect rate-limit wording some providers send with 400/403
pub fn is_rate_limit_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
}

/// Detect hard quota exhaustion of the account behind every key
pub fn is_quota_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("insufficient_quota")
        || lower.contains("quota exceeded")
        || lower.contains("exceeded your current quota")
        || lower.contains("billing")
}

/// Read a Retry-After style hint from response headers, capped at
/// [`MAX_RETRY_AFTER`]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-reset-requests", "x-ratelimit-reset-tokens"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|s| {
            s.trim()
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
                .or_else(|| parse_duration_string(s))
        })
        .map(|hint| hint.min(MAX_RETRY_AFTER))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Parse a duration string like "1m30s", "2h" or "500ms"
fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(stripped) = s.strip_suffix("ms") {
        return stripped.parse::<u64>().ok().map(Duration::from_millis);
    }

    // Compound form, e.g. "1m30s" or "2h30m"
    if s.contains('h') || (s.contains('m') && s.contains('s')) {
        let mut total_secs = 0u64;
        let mut current = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current.push(c);
            } else if !current.is_empty() {
                let n = current.parse::<u64>().ok()?;
                let secs = match c {
                    'h' => n.checked_mul(3600)?,
                    'm' => n.checked_mul(60)?,
                    's' => n,
                    _ => 0,
                };
                total_secs = total_secs.checked_add(secs)?;
                current.clear();
            }
        }

        if total_secs > 0 {
            return Some(Duration::from_secs(total_secs));
        }
    }

    if let Some(stripped) = s.strip_suffix('s') {
        let secs = stripped.parse::<f64>().ok()?;
        return Duration::try_from_secs_f64(secs).ok();
    }
    if let Some(stripped) = s.strip_suffix('m') {
        let mins = stripped.parse::<u64>().ok()?;
        return mins.checked_mul(60).map(Duration::from_secs);
    }

    None
}
