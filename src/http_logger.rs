//! HTTP Request Logger
//!
//! Logs all upload protocol requests to a file when enabled via environment variable.
//! Set `GPHOTOS_HTTP_LOG=1` or `GPHOTOS_HTTP_LOG=true` to enable.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::warn;

use crate::transport::HttpRequest;

/// Environment variable to control HTTP logging
const ENV_HTTP_LOG: &str = "GPHOTOS_HTTP_LOG";

/// Maximum body size to log (10KB)
const MAX_BODY_SIZE: usize = 10000;

/// Sensitive headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "set-cookie",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
    // Session URLs grant upload access on their own
    "x-goog-upload-url",
];

/// Global mutex for thread-safe log writing
static LOG_MUTEX: Mutex<()> = Mutex::new(());

/// Check if HTTP logging is enabled
pub fn is_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_HTTP_LOG)
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
    })
}

/// Interpret an on/off environment value
pub fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}

/// HTTP request log entry
pub struct HttpRequestLog {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// HTTP response log entry
pub struct HttpResponseLog {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Log an HTTP request and response
pub fn log_request(
    log_path: &Path,
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let content = format_entry(request, response, duration_ms, error);
    if let Err(e) = write_log(log_path, &content) {
        warn!("Failed to write HTTP log: {}", e);
    }
}

/// Render one request/response exchange
pub fn format_entry(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let separator = "=".repeat(80);

    let mut log_content = String::new();
    log_content.push_str(&format!(
        "\n{}\n[{}] {} {}\n{}\n",
        separator, timestamp, request.method, request.url, separator
    ));

    log_content.push_str("\n--- Request Headers ---\n");
    for (name, value) in &request.headers {
        let display_value = mask_sensitive_header(name, value);
        log_content.push_str(&format!("{}: {}\n", name, display_value));
    }

    if let Some(body) = &request.body {
        log_content.push_str("\n--- Request Body ---\n");
        log_content.push_str(&truncate_utf8_safe(body, MAX_BODY_SIZE));
        log_content.push('\n');
    }

    if let Some(resp) = response {
        log_content.push_str(&format!("\n--- Response ({}ms) ---\n", duration_ms));
        log_content.push_str(&format!("Status: {}\n", resp.status));

        log_content.push_str("\n--- Response Headers ---\n");
        for (name, value) in &resp.headers {
            let display_value = mask_sensitive_header(name, value);
            log_content.push_str(&format!("{}: {}\n", name, display_value));
        }

        if let Some(body) = &resp.body {
            log_content.push_str("\n--- Response Body ---\n");
            log_content.push_str(&truncate_utf8_safe(body, MAX_BODY_SIZE));
            log_content.push('\n');
        }
    }

    if let Some(err) = error {
        log_content.push_str(&format!("\n--- Error ({}ms) ---\n", duration_ms));
        log_content.push_str(err);
        log_content.push('\n');
    }

    log_content.push_str(&format!("\n{}\n", separator));
    log_content
}

/// Write log content to file (thread-safe)
fn write_log(path: &Path, content: &str) -> std::io::Result<()> {
    // Acquire lock to prevent interleaved writes from concurrent uploads
    let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Check if a header is sensitive and should be masked
pub fn is_sensitive_header(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    SENSITIVE_HEADERS.iter().any(|h| name_lower == *h)
}

/// Mask sensitive header values
fn mask_sensitive_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        mask_token(value)
    } else {
        value.to_string()
    }
}

/// Mask authorization token for security
pub fn mask_token(value: &str) -> String {
    let (prefix, token) = match value.strip_prefix("Bearer ") {
        Some(token) => ("Bearer ", token),
        None => ("", value),
    };

    // Count chars, not bytes, so multi-byte tokens never split
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}...{}", prefix, head, tail)
    } else {
        format!("{}****", prefix)
    }
}

/// Mask the query string of a URL; session ids travel there
pub fn mask_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, query)) => format!("{}?{}", base, mask_token(query)),
        None => url.to_string(),
    }
}

/// Truncate string at UTF-8 character boundary (safe for multi-byte chars)
pub fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...\n[truncated, total {} bytes]", &s[..end], s.len())
}

/// Build a request log entry, or None when logging is disabled
pub fn build_request_log_if_enabled(
    request: &HttpRequest,
    authenticated: bool,
) -> Option<HttpRequestLog> {
    if !is_enabled() {
        return None;
    }
    Some(build_request_log(request, authenticated))
}

/// Build a request log entry; media payloads are summarized, never dumped
pub fn build_request_log(request: &HttpRequest, authenticated: bool) -> HttpRequestLog {
    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    if authenticated {
        headers.push(("Authorization".to_string(), "Bearer <redacted>".to_string()));
    }

    let body = if request.body.is_empty() {
        None
    } else {
        Some(format!("<{} bytes of media>", request.body.len()))
    };

    HttpRequestLog {
        method: "POST".to_string(),
        url: mask_url(&request.url),
        headers,
        body,
    }
}

/// Build a response log entry. A 2xx body is an upload token and gets masked;
/// error bodies are kept for diagnosis.
pub fn build_response_log(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> HttpResponseLog {
    let text = String::from_utf8_lossy(body);
    let body = if body.is_empty() {
        None
    } else if status.is_success() {
        Some(mask_token(text.trim()))
    } else {
        Some(text.into_owned())
    };

    HttpResponseLog {
        status: status.as_u16(),
        headers: header_pairs(headers),
        body,
    }
}

/// Flatten a header map for logging
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}
