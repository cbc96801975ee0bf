//! Access log in Apache combined format.
//!
//! One line per completed request under the `http_access` target:
//!
//! ```text
//! 127.0.0.1 - - [10/Oct/2026:13:55:36 +0000] "GET /api/health HTTP/1.1" 200 52 "-" "curl/8.0"
//! ```

use std::fmt::Write as _;

use axum::http::Version;

use crate::http::middleware::completion::{CompletionListener, RequestCompletion};

pub const ACCESS_LOG_TARGET: &str = "http_access";

const CLF_DATE: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Writes one combined-format line per request.
#[derive(Debug, Default)]
pub struct AccessLogListener;

impl CompletionListener for AccessLogListener {
    fn on_complete(&self, event: &RequestCompletion) {
        let line = format_combined(event);
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            request_id = event.request_id.as_deref().unwrap_or("-"),
            duration_ms = event.elapsed.as_secs_f64() * 1000.0,
            "{}",
            line
        );
    }
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

/// Render `event` as a combined log format line.
pub fn format_combined(event: &RequestCompletion) -> String {
    let mut line = String::with_capacity(128);
    let client = event
        .client
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "-".to_string());
    let bytes = if event.body_bytes == 0 {
        "-".to_string()
    } else {
        event.body_bytes.to_string()
    };

    // Writing into a String cannot fail.
    let _ = write!(
        line,
        "{} - - [{}] \"{} {} HTTP/{}\" {} {} \"{}\" \"{}\"",
        client,
        event.started_at.format(CLF_DATE),
        event.method,
        event.path,
        http_version(event.version),
        event.status.as_u16(),
        bytes,
        quoted(event.referrer.as_deref()),
        quoted(event.user_agent.as_deref()),
    );
    line
}

fn quoted(value: Option<&str>) -> String {
    match value {
        Some(v) => v.replace('"', "\\\""),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use chrono::TimeZone;
    use std::time::Duration;

    fn event() -> RequestCompletion {
        RequestCompletion {
            method: Method::GET,
            path: "/api/health?probe=1".into(),
            route: "/api/health".into(),
            status: StatusCode::OK,
            version: Version::HTTP_11,
            elapsed: Duration::from_millis(4),
            started_at: chrono::Utc.with_ymd_and_hms(2026, 10, 10, 13, 55, 36).unwrap(),
            body_bytes: 52,
            client: Some("127.0.0.1".parse().unwrap()),
            referrer: None,
            user_agent: Some("curl/8.0".into()),
            request_id: Some("abc".into()),
        }
    }

    #[test]
    fn combined_format() {
        assert_eq!(
            format_combined(&event()),
            "127.0.0.1 - - [10/Oct/2026:13:55:36 +0000] \"GET /api/health?probe=1 HTTP/1.1\" 200 52 \"-\" \"curl/8.0\""
        );
    }

    #[test]
    fn missing_fields_render_as_dash() {
        let mut e = event();
        e.client = None;
        e.body_bytes = 0;
        e.user_agent = None;
        e.status = StatusCode::NOT_FOUND;
        assert_eq!(
            format_combined(&e),
            "- - - [10/Oct/2026:13:55:36 +0000] \"GET /api/health?probe=1 HTTP/1.1\" 404 - \"-\" \"-\""
        );
    }

    #[test]
    fn quotes_in_agent_are_escaped() {
        let mut e = event();
        e.user_agent = Some("evil\"agent".into());
        assert!(format_combined(&e).ends_with("\"evil\\\"agent\""));
    }
}
