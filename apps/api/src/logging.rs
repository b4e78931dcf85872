use axum::{
    body::Body,
    extract::Request,
    http::{header, Method},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Request bodies larger than this are never echoed into the log.
const MAX_LOGGED_BODY: usize = 16 * 1024;

const REDACTED_FIELDS: [&str; 2] = ["password", "token"];

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("studio_api=info,tower_http=warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub async fn request_logger(mut request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // media bytes served straight from disk are too chatty to log
    let is_media = path.starts_with("/media/");
    let payload = extract_json_payload(&mut request).await;

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    if is_media && status < 400 {
        return response;
    }

    let log_line = format!(
        "{} {} {} {:05.2}ms {}",
        method,
        path,
        status,
        duration_ms,
        payload.unwrap_or_else(|| "{}".to_string())
    );

    match status {
        200..=399 => info!("{}", log_line),
        400..=499 => warn!("{}", log_line),
        500..=599 => error!("{}", log_line),
        _ => info!("{}", log_line),
    }

    response
}

fn is_small_json(request: &Request<Body>) -> bool {
    if !matches!(*request.method(), Method::POST | Method::PUT) {
        return false;
    }
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    let length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    is_json && matches!(length, Some(n) if n <= MAX_LOGGED_BODY)
}

/// Compact JSON body with secrets masked. Uploads and other binary bodies are left untouched.
async fn extract_json_payload(request: &mut Request<Body>) -> Option<String> {
    if !is_small_json(request) {
        return None;
    }

    let body = std::mem::replace(request.body_mut(), Body::empty());
    let bytes = match axum::body::to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(b) => b,
        Err(_) => return None,
    };

    let compact = serde_json::from_slice::<Value>(&bytes).ok().map(|mut value| {
        redact(&mut value);
        value.to_string()
    });

    *request.body_mut() = Body::from(bytes);
    compact
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_FIELDS.contains(&key.as_str()) {
                    *field = Value::String("***".to_string());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

pub fn log_panic(info: &std::panic::PanicHookInfo) {
    let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    };

    let location = info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "unknown location".to_string());

    error!("PANIC at {}: {}", location, payload);
}

pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log_panic(info);
        default_hook(info);
    }));
}
