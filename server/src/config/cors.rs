use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// The agent dashboard and the customer web app in development.
const DEV_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86400);

const METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// `configured` is the raw `CORS_ALLOWED_ORIGINS` value (comma separated).
pub fn create_cors_layer(configured: Option<&str>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(configured))
        .allow_methods(METHODS)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ACCEPT_LANGUAGE,
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE)
}

fn allowed_origins(configured: Option<&str>) -> AllowOrigin {
    let origins = parse_origins(configured.unwrap_or(DEV_ORIGINS));
    if origins.is_empty() {
        // Credentials rule out `*`; echo the caller's origin instead.
        tracing::warn!("CORS: no usable origin configured, mirroring request origin");
        return AllowOrigin::mirror_request();
    }
    tracing::info!(count = origins.len(), "CORS: allowed origins configured");
    AllowOrigin::list(origins)
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => {
                tracing::debug!(%origin, "CORS: allowing origin");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(%origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cors_layer() {
        let _layer = create_cors_layer(None);
        let _layer = create_cors_layer(Some("https://smartqueue.sn"));
    }

    #[test]
    fn test_dev_origins_are_valid() {
        assert_eq!(parse_origins(DEV_ORIGINS).len(), 2);
    }

    #[test]
    fn test_blank_and_invalid_origins_are_skipped() {
        let origins = parse_origins(" , https://a.sn ,\u{7f}bad, ");
        assert_eq!(origins, vec![HeaderValue::from_static("https://a.sn")]);
    }
}
