use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Incoming id when the caller sent a usable one, otherwise a fresh UUID v4
pub fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tags the `http_request` span with the request id and echoes it back, so
/// log lines and error responses can be matched up by the caller.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let id = resolve_request_id(request.headers());
    tracing::Span::current().record("request_id", id.as_str());

    let mut response = next.run(request).await;
    match HeaderValue::from_str(&id) {
        Ok(value) => {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Err(_) => tracing::debug!("Request id {:?} is not a valid header value", id),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuses_incoming_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("  trace-42 "));
        assert_eq!(resolve_request_id(&headers), "trace-42");
    }

    #[test]
    fn test_blank_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("   "));
        let id = resolve_request_id(&headers);
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(Uuid::parse_str(&resolve_request_id(&HeaderMap::new())).is_ok());
    }
}
