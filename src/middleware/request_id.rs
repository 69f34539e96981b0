use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// HTTP header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation id, stored in request extensions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Reuses a well-formed incoming id, otherwise mints a fresh v4
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(RequestId)
            .unwrap_or_else(|| RequestId(Uuid::new_v4()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tags the request with a `RequestId` and echoes it in the response header
///
/// Runs outside the trace layer so the span built by
/// `make_span_with_request_id` can see the id.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::from_headers(request.headers());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Span for `TraceLayer` carrying method, path and request id
pub fn make_span_with_request_id(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderName, middleware, routing::get, Extension, Router};
    use axum_test::TestServer;

    fn server() -> TestServer {
        let app = Router::new()
            .route(
                "/",
                get(|Extension(id): Extension<RequestId>| async move { id.to_string() }),
            )
            .layer(middleware::from_fn(request_id_middleware));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_generates_id_when_missing() {
        let response = server().get("/").await;

        let header = response.header(REQUEST_ID_HEADER);
        let header = header.to_str().unwrap();
        assert!(Uuid::parse_str(header).is_ok());
        assert_eq!(response.text(), header);
    }

    #[tokio::test]
    async fn test_reuses_incoming_uuid() {
        let id = Uuid::new_v4();
        let response = server()
            .get("/")
            .add_header(
                HeaderName::from_static(REQUEST_ID_HEADER),
                HeaderValue::from_str(&id.to_string()).unwrap(),
            )
            .await;

        assert_eq!(response.text(), id.to_string());
    }

    #[test]
    fn test_malformed_incoming_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        let id = RequestId::from_headers(&headers);
        assert_ne!(id.to_string(), "not-a-uuid");
    }
}
