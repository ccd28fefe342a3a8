use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use super::{Body, BodyChunk};

/// Content type used for plain text responses built by this crate.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Reason phrase for a status code, or an empty string for unregistered codes.
pub fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("")
}

/// A web-standard response: status, status text, header multimap, body.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// An empty response with the canonical reason phrase.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// A `text/plain` response.
    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
            .with_body(Body::Full(Bytes::from(text)))
    }

    /// A fully buffered response with the given content type.
    pub fn bytes(status: StatusCode, content_type: HeaderValue, bytes: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_body(Body::Full(bytes.into()))
    }

    /// A streamed response with the given content type.
    pub fn stream<I>(status: StatusCode, content_type: HeaderValue, chunks: I) -> Self
    where
        I: Iterator<Item = BodyChunk> + Send + 'static,
    {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, content_type)
            .with_body(Body::from_stream(chunks))
    }

    /// An `application/json` response.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::bytes(
            status,
            HeaderValue::from_static("application/json"),
            value.to_string(),
        )
    }

    /// Default response when no route matches.
    ///
    /// It carries no content type, so it travels as a stream with no data
    /// chunks: a forwarded `not_found()` holds its worker until the body is
    /// read or the response is dropped.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// Default response for a failed handler.
    pub fn internal_error() -> Self {
        Self::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            status_text(StatusCode::INTERNAL_SERVER_ERROR),
        )
    }

    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    /// Append a header value, keeping any existing values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// True when the response qualifies for the inline text path.
    pub fn is_text(&self) -> bool {
        self.content_type()
            .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/"))
            .unwrap_or(false)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_defaults_to_canonical_reason() {
        assert_eq!(Response::new(StatusCode::OK).status_text(), "OK");
        assert_eq!(Response::not_found().status_text(), "Not Found");
        let custom = StatusCode::from_u16(599).unwrap();
        assert_eq!(Response::new(custom).status_text(), "");
    }

    #[test]
    fn test_is_text_checks_content_type_prefix() {
        assert!(Response::text(StatusCode::OK, "hi").is_text());
        let html = Response::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("Text/HTML"));
        assert!(html.is_text());
        let json = Response::json(StatusCode::OK, &serde_json::json!({"a": 1}));
        assert!(!json.is_text());
        assert!(!Response::new(StatusCode::NO_CONTENT).is_text());
    }

    #[test]
    fn test_internal_error_is_plain_text_500() {
        let res = Response::internal_error();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.is_text());
        assert_eq!(res.into_body().text().unwrap(), "Internal Server Error");
    }
}
