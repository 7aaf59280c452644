//! Per-transfer configuration handed to the transport engine.
//!
//! A [`TransferHandle`] is created for every request and owned by it; the
//! transport only ever sees it by reference while activating the transfer,
//! and afterwards refers to it by its [`Token`].
mod error_buf;

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};

pub use error_buf::{ErrorBuffer, ERROR_BUFFER_SIZE};

/// Identity of a transfer, unique for the lifetime of the engine that
/// allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity returned to callers of
/// [`start_request`](crate::HttpClientEngine::start_request).
pub type RequestId = Token;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    #[inline]
    pub fn as_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}

impl From<Method> for http::Method {
    #[inline]
    fn from(method: Method) -> Self {
        method.as_http()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_http().as_str())
    }
}

/// What a caller wants fetched.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub url: String,
    pub method: Method,
    pub body: Option<Bytes>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            body: Some(body.into()),
            headers: HeaderMap::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// One configured transfer.
#[derive(Debug)]
pub struct TransferHandle {
    token: Token,
    url: String,
    method: Method,
    body: Option<Bytes>,
    headers: HeaderMap,
}

impl TransferHandle {
    pub(crate) fn new(token: Token, options: RequestOptions) -> Self {
        let RequestOptions {
            url,
            method,
            body,
            headers,
        } = options;
        Self {
            token,
            url,
            method,
            body,
            headers,
        }
    }

    /// Checks the configuration before it reaches a transport.
    pub fn validate(&self) -> crate::Result<()> {
        if self.url.is_empty() {
            return Err(crate::Error::InvalidRequest("empty url"));
        }
        let uri: Uri = self.url.parse()?;
        if uri.scheme().is_none() {
            return Err(crate::Error::InvalidRequest("url has no scheme"));
        }
        if uri.host().is_none() {
            return Err(crate::Error::InvalidRequest("url has no host"));
        }
        if self.method == Method::Get && self.body.is_some() {
            return Err(crate::Error::InvalidRequest("GET request with a body"));
        }
        Ok(())
    }

    #[inline]
    pub fn token(&self) -> Token {
        self.token
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request body; a POST without one sends an empty body.
    #[inline]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;

    use super::*;
    use crate::Error;

    fn handle(options: RequestOptions) -> TransferHandle {
        TransferHandle::new(Token(1), options)
    }

    #[test]
    fn valid_get() {
        let h = handle(RequestOptions::get("http://localhost:8080/status"));
        assert!(h.validate().is_ok());
        assert_eq!(h.method(), Method::Get);
        assert!(h.body().is_none());
        assert_eq!(h.token(), Token(1));
    }

    #[test]
    fn valid_post_with_header() {
        let h = handle(
            RequestOptions::post("https://example.com/submit", "a=1&b=2").header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            ),
        );
        assert!(h.validate().is_ok());
        assert_eq!(h.body().map(|b| &b[..]), Some(&b"a=1&b=2"[..]));
        assert_eq!(h.headers().len(), 1);
        assert_eq!(h.method().to_string(), "POST");
    }

    #[test]
    fn empty_url_rejected() {
        let err = handle(RequestOptions::get("")).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest("empty url")));
    }

    #[test]
    fn malformed_url_rejected() {
        let err = handle(RequestOptions::get("http://exa mple.com/"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }

    #[test]
    fn relative_url_rejected() {
        let err = handle(RequestOptions::get("/only/a/path"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest("url has no scheme")));
    }

    #[test]
    fn get_with_body_rejected() {
        let mut options = RequestOptions::get("http://localhost/");
        options.body = Some(Bytes::from_static(b"x"));
        let err = handle(options).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
