//! Request and response types shared by every stage.
//!
//! Stages never see a request body. They read a [`RequestHead`] and write
//! into a [`ResponseDraft`], which the chain either finalises into a
//! short-circuit response or merges into the handler's response.

use bytes::Bytes;
use http::header::{self, AsHeaderName, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use http_body_util::Full;

/// The HTTP request type used by [`Chain::process`](crate::Chain::process).
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by the chain.
pub type Response = http::Response<Full<Bytes>>;

/// Borrowed view of the parts of a request a stage may inspect.
///
/// # Example
///
/// ```
/// use aegis_chain::RequestHead;
///
/// let request = http::Request::builder()
///     .uri("/api/widgets?page=2")
///     .header("origin", "https://a.example")
///     .body(())
///     .unwrap();
///
/// let head = RequestHead::from_request(&request);
/// assert_eq!(head.path(), "/api/widgets");
/// assert_eq!(head.header_str("origin"), Some("https://a.example"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    method: &'a Method,
    uri: &'a Uri,
    headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    /// Creates a head from its parts.
    #[must_use]
    pub const fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Borrows the head of any `http::Request`.
    #[must_use]
    pub fn from_request<B>(request: &'a http::Request<B>) -> Self {
        Self::new(request.method(), request.uri(), request.headers())
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &'a Method {
        self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &'a Uri {
        self.uri
    }

    /// Returns the request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    /// Returns a header as a string, if present and visible ASCII.
    #[must_use]
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl<'a, B> From<&'a http::Request<B>> for RequestHead<'a> {
    fn from(request: &'a http::Request<B>) -> Self {
        Self::from_request(request)
    }
}

/// The response under construction during one chain execution.
///
/// Annotation stages add headers. A short-circuiting stage also sets a status
/// and (optionally) a body; the chain then turns the draft into the final
/// response with [`into_response`](Self::into_response).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseDraft {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseDraft {
    /// Creates an empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plain-text draft with the given status and body.
    #[must_use]
    pub fn plain_text(status: StatusCode, message: &'static str) -> Self {
        let mut draft = Self::new();
        draft.set_status(status);
        draft.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        draft.set_body(message);
        draft
    }

    /// Returns the status set by a stage, if any.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the drafted headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the drafted headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Inserts a header, replacing any earlier value under the same name.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Returns the drafted body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Sets the response body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Returns true if no stage has written anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_empty()
    }

    /// Finalises the draft into a response.
    ///
    /// `default_status` is used when no stage set one.
    #[must_use]
    pub fn into_response(self, default_status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status.unwrap_or(default_status);
        *response.headers_mut() = self.headers;
        response
    }

    /// Merges the drafted headers into a handler response.
    ///
    /// A header the handler already set is left untouched, so the
    /// application can always override a security header for one route.
    /// `Vary` is the exception: drafted tokens the handler did not list are
    /// appended, since dropping `Vary: Origin` would let shared caches serve
    /// one origin's CORS headers to another.
    pub fn apply_to<B>(&self, response: &mut http::Response<B>) {
        for name in self.headers.keys() {
            if *name == header::VARY {
                merge_vary(response.headers_mut(), &self.headers);
                continue;
            }
            if response.headers().contains_key(name) {
                continue;
            }
            for value in self.headers.get_all(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
    }
}

fn vary_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn merge_vary(target: &mut HeaderMap, drafted: &HeaderMap) {
    let existing: Vec<String> = vary_tokens(target).map(str::to_ascii_lowercase).collect();
    if existing.iter().any(|t| t == "*") {
        return;
    }

    let mut missing: Vec<&str> = Vec::new();
    for token in vary_tokens(drafted) {
        let lower = token.to_ascii_lowercase();
        if !existing.contains(&lower) && !missing.iter().any(|m| m.eq_ignore_ascii_case(token)) {
            missing.push(token);
        }
    }

    if missing.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&missing.join(", ")) {
        target.append(header::VARY, value);
    }
}
