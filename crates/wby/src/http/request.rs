// Copyright (c) 2025 Zensical and contributors

// SPDX-License-Identifier: MIT
// Third-party contributions licensed under DCO

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NON-INFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

// ----------------------------------------------------------------------------

//! HTTP request.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::fmt;
use std::str;

use super::component::Header;

mod error;
mod headers;
mod query;

pub use error::{Error, Result};
pub use headers::Headers;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Maximum number of headers per request.
pub const MAX_HEADERS: usize = 64;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Byte range inside a header buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Span {
    /// Start offset.
    start: usize,
    /// End offset, exclusive.
    end: usize,
}

// ----------------------------------------------------------------------------

/// Parsed HTTP request head.
///
/// A head only records byte ranges into the buffer it was parsed from, which
/// means parsing never copies or allocates. Views on the request are created
/// with [`Head::request`], and are bound to the lifetime of both the head and
/// the buffer, so the buffer can't be reused while a view is alive.
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use wby::http::request::Head;
///
/// // Parse request head
/// let bytes = b"GET /hello%20world?q=1 HTTP/1.1\r\nHost: x\r\n\r\n";
/// let mut head = Head::new();
/// assert_eq!(head.parse(bytes)?, bytes.len());
///
/// // Obtain view on request
/// let req = head.request(bytes);
/// assert_eq!(req.method, "GET");
/// assert_eq!(req.uri, "/hello world");
/// assert_eq!(req.query, Some("q=1"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Head {
    /// Request method.
    method: Span,
    /// Request URI path, without query string.
    path: Span,
    /// Request query string, if any.
    query: Option<Span>,
    /// Minor HTTP version.
    version: u8,
    /// Declared body length.
    content_length: usize,
    /// Header name and value ranges, in arrival order.
    fields: [(Span, Span); MAX_HEADERS],
    /// Number of headers.
    count: usize,
}

/// HTTP request.
///
/// This is a borrowed view on a parsed [`Head`], which is handed to handlers
/// through [`Connection::request`][]. Only the path is decoded, and only when
/// it actually contains percent-encoded characters.
///
/// [`Connection::request`]: crate::server::Connection::request
#[derive(Clone, Debug)]
pub struct Request<'a> {
    /// Request method.
    pub method: &'a str,
    /// Request URI path, percent-decoded.
    pub uri: Cow<'a, str>,
    /// Request HTTP version.
    pub version: &'static str,
    /// Request query string, raw.
    pub query: Option<&'a str>,
    /// Declared body length.
    pub content_length: usize,
    /// Request headers.
    pub headers: Headers<'a>,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Span {
    /// Creates a span for a slice that points into the given base slice.
    fn within(base: &[u8], part: &[u8]) -> Self {
        let start = part.as_ptr() as usize - base.as_ptr() as usize;
        Self { start, end: start + part.len() }
    }

    /// Returns the bytes covered by the span.
    ///
    /// Spans that lie outside of the given bytes, e.g., because the buffer was
    /// cleared in the meantime, yield an empty slice.
    #[inline]
    pub(crate) fn get<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        bytes.get(self.start..self.end).unwrap_or_default()
    }

    /// Returns the string covered by the span.
    #[inline]
    pub(crate) fn as_str<'a>(&self, bytes: &'a [u8]) -> &'a str {
        str::from_utf8(self.get(bytes)).unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------

impl Head {
    /// Creates an empty request head.
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: Span::default(),
            path: Span::default(),
            query: None,
            version: 1,
            content_length: 0,
            fields: [(Span::default(), Span::default()); MAX_HEADERS],
            count: 0,
        }
    }

    /// Parses the request head from the given bytes.
    ///
    /// Parsing is delegated to [`httparse`], which enforces the shape of the
    /// request line as `method SP uri SP version`. Headers are kept in the
    /// order they arrived in, except for values that are not valid UTF-8,
    /// which are skipped. On success, the number of bytes making up the head
    /// is returned, which includes the terminating blank line.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Incomplete`], if the terminating blank
    /// line is missing, [`Error::TooManyHeaders`], if there are more than
    /// [`MAX_HEADERS`] headers, [`Error::TransferEncoding`], if the request
    /// declares a transfer encoding, and [`Error::ContentLength`], if the
    /// content length is not an unsigned integer.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let size = match req.parse(bytes) {
            Ok(httparse::Status::Complete(size)) => size,
            Ok(httparse::Status::Partial) => return Err(Error::Incomplete),
            Err(httparse::Error::TooManyHeaders) => {
                return Err(Error::TooManyHeaders);
            }
            Err(err) => return Err(Error::Parser(err)),
        };

        // A complete parse always yields method, path and version
        let (Some(method), Some(uri), Some(version)) =
            (req.method, req.path, req.version)
        else {
            return Err(Error::Incomplete);
        };

        // Split off the query string, if any
        self.method = Span::within(bytes, method.as_bytes());
        self.version = version;
        match uri.split_once('?') {
            Some((path, query)) => {
                self.path = Span::within(bytes, path.as_bytes());
                self.query = Some(Span::within(bytes, query.as_bytes()));
            }
            None => {
                self.path = Span::within(bytes, uri.as_bytes());
                self.query = None;
            }
        }

        // Record headers and pick up the ones that affect framing
        self.count = 0;
        self.content_length = 0;
        for header in req.headers.iter() {
            let Ok(value) = str::from_utf8(header.value) else {
                continue;
            };
            if Header::TransferEncoding.matches(header.name) {
                return Err(Error::TransferEncoding);
            }
            if Header::ContentLength.matches(header.name) {
                self.content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::ContentLength(value.to_string()))?;
            }
            self.fields[self.count] = (
                Span::within(bytes, header.name.as_bytes()),
                Span::within(bytes, header.value),
            );
            self.count += 1;
        }

        // Return number of consumed bytes
        Ok(size)
    }

    /// Returns a view on the request.
    ///
    /// The given bytes must be the ones the head was parsed from.
    #[must_use]
    pub fn request<'a>(&'a self, bytes: &'a [u8]) -> Request<'a> {
        let path = self.path.as_str(bytes);
        Request {
            method: self.method.as_str(bytes),
            uri: percent_decode_str(path).decode_utf8_lossy(),
            version: if self.version == 0 { "HTTP/1.0" } else { "HTTP/1.1" },
            query: self.query.map(|span| span.as_str(bytes)),
            content_length: self.content_length,
            headers: Headers::new(bytes, &self.fields[..self.count]),
        }
    }
}

#[allow(clippy::must_use_candidate)]
impl Head {
    /// Returns the declared body length.
    #[inline]
    pub fn content_length(&self) -> usize {
        self.content_length
    }
}

// ----------------------------------------------------------------------------

impl<'a> Request<'a> {
    /// Returns the value of the given header.
    ///
    /// Header names are compared case-insensitively, and if a header was sent
    /// more than once, the first value is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::error::Error;
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// use wby::http::request::Head;
    /// use wby::http::Header;
    ///
    /// // Parse request head
    /// let bytes = b"GET / HTTP/1.1\r\nhost: example.com\r\n\r\n";
    /// let mut head = Head::new();
    /// head.parse(bytes)?;
    ///
    /// // Obtain header value
    /// let req = head.request(bytes);
    /// assert_eq!(req.header(Header::Host), Some("example.com"));
    /// assert_eq!(req.header("HOST"), Some("example.com"));
    /// # Ok(())
    /// # }
    /// ```
    #[inline]
    #[must_use]
    pub fn header<N>(&self, name: N) -> Option<&'a str>
    where
        N: AsRef<str>,
    {
        self.headers.get(name)
    }

    /// Returns the form-decoded value of the given query variable.
    ///
    /// Variable names are compared case-insensitively. The value is decoded
    /// as in HTML forms, so `+` denotes a space.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::error::Error;
    /// # fn main() -> Result<(), Box<dyn Error>> {
    /// use wby::http::request::Head;
    ///
    /// // Parse request head
    /// let bytes = b"GET /search?q=hello+world&page=2 HTTP/1.1\r\n\r\n";
    /// let mut head = Head::new();
    /// head.parse(bytes)?;
    ///
    /// // Obtain query variables
    /// let req = head.request(bytes);
    /// assert_eq!(req.query_var("Q").as_deref(), Some("hello world"));
    /// assert_eq!(req.query_var("missing"), None);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn query_var(&self, name: &str) -> Option<Cow<'a, str>> {
        self.query.and_then(|query| query::find(query, name))
    }

    /// Returns whether the request asks for a WebSocket upgrade.
    ///
    /// This is the case when the `Connection` header contains the `Upgrade`
    /// token and the `Upgrade` header equals `websocket`, both compared
    /// case-insensitively.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.has_token(Header::Connection, "upgrade")
            && self
                .header(Header::Upgrade)
                .is_some_and(|value| {
                    value.trim().eq_ignore_ascii_case("websocket")
                })
    }

    /// Returns whether the client asked for the connection to be closed.
    #[must_use]
    pub fn wants_close(&self) -> bool {
        self.has_token(Header::Connection, "close")
    }

    /// Returns whether the client waits for `100 Continue` before sending
    /// the body.
    #[must_use]
    pub fn expects_continue(&self) -> bool {
        self.header(Header::Expect)
            .is_some_and(|value| {
                value.trim().eq_ignore_ascii_case("100-continue")
            })
    }

    /// Returns whether a comma-separated header contains the given token.
    fn has_token(&self, header: Header, token: &str) -> bool {
        self.header(header).is_some_and(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Default for Head {
    /// Creates an empty request head.
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------

impl fmt::Display for Request<'_> {
    /// Formats the request for display.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)?;
        if let Some(query) = self.query {
            write!(f, "?{query}")?;
        }
        write!(f, " {}\r\n{}", self.version, self.headers)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Result<Head> {
        let mut head = Head::new();
        head.parse(bytes).map(|_| head)
    }

    #[test]
    fn test_request_line_and_headers() {
        let bytes = b"POST /a%2Fb+c?x=1 HTTP/1.0\r\n\
            Host: x\r\nContent-Length: 5\r\n\r\nhello";
        let head = parse(bytes).unwrap();
        let req = head.request(bytes);
        assert_eq!(req.method, "POST");
        assert_eq!(req.uri, "/a/b+c");
        assert_eq!(req.version, "HTTP/1.0");
        assert_eq!(req.query, Some("x=1"));
        assert_eq!(req.content_length, 5);
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.header("content-length"), Some("5"));
    }

    #[test]
    fn test_partial_request_is_incomplete() {
        let err = parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap_err();
        assert!(matches!(err, Error::Incomplete));
    }

    #[test]
    fn test_malformed_request_line() {
        let err = parse(b"GET / HTTP/9.9\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::Parser(_)));
    }

    #[test]
    fn test_too_many_headers() {
        let mut bytes = b"GET / HTTP/1.1\r\n".to_vec();
        for n in 0..=MAX_HEADERS {
            bytes.extend_from_slice(format!("X-{n}: {n}\r\n").as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::TooManyHeaders));
    }

    #[test]
    fn test_invalid_content_length() {
        let err = parse(b"GET / HTTP/1.1\r\nContent-Length: abc\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, Error::ContentLength(value) if value == "abc"));
    }

    #[test]
    fn test_transfer_encoding_is_rejected() {
        let bytes = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        let err = parse(bytes).unwrap_err();
        assert!(matches!(err, Error::TransferEncoding));
    }

    #[test]
    fn test_websocket_upgrade_detection() {
        let bytes = b"GET /ws HTTP/1.1\r\nConnection: keep-alive, Upgrade\r\n\
            Upgrade: WebSocket\r\n\r\n";
        let head = parse(bytes).unwrap();
        assert!(head.request(bytes).is_websocket_upgrade());

        let bytes = b"GET /ws HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        let head = parse(bytes).unwrap();
        assert!(!head.request(bytes).is_websocket_upgrade());
    }

    #[test]
    fn test_close_and_continue() {
        let bytes = b"PUT / HTTP/1.1\r\nConnection: Close\r\n\
            Expect: 100-Continue\r\nContent-Length: 3\r\n\r\n";
        let head = parse(bytes).unwrap();
        let req = head.request(bytes);
        assert!(req.wants_close());
        assert!(req.expects_continue());
    }

    #[test]
    fn test_head_is_reusable() {
        let mut head = Head::new();
        let first = b"GET /a?b HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n";
        head.parse(first).unwrap();
        let second = b"GET /c HTTP/1.1\r\n\r\n";
        head.parse(second).unwrap();
        let req = head.request(second);
        assert_eq!(req.uri, "/c");
        assert_eq!(req.query, None);
        assert!(req.headers.is_empty());
    }
}
