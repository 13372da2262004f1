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

//! HTTP request headers.

use std::fmt;

use super::Span;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// HTTP request headers.
///
/// Headers are a view on the header buffer of a connection, preserving the
/// order in which they arrived. Lookups are linear, which is faster than any
/// map for the small number of headers a request carries, and compare names
/// case-insensitively.
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use wby::http::request::Head;
///
/// // Parse request head
/// let bytes = b"GET / HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n";
/// let mut head = Head::new();
/// head.parse(bytes)?;
///
/// // Iterate over headers
/// let req = head.request(bytes);
/// for (name, value) in req.headers.iter() {
///     println!("{name}: {value}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct Headers<'a> {
    /// Header buffer.
    bytes: &'a [u8],
    /// Header name and value ranges.
    fields: &'a [(Span, Span)],
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<'a> Headers<'a> {
    /// Creates a header view.
    pub(crate) fn new(bytes: &'a [u8], fields: &'a [(Span, Span)]) -> Self {
        Self { bytes, fields }
    }

    /// Returns the value for the given header.
    ///
    /// If the header was sent more than once, the first value is returned.
    #[must_use]
    pub fn get<N>(&self, name: N) -> Option<&'a str>
    where
        N: AsRef<str>,
    {
        let name = name.as_ref();
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Returns whether the header is contained.
    #[inline]
    #[must_use]
    pub fn contains<N>(&self, name: N) -> bool
    where
        N: AsRef<str>,
    {
        self.get(name).is_some()
    }

    /// Returns an iterator over the headers in arrival order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + use<'a> {
        let (bytes, fields) = (self.bytes, self.fields);
        fields.iter().map(move |(name, value)| {
            (name.as_str(bytes), value.as_str(bytes))
        })
    }
}

#[allow(clippy::must_use_candidate)]
impl Headers<'_> {
    /// Returns the number of headers.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether there are any headers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for Headers<'_> {
    /// Formats the headers for debugging.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for Headers<'_> {
    /// Formats the headers for display.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (name, value) in self.iter() {
            f.write_str(name)?;
            f.write_str(": ")?;
            f.write_str(value)?;
            f.write_str("\r\n")?;
        }

        // No errors occurred
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::http::request::Head;
    use crate::http::Header;

    #[test]
    fn test_headers_keep_arrival_order() {
        let bytes = b"GET / HTTP/1.1\r\nB: 2\r\nA: 1\r\nb: 3\r\n\r\n";
        let mut head = Head::new();
        head.parse(bytes).unwrap();
        let req = head.request(bytes);
        let names: Vec<_> = req.headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["B", "A", "b"]);
        assert_eq!(req.headers.get("b"), Some("2"));
        assert_eq!(req.headers.to_string(), "B: 2\r\nA: 1\r\nb: 3\r\n");
    }

    #[test]
    fn test_headers_skip_invalid_utf8() {
        let bytes = b"GET / HTTP/1.1\r\nX-Bad: \xff\xfe\r\nHost: x\r\n\r\n";
        let mut head = Head::new();
        head.parse(bytes).unwrap();
        let req = head.request(bytes);
        assert_eq!(req.headers.len(), 1);
        assert!(!req.headers.contains("X-Bad"));
        assert!(req.headers.contains(Header::Host));
    }
}
