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

//! HTTP response framing.

use std::fmt;

use super::component::{Header, Status};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Interim response sent to clients waiting for `100 Continue`.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Terminating chunk of a chunked response.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Value of the `Server` header.
pub const SERVER: &str = "wby";

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// HTTP response head.
///
/// Formatting the head yields the status line, the framing header, the
/// `Server` header and the caller's headers in the given order, followed by
/// the blank line that separates the head from the body.
pub struct Head<'h, K, V> {
    /// Status code.
    pub status: u16,
    /// Body length, or [`None`] for chunked transfer encoding.
    pub content_length: Option<usize>,
    /// Caller headers, written verbatim.
    pub headers: &'h [(K, V)],
    /// Whether the connection closes after the response.
    pub close: bool,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<K, V> Head<'_, K, V>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    /// Returns whether the caller headers ask to close the connection.
    pub fn has_close(&self) -> bool {
        self.headers.iter().any(|(name, value)| {
            Header::Connection.matches(name.as_ref())
                && value
                    .as_ref()
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("close"))
        })
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl<K, V> fmt::Display for Head<'_, K, V>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    /// Formats the response head for the wire.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = Status::reason(self.status);
        write!(f, "HTTP/1.1 {} {reason}\r\n", self.status)?;
        match self.content_length {
            Some(len) => write!(f, "{}: {len}\r\n", Header::ContentLength)?,
            None => write!(f, "{}: chunked\r\n", Header::TransferEncoding)?,
        }
        write!(f, "{}: {SERVER}\r\n", Header::Server)?;
        for (name, value) in self.headers {
            write!(f, "{}: {}\r\n", name.as_ref(), value.as_ref())?;
        }

        // Exactly one close header is emitted
        if self.close && !self.has_close() {
            write!(f, "{}: close\r\n", Header::Connection)?;
        }
        f.write_str("\r\n")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
