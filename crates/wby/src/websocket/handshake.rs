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

//! WebSocket opening handshake.

use base64::prelude::*;
use sha1_smol::Sha1;
use std::result;
use thiserror::Error;

use crate::http::{Header, Request};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// GUID appended to the client key before hashing.
pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Number of input bytes per line of Base64 output.
const LINE_BYTES: usize = 57;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// WebSocket handshake error.
#[derive(Debug, Error)]
pub enum Error {
    /// Version header is missing.
    #[error("missing WebSocket version")]
    MissingVersion,

    /// Version is not 13.
    #[error("unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    /// Key header is missing.
    #[error("missing WebSocket key")]
    MissingKey,
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Checks the handshake preconditions and returns the accept key.
///
/// # Errors
///
/// This function returns [`Error::MissingVersion`] or [`Error::MissingKey`],
/// if the respective header is absent, and [`Error::UnsupportedVersion`], if
/// the client speaks any other version than 13.
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use wby::http::request::Head;
/// use wby::websocket::handshake;
///
/// // Parse upgrade request
/// let bytes = b"GET /ws HTTP/1.1\r\n\
///     Sec-WebSocket-Version: 13\r\n\
///     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
/// let mut head = Head::new();
/// head.parse(bytes)?;
///
/// // Compute accept key
/// let accept = handshake::check(&head.request(bytes))?;
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// # Ok(())
/// # }
/// ```
pub fn check(req: &Request) -> Result<String> {
    let version = req
        .header(Header::SecWebSocketVersion)
        .ok_or(Error::MissingVersion)?;
    if version != "13" {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }

    // Derive accept key from client key
    req.header(Header::SecWebSocketKey)
        .map(accept_key)
        .ok_or(Error::MissingKey)
}

/// Computes the accept key for the given client key.
///
/// The key is hashed with SHA-1 together with the [`GUID`], and the digest
/// is Base64-encoded, which always yields 28 characters.
#[must_use]
pub fn accept_key<K>(key: K) -> String
where
    K: AsRef<[u8]>,
{
    let mut hasher = Sha1::new();
    hasher.update(key.as_ref());
    hasher.update(GUID.as_bytes());
    encode_base64(&hasher.digest().bytes())
}

/// Encodes the given bytes as Base64, breaking lines after 76 characters.
///
/// Lines are separated by CRLF, and there's no line break after the last line.
///
/// # Examples
///
/// ```
/// use wby::websocket::handshake::encode_base64;
///
/// // Encode short input
/// assert_eq!(encode_base64(b"wby"), "d2J5");
///
/// // Encode long input
/// let text = encode_base64(&[0; 60]);
/// assert_eq!(text.split("\r\n").map(str::len).collect::<Vec<_>>(), [76, 4]);
/// ```
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    let mut text = String::with_capacity(data.len().div_ceil(3) * 4);
    for (n, chunk) in data.chunks(LINE_BYTES).enumerate() {
        if n > 0 {
            text.push_str("\r\n");
        }
        BASE64_STANDARD.encode_string(chunk, &mut text);
    }
    text
}

// ----------------------------------------------------------------------------
// Type aliases
// ----------------------------------------------------------------------------

/// WebSocket handshake result.
pub type Result<T = ()> = result::Result<T, Error>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
