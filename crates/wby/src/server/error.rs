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

//! Server error.

use std::{io, result};
use thiserror::Error;

use crate::http::request;
use crate::websocket::handshake;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Server error.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Request error.
    #[error(transparent)]
    Request(#[from] request::Error),

    /// Handshake error.
    #[error(transparent)]
    Handshake(#[from] handshake::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// No address to bind to.
    #[error("no address to bind to")]
    NoAddress,

    /// Request head exceeds the request buffer.
    #[error("request header too large")]
    HeaderOverflow,

    /// Read past the end of the request body or frame payload.
    #[error("read past end of body")]
    BodyOverrun,

    /// Connection is not serving an HTTP request.
    #[error("connection is not serving a request")]
    NotServing,

    /// Connection is not a WebSocket.
    #[error("connection is not a WebSocket")]
    NotWebSocket,

    /// Connection closed.
    #[error("connection closed")]
    Closed,
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl From<Error> for io::Error {
    /// Converts a server error into an I/O error.
    #[inline]
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => err,
            Error::Closed => io::ErrorKind::BrokenPipe.into(),
            err => io::Error::other(err),
        }
    }
}

// ----------------------------------------------------------------------------
// Type aliases
// ----------------------------------------------------------------------------

/// Server result.
pub type Result<T = ()> = result::Result<T, Error>;
