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

//! Embeddable HTTP/1.1 and WebSocket server.
//!
//! This crate implements a small, single-threaded server that is driven by
//! the host application, which calls [`Server::update`][server::Server::update]
//! from its own loop. All memory is allocated once, when the server starts,
//! and requests are handed to a [`Handler`][handler::Handler], which writes
//! responses straight to the connection.
//!
//! WebSocket connections are upgraded from regular requests, if the handler
//! accepts them, and deliver every incoming frame to the handler. Messages
//! can be sent to individual connections or broadcast to all of them.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]

pub mod buffer;
pub mod handler;
pub mod http;
pub mod server;
pub mod websocket;
