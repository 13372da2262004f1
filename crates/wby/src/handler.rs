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

//! Handler.

use super::server::{Connection, Result};
use super::websocket::Frame;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Outcome of dispatching a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Handler wrote a response.
    Handled,
    /// Handler ignored the request, which is answered with "404 Not Found".
    Unhandled,
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Handler.
///
/// Handlers are invoked by the server for every complete request, and for
/// the lifecycle events of WebSocket connections. All callbacks run on the
/// thread that drives [`Server::update`][], with the connection in blocking
/// mode, so they should finish quickly, as no other connection is served in
/// the meantime.
///
/// Any state the callbacks share lives in the handler itself, which the
/// server owns and hands out through [`Server::handler`][].
///
/// [`Server::update`]: crate::server::Server::update
/// [`Server::handler`]: crate::server::Server::handler
pub trait Handler {
    /// Dispatches the given request.
    ///
    /// The request is obtained from the connection, and the response is
    /// written to it. Returning an error closes the connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use wby::handler::{Dispatch, Handler};
    /// use wby::server::{Connection, Result};
    ///
    /// // Define handler that only knows a single path
    /// struct Hello;
    ///
    /// impl Handler for Hello {
    ///     fn dispatch(&mut self, conn: &mut Connection) -> Result<Dispatch> {
    ///         if conn.request().uri != "/hello" {
    ///             return Ok(Dispatch::Unhandled);
    ///         }
    ///         let headers = [("Content-Type", "text/plain")];
    ///         conn.response_begin(200, Some(6), &headers)?;
    ///         conn.write(b"Hello\n")?;
    ///         conn.response_end()?;
    ///         Ok(Dispatch::Handled)
    ///     }
    /// }
    /// ```
    fn dispatch(&mut self, conn: &mut Connection) -> Result<Dispatch>;

    /// Decides whether the request may upgrade to a WebSocket.
    ///
    /// The default implementation refuses all upgrades, which are answered
    /// with "400 Bad Request".
    #[allow(unused_variables)]
    fn ws_connect(&mut self, conn: &Connection) -> bool {
        false
    }

    /// Invoked after the WebSocket handshake completed.
    ///
    /// Returning an error closes the connection.
    #[allow(unused_variables)]
    fn ws_connected(&mut self, conn: &mut Connection) -> Result {
        Ok(())
    }

    /// Invoked for every data frame a WebSocket client sends.
    ///
    /// The payload is read through [`Connection::read`], and any part of it
    /// that is left unread is discarded after the callback returns. Close
    /// and ping frames are handled by the server and never reach this
    /// callback. Returning an error closes the connection.
    #[allow(unused_variables)]
    fn ws_frame(&mut self, conn: &mut Connection, frame: &Frame) -> Result {
        Ok(())
    }

    /// Invoked when a WebSocket connection was closed.
    ///
    /// The connection can't be written to anymore, but still knows the
    /// request that initiated the upgrade.
    #[allow(unused_variables)]
    fn ws_closed(&mut self, conn: &mut Connection) {}
}

// ----------------------------------------------------------------------------
// Blanket implementations
// ----------------------------------------------------------------------------

impl<F> Handler for F
where
    F: FnMut(&mut Connection) -> Result<Dispatch>,
{
    #[inline]
    fn dispatch(&mut self, conn: &mut Connection) -> Result<Dispatch> {
        self(conn)
    }
}
