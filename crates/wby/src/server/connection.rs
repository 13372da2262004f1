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

//! Connection handle.

use std::io::{self, Write as _};

use tracing::debug;

use crate::buffer::Buffer;
use crate::http::request::Head;
use crate::http::response::{self, LAST_CHUNK};
use crate::http::Request;
use crate::websocket::{Opcode, apply_mask, encode_header};

use super::transport::Transport;
use super::{Error, Result};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Connection handle.
///
/// Handlers receive a connection for every request or WebSocket frame, which
/// gives access to the parsed request, lets them read the request body or
/// frame payload, and write the response or outgoing frames. The connection
/// is in blocking mode while a handler runs, so all reads and writes complete
/// before they return.
///
/// Responses are written in three steps: [`Connection::response_begin`]
/// writes the head, [`Connection::write`] writes the body, and
/// [`Connection::response_end`] finishes the response.
///
/// # Examples
///
/// ```
/// use wby::handler::Dispatch;
/// use wby::server::{Connection, Result};
///
/// // Respond with greeting
/// fn hello(conn: &mut Connection) -> Result<Dispatch> {
///     conn.response_begin(200, Some(14), &[("Content-Type", "text/plain")])?;
///     conn.write(b"Hello, world!\n")?;
///     conn.response_end()?;
///     Ok(Dispatch::Handled)
/// }
/// ```
pub struct Connection<'a> {
    /// Header buffer.
    header: &'a Buffer,
    /// Parsed request head.
    head: &'a Head,
    /// Transport.
    io: &'a mut Transport,
}

/// Writer for a fragmented WebSocket message.
///
/// Every write sends one fragment, and ending the writer sends the final,
/// empty fragment. Dropping the writer ends it as well, but only logs errors.
pub struct FrameWriter<'c> {
    /// Transport.
    io: &'c mut Transport,
    /// Whether the final fragment was sent.
    ended: bool,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<'a> Connection<'a> {
    /// Creates a connection handle.
    pub(crate) fn new(
        header: &'a Buffer, head: &'a Head, io: &'a mut Transport,
    ) -> Self {
        Self { header, head, io }
    }

    /// Returns the request.
    ///
    /// For WebSocket connections, this is the request that initiated the
    /// upgrade.
    #[inline]
    #[must_use]
    pub fn request(&self) -> Request<'a> {
        self.head.request(self.header.as_slice())
    }

    /// Reads exactly enough body bytes to fill the given slice.
    ///
    /// For WebSocket connections, this reads the payload of the current frame,
    /// which is unmasked on the way.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::BodyOverrun`], if the slice is larger than
    /// the unread rest of the body, and [`Error::Io`], if the socket fails.
    pub fn read(&mut self, data: &mut [u8]) -> Result {
        let io = &mut *self.io;
        if data.len() > io.body_left() {
            return Err(Error::BodyOverrun);
        }

        // Take bytes that arrived together with the head first
        let n = io.pending.len().min(data.len());
        let start = io.pending.start;
        let source = if io.websocket {
            io.io.as_slice()
        } else {
            self.header.as_slice()
        };
        data[..n].copy_from_slice(&source[start..start + n]);
        io.pending.start += n;

        // Read the rest from the socket
        if n < data.len() {
            let res = io.socket().and_then(|socket| {
                socket.recv_exact(&mut data[n..]).map_err(Into::into)
            });
            self.check(res)?;
        }

        // Unmask relative to the start of the payload
        let io = &mut *self.io;
        if let Some(key) = io.mask {
            apply_mask(data, key, io.body_read);
        }
        io.body_read += data.len();
        Ok(())
    }

    /// Writes the given data.
    ///
    /// For chunked responses, the data is sent as one chunk. Otherwise, the
    /// data is buffered and sent when the buffer fills up or the response
    /// ends. WebSocket messages are written with [`Connection::frame_begin`].
    ///
    /// # Errors
    ///
    /// This method returns [`Error::NotServing`] for WebSocket connections,
    /// and [`Error::Io`], if the socket fails, in which case the connection is
    /// closed.
    pub fn write(&mut self, data: &[u8]) -> Result {
        if self.io.websocket {
            return Err(Error::NotServing);
        }
        let res = if self.io.chunked {
            self.write_chunk(data)
        } else {
            self.io.buffered(data)
        };
        self.check(res)
    }

    /// Writes the response head.
    ///
    /// The status is given as a number, so codes without a [`Status`] can be
    /// used as well, which are sent with the reason phrase `Unknown`.
    ///
    /// [`Status`]: crate::http::Status
    ///
    /// Unread bytes of the request body are discarded first. With a content
    /// length, the body must have exactly that size, while without one, the
    /// response uses chunked transfer encoding. The given headers are written
    /// verbatim after the `Server` header. When either the request or the
    /// given headers ask for `Connection: close`, the connection is closed
    /// after the response.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::NotServing`] for WebSocket connections,
    /// and [`Error::Io`], if the socket fails.
    pub fn response_begin<K, V>(
        &mut self, status: u16, content_length: Option<usize>,
        headers: &[(K, V)],
    ) -> Result
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.io.websocket {
            return Err(Error::NotServing);
        }

        // Determine whether the connection closes after the response
        let head = response::Head {
            status,
            content_length,
            headers,
            close: self.request().wants_close(),
        };
        self.io.close_after_response = head.close || head.has_close();

        // Skip the request body, and write the head
        let res = self.io.discard_body().and_then(|()| {
            self.io.chunked = content_length.is_none();
            write!(self.io, "{head}").map_err(Into::into)
        });
        self.check(res)
    }

    /// Finishes the response.
    ///
    /// Chunked responses are terminated, and buffered data is sent.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the socket fails.
    pub fn response_end(&mut self) -> Result {
        let mut res = Ok(());
        if self.io.chunked {
            self.io.chunked = false;
            res = self.io.buffered(LAST_CHUNK);
        }
        let res = res.and_then(|()| self.io.flush());
        self.check(res)
    }

    /// Starts a WebSocket message with the given opcode.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::NotWebSocket`] for HTTP connections, and
    /// [`Error::Io`], if the socket can't be switched to blocking mode.
    pub fn frame_begin(&mut self, opcode: Opcode) -> Result<FrameWriter<'_>> {
        if !self.io.websocket {
            return Err(Error::NotWebSocket);
        }

        // Stay in blocking mode until the writer ends
        self.io.enter_blocking()?;
        self.io.opcode = opcode;
        Ok(FrameWriter { io: &mut *self.io, ended: false })
    }

    /// Closes the connection once the current callback returns.
    #[inline]
    pub fn close(&mut self) {
        self.io.alive = false;
    }

    /// Switches the connection to the WebSocket protocol.
    pub(crate) fn set_websocket(&mut self) {
        self.io.websocket = true;
    }

    /// Writes the given data as a chunk.
    fn write_chunk(&mut self, data: &[u8]) -> Result {
        // An empty chunk would terminate the body
        if data.is_empty() {
            return Ok(());
        }
        write!(self.io, "{:x}\r\n", data.len())?;
        self.io.buffered(data)?;
        self.io.buffered(b"\r\n")
    }

    /// Closes the connection if the given result is a transport failure.
    fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if matches!(res, Err(Error::Io(_) | Error::Closed)) {
            self.io.alive = false;
        }
        res
    }
}

#[allow(clippy::must_use_candidate)]
impl Connection<'_> {
    /// Returns the connection identifier.
    ///
    /// Identifiers are unique among open connections, but are reused after
    /// connections are closed.
    #[inline]
    pub fn id(&self) -> usize {
        self.io.id
    }

    /// Returns whether the connection speaks the WebSocket protocol.
    #[inline]
    pub fn is_websocket(&self) -> bool {
        self.io.websocket
    }

    /// Returns whether the connection is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.io.alive
    }
}

// ----------------------------------------------------------------------------

impl FrameWriter<'_> {
    /// Sends the given data as a fragment.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the socket fails, in which case
    /// the connection is closed.
    #[inline]
    pub fn write(&mut self, data: &[u8]) -> Result {
        self.io.send_fragment(data)
    }

    /// Sends the final fragment and leaves blocking mode.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the socket fails, in which case
    /// the connection is closed.
    #[inline]
    pub fn end(mut self) -> Result {
        self.finish()
    }

    /// Sends the final fragment, unless it was already sent.
    fn finish(&mut self) -> Result {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        // Send empty final fragment with the current opcode
        let mut header = [0; 10];
        let size = encode_header(&mut header, self.io.opcode, 0, true);
        let res = self.io.socket().and_then(|socket| {
            socket.send_all(&header[..size]).map_err(Into::into)
        });
        if res.is_err() {
            self.io.alive = false;
        }
        self.io.leave_blocking();
        res
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl io::Write for Connection<'_> {
    /// Writes the given data.
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(self, buf)
            .map(|()| buf.len())
            .map_err(Into::into)
    }

    /// Sends buffered data.
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        let res = self.io.flush();
        self.check(res).map_err(Into::into)
    }
}

impl io::Write for FrameWriter<'_> {
    /// Sends the given data as a fragment.
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FrameWriter::write(self, buf)
            .map(|()| buf.len())
            .map_err(Into::into)
    }

    /// Does nothing, as fragments are sent immediately.
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------

impl Drop for FrameWriter<'_> {
    /// Sends the final fragment, if the writer wasn't ended.
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            debug!(connection = self.io.id, %err, "final fragment failed");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
