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

//! Connection transport.

use std::io;
use std::ops::{Deref, DerefMut, Range};

use crate::buffer::Buffer;
use crate::websocket::{Opcode, encode_header};

use super::socket::{Fill, Socket};
use super::{Error, Result};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Connection transport.
///
/// The transport bundles everything a connection needs to move bytes: the
/// socket, the I/O buffer, and the counters that keep the byte stream aligned
/// when handlers read less than the declared body, or when several frames
/// arrive at once.
#[derive(Debug)]
pub struct Transport {
    /// Slot identifier.
    pub id: usize,
    /// Socket, if connected.
    socket: Option<Socket>,
    /// I/O buffer.
    pub io: Buffer,
    /// Whether the connection is alive.
    pub alive: bool,
    /// Whether the connection was just accepted.
    pub fresh: bool,
    /// Whether the poller reported readiness.
    pub ready: bool,
    /// Whether to close the connection after the response.
    pub close_after_response: bool,
    /// Whether the response uses chunked transfer encoding.
    pub chunked: bool,
    /// Whether the connection speaks the WebSocket protocol.
    pub websocket: bool,
    /// Unread body bytes already buffered, as a range into the buffer that
    /// received them.
    pub pending: Range<usize>,
    /// Number of body bytes read.
    pub body_read: usize,
    /// Declared body length.
    pub body_len: usize,
    /// Mask key of the current frame.
    pub mask: Option<[u8; 4]>,
    /// Opcode of the next outgoing fragment.
    pub opcode: Opcode,
    /// Number of remaining bytes of the interim response.
    pub continue_left: usize,
    /// Nesting depth of blocking mode.
    blocking: usize,
}

/// Scope in which the socket is in blocking mode.
///
/// Blocking mode nests, and only entering the outermost scope or leaving it
/// changes the mode of the socket.
pub struct Blocking<'t> {
    /// Transport.
    inner: &'t mut Transport,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Transport {
    /// Creates a transport with the given I/O buffer size.
    pub fn new(id: usize, io_buffer_size: usize) -> Self {
        Self {
            id,
            socket: None,
            io: Buffer::with_capacity(io_buffer_size),
            alive: false,
            fresh: false,
            ready: false,
            close_after_response: false,
            chunked: false,
            websocket: false,
            pending: 0..0,
            body_read: 0,
            body_len: 0,
            mask: None,
            opcode: Opcode::Continuation,
            continue_left: 0,
            blocking: 0,
        }
    }

    /// Attaches a freshly accepted socket.
    pub fn open(&mut self, socket: Socket) {
        self.socket = Some(socket);
        self.alive = true;
        self.fresh = true;
        self.ready = false;
        self.websocket = false;
        self.blocking = 0;
        self.reset();
    }

    /// Detaches the socket, which closes it once dropped.
    pub fn take(&mut self) -> Option<Socket> {
        self.alive = false;
        self.socket.take()
    }

    /// Resets per-request state.
    pub fn reset(&mut self) {
        self.io.clear();
        self.close_after_response = false;
        self.chunked = false;
        self.pending = 0..0;
        self.body_read = 0;
        self.body_len = 0;
        self.mask = None;
        self.opcode = Opcode::Continuation;
        self.continue_left = 0;
    }

    /// Prepares reading a body of the given length.
    ///
    /// The range denotes body bytes that already arrived together with the
    /// request head or frame header.
    pub fn begin_body(&mut self, pending: Range<usize>, len: usize) {
        let end = pending.start.saturating_add(len);
        self.pending = pending.start..pending.end.min(end);
        self.body_read = 0;
        self.body_len = len;
    }

    /// Returns the socket.
    #[inline]
    pub fn socket(&mut self) -> Result<&mut Socket> {
        self.socket.as_mut().ok_or(Error::Closed)
    }

    /// Reads into the I/O buffer until the socket would block or it's full.
    pub fn fill(&mut self) -> Result<Fill> {
        let socket = self.socket.as_mut().ok_or(Error::Closed)?;
        socket.fill(&mut self.io).map_err(Into::into)
    }

    /// Returns the number of unread body bytes.
    #[inline]
    pub fn body_left(&self) -> usize {
        self.body_len - self.body_read
    }

    /// Sends the contents of the I/O buffer.
    pub fn flush(&mut self) -> Result {
        let socket = self.socket.as_mut().ok_or(Error::Closed)?;
        socket.flush(&mut self.io).map_err(Into::into)
    }

    /// Buffers the given data, sending whenever the buffer fills up.
    ///
    /// Data that is at least as large as the buffer is sent directly.
    pub fn buffered(&mut self, data: &[u8]) -> Result {
        if data.len() >= self.io.capacity() {
            self.flush()?;
            return self.socket()?.send_all(data).map_err(Into::into);
        }

        // Copy as much as fits, flush, and copy the rest
        let n = self.io.push(data);
        if n < data.len() {
            self.flush()?;
            self.io.push(&data[n..]);
        }
        Ok(())
    }

    /// Discards the unread rest of the body.
    ///
    /// Bytes that were already buffered are skipped, and the remaining ones
    /// are read from the socket, so the next request or frame starts at the
    /// right position of the byte stream.
    pub fn discard_body(&mut self) -> Result {
        let buffered = self.pending.len().min(self.body_left());
        self.pending.start += buffered;
        self.body_read += buffered;

        // Read and drop whatever is still in flight
        let mut scratch = [0; 256];
        while self.body_left() > 0 {
            let n = self.body_left().min(scratch.len());
            self.socket()?.recv_exact(&mut scratch[..n])?;
            self.body_read += n;
        }
        Ok(())
    }

    /// Sends a non-final fragment with the current opcode.
    ///
    /// Subsequent fragments continue the same message. Failures mark the
    /// connection as no longer alive.
    pub fn send_fragment(&mut self, data: &[u8]) -> Result {
        let mut header = [0; 10];
        let size = encode_header(&mut header, self.opcode, data.len(), false);
        self.send_frame(&header[..size], data)?;
        self.opcode = Opcode::Continuation;
        Ok(())
    }

    /// Sends a complete, unfragmented frame.
    ///
    /// Failures mark the connection as no longer alive.
    pub fn send_frame(&mut self, header: &[u8], payload: &[u8]) -> Result {
        let mut io = Blocking::new(self)?;
        let res = io.socket().and_then(|socket| {
            socket.send_all(header)?;
            socket.send_all(payload).map_err(Into::into)
        });
        if res.is_err() {
            io.alive = false;
        }
        res
    }

    /// Enters blocking mode.
    pub fn enter_blocking(&mut self) -> Result {
        self.blocking += 1;
        if self.blocking == 1 {
            let res = self.socket().and_then(|socket| {
                socket.set_blocking(true).map_err(Into::into)
            });
            if let Err(err) = res {
                self.blocking = 0;
                self.alive = false;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Leaves blocking mode.
    ///
    /// Failures mark the connection as no longer alive.
    pub fn leave_blocking(&mut self) {
        if self.blocking == 0 {
            return;
        }
        self.blocking -= 1;
        if self.blocking == 0 {
            let res = self.socket.as_ref().map(|s| s.set_blocking(false));
            if !matches!(res, Some(Ok(()))) {
                self.alive = false;
            }
        }
    }
}

#[allow(clippy::must_use_candidate)]
impl Transport {
    /// Returns whether the socket is in blocking mode.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.blocking > 0
    }
}

// ----------------------------------------------------------------------------

impl<'t> Blocking<'t> {
    /// Enters blocking mode for the lifetime of the returned scope.
    pub fn new(inner: &'t mut Transport) -> Result<Self> {
        inner.enter_blocking().map(|()| Self { inner })
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl io::Write for Transport {
    /// Buffers the given data.
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffered(buf).map(|()| buf.len()).map_err(Into::into)
    }

    /// Sends the contents of the I/O buffer.
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Transport::flush(self).map_err(Into::into)
    }
}

// ----------------------------------------------------------------------------

impl Deref for Blocking<'_> {
    type Target = Transport;

    /// Dereferences to the transport.
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl DerefMut for Blocking<'_> {
    /// Dereferences mutably to the transport.
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
    }
}

impl Drop for Blocking<'_> {
    /// Leaves blocking mode.
    #[inline]
    fn drop(&mut self) {
        self.inner.leave_blocking();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};

    use super::*;

    fn transport() -> (TcpStream, Transport) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();
        let mut transport = Transport::new(0, 16);
        transport.open(Socket::new(stream).unwrap());
        (client, transport)
    }

    #[test]
    fn test_blocking_nests() {
        let (_client, mut transport) = transport();
        {
            let mut outer = Blocking::new(&mut transport).unwrap();
            {
                let inner = Blocking::new(&mut outer).unwrap();
                assert!(inner.is_blocking());
            }
            assert!(outer.is_blocking());
        }
        assert!(!transport.is_blocking());
        assert!(transport.alive);
    }

    #[test]
    fn test_blocking_without_socket_fails() {
        let mut transport = Transport::new(0, 16);
        transport.alive = true;
        assert!(matches!(Blocking::new(&mut transport), Err(Error::Closed)));
        assert!(!transport.alive);
        assert!(!transport.is_blocking());
    }

    #[test]
    fn test_pending_is_bounded_by_body() {
        let mut transport = Transport::new(0, 16);
        transport.begin_body(10..30, 5);
        assert_eq!(transport.pending, 10..15);
        assert_eq!(transport.body_left(), 5);
    }

    #[test]
    fn test_pending_with_huge_body_length() {
        let mut transport = Transport::new(0, 16);
        transport.begin_body(5..8, usize::MAX);
        assert_eq!(transport.pending, 5..8);
        assert_eq!(transport.body_left(), usize::MAX);
    }

    #[test]
    fn test_discard_body_skips_buffered_and_inflight() {
        use std::io::Write;

        let (mut client, mut transport) = transport();
        transport.begin_body(4..7, 8);
        client.write_all(b"12345next").unwrap();
        transport.enter_blocking().unwrap();
        transport.discard_body().unwrap();
        assert_eq!(transport.body_left(), 0);
        assert!(transport.pending.is_empty());

        // Only the in-flight part of the body was consumed
        let mut rest = [0; 4];
        transport.socket().unwrap().recv_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"next");
    }

    #[test]
    fn test_buffered_flushes_when_full() {
        use std::io::Read;

        let (mut client, mut transport) = transport();
        transport.enter_blocking().unwrap();
        transport.buffered(b"0123456789").unwrap();
        transport.buffered(b"abcdefghij").unwrap();
        assert_eq!(transport.io.as_slice(), b"ghij");
        transport.buffered(&[b'x'; 16]).unwrap();
        assert!(transport.io.is_empty());

        // The client sees all bytes in order
        let mut data = [0; 36];
        client.read_exact(&mut data).unwrap();
        assert_eq!(&data[..20], b"0123456789abcdefghij");
        assert_eq!(&data[20..], &[b'x'; 16]);
    }
}
