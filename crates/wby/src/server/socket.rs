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

//! TCP socket.

use mio::unix::SourceFd;
use mio::{Interest, Token};
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsRawFd;

use crate::buffer::Buffer;

use super::poller::Poller;
use super::Result;

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Outcome of filling a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// Socket has no more data for now.
    Pending,
    /// Buffer is full.
    Full,
    /// Peer closed its side of the connection.
    Closed,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// TCP socket.
///
/// Sockets are non-blocking, unless a connection temporarily switches them to
/// blocking mode while a handler runs. Since readiness is edge-triggered, all
/// non-blocking operations must run until they would block, or the next event
/// for the socket might never arrive.
#[derive(Debug)]
pub struct Socket {
    /// TCP stream.
    stream: TcpStream,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Socket {
    /// Creates a non-blocking socket from the given stream.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Switches the socket between blocking and non-blocking mode.
    #[inline]
    pub fn set_blocking(&self, blocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(!blocking)
    }

    /// Reads into the buffer until the socket would block or it's full.
    pub fn fill(&mut self, buffer: &mut Buffer) -> io::Result<Fill> {
        loop {
            if buffer.is_full() {
                return Ok(Fill::Full);
            }
            match self.stream.read(buffer.spare_mut()) {
                Ok(0) => return Ok(Fill::Closed),
                Ok(n) => buffer.advance(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(Fill::Pending);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Reads exactly enough bytes to fill the given slice.
    #[inline]
    pub fn recv_exact(&mut self, data: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(data)
    }

    /// Sends as many bytes as possible and returns the count.
    #[inline]
    pub fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write(data)
    }

    /// Sends all given bytes.
    #[inline]
    pub fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    /// Sends the contents of the buffer and clears it.
    pub fn flush(&mut self, buffer: &mut Buffer) -> io::Result<()> {
        if !buffer.is_empty() {
            self.stream.write_all(buffer.as_slice())?;
            buffer.clear();
        }
        Ok(())
    }

    /// Registers the socket for readability and writability.
    pub fn register(&self, poller: &Poller, token: Token) -> Result {
        let fd = self.stream.as_raw_fd();
        let interest = Interest::READABLE | Interest::WRITABLE;
        poller.register(&mut SourceFd(&fd), token, interest)
    }

    /// Deregisters the socket.
    pub fn deregister(&self, poller: &Poller) -> Result {
        let fd = self.stream.as_raw_fd();
        poller.deregister(&mut SourceFd(&fd))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
