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

//! Server builder.

use mio::unix::SourceFd;
use mio::Interest;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::debug;

use crate::handler::Handler;
use crate::http::request;
use crate::websocket::MAX_HEADER_SIZE;

use super::poller::{LISTENER, Poller};
use super::slot::Slot;
use super::{Error, Result, Server};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Smallest request buffer, which holds a minimal request line and the
/// terminating blank line.
const MIN_REQUEST_BUFFER_SIZE: usize = 16;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Server builder.
///
/// All memory the server needs is allocated when [`Builder::listen`] is
/// invoked, and is sized by the settings of the builder. The total amount is
/// known upfront through [`Builder::memory_size`].
///
/// # Examples
///
/// ```
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use std::time::Duration;
/// use wby::handler::Dispatch;
/// use wby::server::{Connection, Result, Server};
///
/// // Define handler
/// fn handler(conn: &mut Connection) -> Result<Dispatch> {
///     Ok(Dispatch::Unhandled)
/// }
///
/// // Create server
/// let server = Server::builder(handler)
///     .bind("127.0.0.1:0")?
///     .connection_max(4)
///     .timeout(Duration::from_millis(10))
///     .listen()?;
/// # Ok(())
/// # }
/// ```
pub struct Builder<H> {
    /// Handler for requests and WebSocket events.
    handler: H,
    /// Socket addresses to bind to.
    addrs: Vec<SocketAddr>,
    /// Maximum number of connections.
    connection_max: usize,
    /// Size of the request buffer of each connection.
    request_buffer_size: usize,
    /// Size of the I/O buffer of each connection.
    io_buffer_size: usize,
    /// Poll timeout.
    timeout: Duration,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<H> Builder<H>
where
    H: Handler,
{
    /// Creates a server builder.
    ///
    /// Note that the canonical way to create a [`Server`] is to invoke the
    /// [`Server::builder`] method, which creates an instance of [`Builder`].
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            addrs: Vec::new(),
            connection_max: 8,
            request_buffer_size: 2048,
            io_buffer_size: 8192,
            timeout: Duration::from_millis(5),
        }
    }

    /// Adds a socket address to bind to.
    ///
    /// When several addresses are given, the server listens on the first one
    /// that can be bound.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the address can't be resolved.
    pub fn bind<A>(mut self, addr: A) -> Result<Self>
    where
        A: ToSocketAddrs,
    {
        // The underlying system call might return the same socket address
        // multiple times, which is why we need to deduplicate them
        for addr in addr.to_socket_addrs()? {
            if !self.addrs.contains(&addr) {
                self.addrs.push(addr);
            }
        }
        Ok(self)
    }

    /// Sets the maximum number of concurrent connections.
    #[inline]
    #[must_use]
    pub fn connection_max(mut self, connection_max: usize) -> Self {
        self.connection_max = connection_max;
        self
    }

    /// Sets the size of the request buffer, which must hold the request head.
    #[inline]
    #[must_use]
    pub fn request_buffer_size(mut self, size: usize) -> Self {
        self.request_buffer_size = size;
        self
    }

    /// Sets the size of the I/O buffer, which holds outgoing response data
    /// and incoming WebSocket frames.
    #[inline]
    #[must_use]
    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size;
        self
    }

    /// Sets the time [`Server::update`] waits for events.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the number of bytes the server allocates for connections.
    ///
    /// # Examples
    ///
    /// ```
    /// use wby::handler::Dispatch;
    /// use wby::server::{Connection, Result, Server};
    ///
    /// // Define handler
    /// fn handler(conn: &mut Connection) -> Result<Dispatch> {
    ///     Ok(Dispatch::Unhandled)
    /// }
    ///
    /// // Compare memory size
    /// let small = Server::builder(handler).connection_max(1);
    /// let large = Server::builder(handler).connection_max(2);
    /// assert_eq!(small.memory_size() * 2, large.memory_size());
    /// ```
    #[must_use]
    pub fn memory_size(&self) -> usize {
        let size =
            Slot::memory_size(self.request_buffer_size, self.io_buffer_size);
        self.connection_max * size
    }

    /// Creates the server and binds to the configured address.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::NoAddress`], if no address was given,
    /// [`Error::Config`], if a setting is out of range, and [`Error::Io`], if
    /// binding or registering the listener fails.
    pub fn listen(self) -> Result<Server<H>> {
        if self.addrs.is_empty() {
            return Err(Error::NoAddress);
        }
        if self.connection_max == 0 {
            return Err(Error::Config("at least one connection is required"));
        }
        if self.request_buffer_size < MIN_REQUEST_BUFFER_SIZE {
            return Err(Error::Config("request buffer too small"));
        }
        if self.io_buffer_size < MAX_HEADER_SIZE {
            return Err(Error::Config("I/O buffer too small"));
        }

        // Create poller, and bind and register the listener
        let poller = Poller::with_capacity(self.connection_max + 2)?;
        let listener = TcpListener::bind(&self.addrs[..])?;
        listener.set_nonblocking(true)?;
        let fd = listener.as_raw_fd();
        poller.register(&mut SourceFd(&fd), LISTENER, Interest::READABLE)?;

        // Allocate all connection slots upfront
        let slots = (0..self.connection_max)
            .map(|id| {
                Slot::new(id, self.request_buffer_size, self.io_buffer_size)
            })
            .collect();
        debug!(
            addr = %listener.local_addr()?,
            connections = self.connection_max,
            memory = self.memory_size(),
            max_headers = request::MAX_HEADERS,
            "listening"
        );

        // Return server
        Ok(Server {
            memory_size: self.memory_size(),
            handler: self.handler,
            poller,
            listener,
            slots,
            count: 0,
            backlog: false,
            timeout: self.timeout,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
