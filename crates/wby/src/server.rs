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

//! HTTP and WebSocket server.

use mio::unix::SourceFd;
use mio::Waker;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::handler::Handler;
use super::websocket::{Opcode, encode_header};

mod builder;
mod connection;
mod error;
mod poller;
mod slot;
mod socket;
mod transport;

pub use builder::Builder;
pub use connection::{Connection, FrameWriter};
pub use error::{Error, Result};
use poller::{LISTENER, Poller, WAKER};
use slot::Slot;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// HTTP and WebSocket server.
///
/// The server is driven by calling [`Server::update`] in a loop, which waits
/// for readiness events, accepts new connections, and advances every ready
/// connection as far as possible without waiting for the network. Everything
/// happens on the calling thread, and connections are served one after the
/// other, in the order of the connection pool.
///
/// Connections live in a fixed pool of slots, whose buffers are allocated
/// once, when the server starts. When all slots are taken, new connections
/// wait in the backlog of the listener until a slot is freed.
///
/// # Examples
///
/// ```no_run
/// # use std::error::Error;
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use wby::handler::Dispatch;
/// use wby::server::{Connection, Result, Server};
///
/// // Respond with greeting
/// fn hello(conn: &mut Connection) -> Result<Dispatch> {
///     conn.response_begin(200, Some(14), &[("Content-Type", "text/plain")])?;
///     conn.write(b"Hello, world!\n")?;
///     conn.response_end()?;
///     Ok(Dispatch::Handled)
/// }
///
/// // Create server and serve forever
/// let mut server = Server::new(hello, "127.0.0.1:8080")?;
/// loop {
///     server.update()?;
/// }
/// # }
/// ```
pub struct Server<H>
where
    H: Handler,
{
    /// Handler for requests and WebSocket events.
    handler: H,
    /// Poller for I/O events.
    poller: Poller,
    /// Listening socket.
    listener: TcpListener,
    /// Connection slots, of which the first `count` are in use.
    slots: Vec<Slot>,
    /// Number of slots in use.
    count: usize,
    /// Whether the listener might have pending connections.
    backlog: bool,
    /// Poll timeout.
    timeout: Duration,
    /// Number of bytes allocated for connections.
    memory_size: usize,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl<H> Server<H>
where
    H: Handler,
{
    /// Creates a server with default settings.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the address can't be bound.
    #[inline]
    pub fn new<A>(handler: H, addr: A) -> Result<Self>
    where
        A: ToSocketAddrs,
    {
        Self::builder(handler).bind(addr)?.listen()
    }

    /// Creates a server builder.
    #[inline]
    #[must_use]
    pub fn builder(handler: H) -> Builder<H> {
        Builder::new(handler)
    }

    /// Runs one iteration of the server.
    ///
    /// This waits for readiness events until the timeout elapses, accepts as
    /// many connections as there are free slots, advances all connections
    /// that are ready, and finally reaps closed connections, which invokes
    /// [`Handler::ws_closed`] for WebSockets.
    ///
    /// # Errors
    ///
    /// This method only returns errors of the poller itself. Failing
    /// connections are closed, but don't affect the server.
    pub fn update(&mut self) -> Result {
        self.poller.poll(Some(self.timeout))?;

        // Mark slots with events as ready - as readiness is edge-triggered,
        // the listener must be drained until it would block, or new
        // connections might stay unnoticed until the next connection arrives
        let mut accept = self.backlog;
        for event in &self.poller {
            match event.token() {
                LISTENER => accept = true,
                WAKER => {}
                token => {
                    let id = usize::from(token) - 1;
                    let live = &mut self.slots[..self.count];
                    let slot = live.iter_mut().find(|s| s.io.id == id);
                    if let Some(slot) = slot {
                        slot.io.ready = true;
                    }
                }
            }
        }
        if accept {
            self.accept();
        }

        // Advance all ready connections in pool order
        for slot in &mut self.slots[..self.count] {
            if slot.io.ready || slot.io.fresh {
                slot.io.ready = false;
                slot.io.fresh = false;
                slot.update(&mut self.handler);
            }
        }

        // Reap closed connections
        self.reap();
        Ok(())
    }

    /// Sends a message to all WebSocket connections.
    ///
    /// The message is sent as a single, final frame. Connections that fail are
    /// closed during the next update. Returns the number of recipients.
    pub fn broadcast(&mut self, opcode: Opcode, payload: &[u8]) -> usize {
        let mut header = [0; 10];
        let size = encode_header(&mut header, opcode, payload.len(), true);

        // Send to all live WebSocket connections
        let mut count = 0;
        for slot in &mut self.slots[..self.count] {
            if !slot.io.alive || !slot.io.websocket {
                continue;
            }
            match slot.io.send_frame(&header[..size], payload) {
                Ok(()) => count += 1,
                Err(err) => {
                    debug!(connection = slot.io.id, %err, "broadcast failed");
                }
            }
        }
        count
    }

    /// Returns the waker, which interrupts a pending update from other
    /// threads.
    #[inline]
    #[must_use]
    pub fn waker(&self) -> Arc<Waker> {
        self.poller.waker()
    }

    /// Returns the address the server listens on.
    ///
    /// # Errors
    ///
    /// This method returns [`Error::Io`], if the address can't be obtained.
    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Returns a reference to the handler.
    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns a mutable reference to the handler.
    #[inline]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Stops the server, closing all connections and the listener, and
    /// returns the handler.
    ///
    /// WebSocket connections are reported to [`Handler::ws_closed`].
    pub fn stop(mut self) -> H {
        for slot in &mut self.slots[..self.count] {
            slot.io.alive = false;
        }
        self.reap();

        // Deregister listener, which is closed when dropped
        let fd = self.listener.as_raw_fd();
        if let Err(err) = self.poller.deregister(&mut SourceFd(&fd)) {
            debug!(%err, "deregistration failed");
        }
        debug!("stopped");
        self.handler
    }

    /// Accepts connections while there are free slots.
    fn accept(&mut self) {
        while self.count < self.slots.len() {
            let stream = match self.listener.accept() {
                Ok((stream, addr)) => {
                    debug!(%addr, "accepted connection");
                    stream
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    self.backlog = false;
                    return;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_transient(&err) => continue,
                Err(err) => {
                    // Keep the backlog flag, so accepting is retried during
                    // the next update instead of spinning here
                    warn!(%err, "accept failed");
                    self.backlog = true;
                    return;
                }
            };

            // Attach connection to the next free slot
            let slot = &mut self.slots[self.count];
            match slot.open(stream, &self.poller) {
                Ok(()) => self.count += 1,
                Err(err) => warn!(%err, "connection setup failed"),
            }
        }

        // All slots are taken, so connections might still be waiting
        self.backlog = true;
    }

    /// Closes connections that are no longer alive and compacts the pool.
    fn reap(&mut self) {
        let mut n = 0;
        while n < self.count {
            let slot = &mut self.slots[n];
            if slot.io.alive {
                n += 1;
                continue;
            }

            // Report closed WebSockets before the socket goes away
            if slot.io.websocket {
                self.handler.ws_closed(&mut slot.connection());
            }
            slot.close(&self.poller);

            // Move the slot behind the ones in use, preserving order
            self.slots[n..self.count].rotate_left(1);
            self.count -= 1;
        }
    }
}

#[allow(clippy::must_use_candidate)]
impl<H> Server<H>
where
    H: Handler,
{
    /// Returns the number of open connections.
    #[inline]
    pub fn connections(&self) -> usize {
        self.count
    }

    /// Returns the number of bytes allocated for connections.
    #[inline]
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Returns whether the error only affects a single connection attempt.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
    )
}
