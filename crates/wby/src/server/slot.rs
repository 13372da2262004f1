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

//! Connection slot.

use mio::Token;
use std::io::ErrorKind;
use std::mem;
use std::net::TcpStream;
use tracing::{debug, trace};

use crate::buffer::Buffer;
use crate::handler::{Dispatch, Handler};
use crate::http::request::Head;
use crate::http::response::CONTINUE;
use crate::http::{Header, Request, Status};
use crate::websocket::{Frame, Opcode, PONG, handshake};

use super::connection::Connection;
use super::poller::Poller;
use super::socket::{Fill, Socket};
use super::transport::{Blocking, Transport};
use super::{Error, Result};

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// Connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Receiving the request head.
    Request,
    /// Sending the interim `100 Continue` response.
    SendContinue,
    /// Serving the request.
    Serve,
    /// Receiving WebSocket frames.
    WebSocket,
}

/// Outcome of a state transition.
enum Progress {
    /// Run the next state right away.
    Continue,
    /// Wait for the next readiness event.
    Wait,
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Connection slot.
///
/// Slots are allocated once, when the server starts, and are reused for all
/// connections the server accepts over its lifetime. Each slot owns the
/// buffers of its connection and drives its state machine.
pub struct Slot {
    /// Connection state.
    state: State,
    /// Header buffer.
    header: Buffer,
    /// Parsed request head.
    head: Head,
    /// Current WebSocket frame.
    frame: Frame,
    /// Transport.
    pub io: Transport,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Slot {
    /// Creates a slot with the given buffer sizes.
    pub fn new(id: usize, request_size: usize, io_size: usize) -> Self {
        Self {
            state: State::Request,
            header: Buffer::with_capacity(request_size),
            head: Head::new(),
            frame: Frame::default(),
            io: Transport::new(id, io_size),
        }
    }

    /// Returns the number of bytes a slot with the given buffer sizes takes.
    pub fn memory_size(request_size: usize, io_size: usize) -> usize {
        mem::size_of::<Self>() + request_size + io_size
    }

    /// Attaches a freshly accepted stream.
    pub fn open(&mut self, stream: TcpStream, poller: &Poller) -> Result {
        let socket = Socket::new(stream)?;
        socket.register(poller, Token(self.io.id + 1))?;
        self.state = State::Request;
        self.header.clear();
        self.frame = Frame::default();
        self.io.open(socket);
        Ok(())
    }

    /// Closes the connection and deregisters its socket.
    pub fn close(&mut self, poller: &Poller) {
        if let Some(socket) = self.io.take() {
            if let Err(err) = socket.deregister(poller) {
                debug!(connection = self.io.id, %err, "deregistration failed");
            }
            debug!(connection = self.io.id, "closed connection");
        }
    }

    /// Returns a handle on the connection.
    pub fn connection(&mut self) -> Connection<'_> {
        Connection::new(&self.header, &self.head, &mut self.io)
    }

    /// Advances the state machine until it has to wait for the socket.
    ///
    /// Errors are not returned, but close the connection, which is reaped by
    /// the server afterwards.
    pub fn update<H>(&mut self, handler: &mut H)
    where
        H: Handler,
    {
        while self.io.alive {
            let res = match self.state {
                State::Request => self.request(),
                State::SendContinue => self.send_continue(),
                State::Serve => self.serve(handler),
                State::WebSocket => self.websocket(handler),
            };
            match res {
                Ok(Progress::Continue) => {}
                Ok(Progress::Wait) => break,
                Err(err) => {
                    debug!(connection = self.io.id, %err, "closing connection");
                    self.io.alive = false;
                }
            }
        }
    }

    /// Receives and parses the request head.
    fn request(&mut self) -> Result<Progress> {
        let fill = self.io.socket()?.fill(&mut self.header)?;
        trace!(
            connection = self.io.id,
            used = self.header.len(),
            max = self.header.capacity(),
            "filled header buffer"
        );

        // Wait until the blank line after the headers arrived
        let Some(end) = find_terminator(self.header.as_slice()) else {
            return match fill {
                Fill::Full => Err(Error::HeaderOverflow),
                Fill::Closed => Err(Error::Closed),
                Fill::Pending => Ok(Progress::Wait),
            };
        };

        // Parse head, and note body bytes that arrived along with it
        let size = self.head.parse(&self.header.as_slice()[..end])?;
        let len = self.head.content_length();
        self.io.begin_body(size..self.header.len(), len);
        debug!(connection = self.io.id, size, len, "received request");

        // Clients may wait for permission to send the body
        let req = self.head.request(self.header.as_slice());
        if req.expects_continue() {
            debug!(connection = self.io.id, "sending 100 Continue");
            self.io.continue_left = CONTINUE.len();
            self.state = State::SendContinue;
        } else {
            self.state = State::Serve;
        }
        Ok(Progress::Continue)
    }

    /// Sends the interim response without blocking.
    fn send_continue(&mut self) -> Result<Progress> {
        while self.io.continue_left > 0 {
            let start = CONTINUE.len() - self.io.continue_left;
            match self.io.socket()?.send(&CONTINUE[start..]) {
                Ok(0) => return Err(Error::Closed),
                Ok(n) => self.io.continue_left -= n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(Progress::Wait);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.state = State::Serve;
        Ok(Progress::Continue)
    }

    /// Serves the request by handing it to the handler.
    fn serve<H>(&mut self, handler: &mut H) -> Result<Progress>
    where
        H: Handler,
    {
        self.io.io.clear();
        {
            let mut io = Blocking::new(&mut self.io)?;
            let mut conn = Connection::new(&self.header, &self.head, &mut io);
            let req = conn.request();
            if req.is_websocket_upgrade() {
                upgrade(handler, &mut conn, &req)?;
            } else if handler.dispatch(&mut conn)? == Dispatch::Unhandled {
                let text = format!("No handler for {}\r\n", req.uri);
                respond(&mut conn, Status::NotFound, &text)?;
            }

            // Send what the handler left in the buffer
            if io.alive && !io.io.is_empty() {
                io.flush()?;
            }
        }

        // Close the connection, or prepare for the next request or frame
        if !self.io.alive {
            return Ok(Progress::Continue);
        }
        if self.io.close_after_response {
            debug!(connection = self.io.id, "closing after response");
            self.io.alive = false;
            return Ok(Progress::Continue);
        }
        self.io.reset();
        if self.io.websocket {
            self.state = State::WebSocket;
        } else {
            self.header.clear();
            self.state = State::Request;
        }
        Ok(Progress::Continue)
    }

    /// Receives a WebSocket frame and hands it to the handler.
    fn websocket<H>(&mut self, handler: &mut H) -> Result<Progress>
    where
        H: Handler,
    {
        let frame = match Frame::decode(self.io.io.as_slice()) {
            Some(frame) => frame,
            None => {
                let fill = self.io.fill()?;
                trace!(
                    connection = self.io.id,
                    used = self.io.io.len(),
                    max = self.io.io.capacity(),
                    "filled frame buffer"
                );
                match Frame::decode(self.io.io.as_slice()) {
                    Some(frame) => frame,
                    None if fill == Fill::Closed => return Err(Error::Closed),
                    None => return Ok(Progress::Wait),
                }
            }
        };
        debug!(
            connection = self.io.id,
            opcode = %frame.opcode,
            len = frame.payload_len,
            "received frame"
        );

        // Note payload bytes that arrived along with the header
        let end = self
            .io
            .io
            .len()
            .min(frame.header_size.saturating_add(frame.payload_len));
        self.frame = frame;
        self.io.begin_body(frame.header_size..end, frame.payload_len);
        self.io.mask = frame.mask;
        {
            let mut io = Blocking::new(&mut self.io)?;
            match frame.opcode {
                Opcode::Close => io.alive = false,
                Opcode::Ping => io.socket()?.send_all(&PONG)?,
                _ => {
                    let mut conn =
                        Connection::new(&self.header, &self.head, &mut io);
                    handler.ws_frame(&mut conn, &self.frame)?;
                }
            }

            // Keep the byte stream aligned to the next frame
            if io.alive {
                io.discard_body()?;
            }
        }

        // Drop the frame, but keep bytes of the next one
        self.io.io.discard_front(end);
        self.io.mask = None;
        Ok(Progress::Continue)
    }
}

#[allow(clippy::must_use_candidate)]
impl Slot {
    /// Returns the connection state.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Returns the end of the request head, including the blank line.
fn find_terminator(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|n| n + 4)
}

/// Upgrades the connection to a WebSocket, if the handler agrees.
fn upgrade<H>(handler: &mut H, conn: &mut Connection, req: &Request) -> Result
where
    H: Handler,
{
    if !handler.ws_connect(conn) {
        let text = format!("WebSockets not supported at {}\r\n", req.uri);
        return respond(conn, Status::BadRequest, &text);
    }

    // Complete handshake, or answer with an error
    match handshake::check(req) {
        Ok(accept) => {
            debug!(connection = conn.id(), uri = %req.uri, "upgrading");
            conn.response_begin(
                Status::SwitchingProtocols.code(),
                Some(0),
                &[
                    (Header::Upgrade, "websocket"),
                    (Header::Connection, "Upgrade"),
                    (Header::SecWebSocketAccept, accept.as_str()),
                ],
            )?;
            conn.response_end()?;
            conn.set_websocket();
            handler.ws_connected(conn)
        }
        Err(err) => {
            debug!(connection = conn.id(), %err, "handshake failed");
            let text = "WebSockets could not be enabled\r\n";
            respond(conn, Status::BadRequest, text)
        }
    }
}

/// Responds with the given plain text, using chunked transfer encoding.
fn respond(conn: &mut Connection, status: Status, text: &str) -> Result {
    let headers = [(Header::ContentType, "text/plain")];
    conn.response_begin(status.code(), None, &headers)?;
    conn.write(text.as_bytes())?;
    conn.response_end()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
