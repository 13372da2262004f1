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

//! End-to-end tests against a live server on the loopback interface.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;

use tungstenite::Message;
use wby::handler::{Dispatch, Handler};
use wby::http::request::MAX_HEADERS;
use wby::server::{Builder, Connection, Error, Result, Server};
use wby::websocket::{Frame, Opcode, apply_mask, encode_header};

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Handler that counts requests and echoes WebSocket messages.
#[derive(Default)]
struct Echo {
    /// Whether upgrades are accepted.
    accept: bool,
    /// Number of dispatched requests.
    requests: usize,
    /// Number of completed handshakes.
    connected: usize,
    /// Number of received frames.
    frames: usize,
    /// Number of closed WebSockets.
    closed: usize,
    /// Number of plain writes refused on WebSockets.
    refused: usize,
}

/// WebSocket client that reads and writes raw frames.
struct RawClient {
    /// Client stream.
    stream: TcpStream,
    /// Received bytes not yet consumed.
    data: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Handler for Echo {
    fn dispatch(&mut self, conn: &mut Connection) -> Result<Dispatch> {
        self.requests += 1;
        if conn.request().uri != "/echo" {
            return Ok(Dispatch::Unhandled);
        }

        // Send the request body back
        let mut body = vec![0; conn.request().content_length];
        conn.read(&mut body)?;
        let headers = [("Content-Type", "text/plain")];
        conn.response_begin(200, Some(body.len()), &headers)?;
        conn.write(&body)?;
        conn.response_end()?;
        Ok(Dispatch::Handled)
    }

    fn ws_connect(&mut self, conn: &Connection) -> bool {
        self.accept && conn.request().uri == "/ws"
    }

    fn ws_connected(&mut self, conn: &mut Connection) -> Result {
        self.connected += 1;
        let mut writer = conn.frame_begin(Opcode::Text)?;
        writer.write(b"welcome")?;
        writer.end()
    }

    fn ws_frame(&mut self, conn: &mut Connection, frame: &Frame) -> Result {
        self.frames += 1;
        let mut payload = vec![0; frame.payload_len];
        conn.read(&mut payload)?;
        if matches!(conn.write(b"raw"), Err(Error::NotServing)) {
            self.refused += 1;
        }

        // Echo in two fragments, so the client has to reassemble them
        let (head, tail) = payload.split_at(payload.len() / 2);
        let mut writer = conn.frame_begin(frame.opcode)?;
        writer.write(head)?;
        writer.write(tail)?;
        writer.end()
    }

    fn ws_closed(&mut self, _conn: &mut Connection) {
        self.closed += 1;
    }
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl RawClient {
    /// Connects and completes the opening handshake.
    fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  Sec-WebSocket-Version: 13\r\n\r\n",
            )
            .unwrap();

        // Split off the response head, frames may follow right away
        let mut client = Self { stream, data: Vec::new() };
        let end = loop {
            let mut windows = client.data.windows(4);
            if let Some(n) = windows.position(|w| w == b"\r\n\r\n") {
                break n + 4;
            }
            client.receive();
        };
        let head: Vec<u8> = client.data.drain(..end).collect();
        assert!(head.starts_with(b"HTTP/1.1 101 "));
        client
    }

    /// Receives more data from the server.
    fn receive(&mut self) {
        let mut buffer = [0; 4096];
        let n = self.stream.read(&mut buffer).unwrap();
        assert!(n > 0, "connection closed early");
        self.data.extend_from_slice(&buffer[..n]);
    }

    /// Reads the next message, and reassembles its fragments.
    fn read_message(&mut self) -> (Opcode, Vec<u8>) {
        let mut opcode = None;
        let mut payload = Vec::new();
        loop {
            let Some(frame) = Frame::decode(&self.data) else {
                self.receive();
                continue;
            };
            let end = frame.header_size + frame.payload_len;
            if self.data.len() < end {
                self.receive();
                continue;
            }

            // Server frames are never masked
            assert_eq!(frame.mask, None);
            payload.extend_from_slice(&self.data[frame.header_size..end]);
            self.data.drain(..end);
            let first = *opcode.get_or_insert(frame.opcode);
            if frame.fin {
                return (first, payload);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Encodes a final, masked client frame.
fn masked_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let key = [0x37, 0xFA, 0x21, 0x3D];
    let mut header = [0; 10];
    let size = encode_header(&mut header, opcode, payload.len(), true);
    header[1] |= 0x80;

    // Header, mask key, and masked payload
    let mut frame = header[..size].to_vec();
    frame.extend_from_slice(&key);
    let start = frame.len();
    frame.extend_from_slice(payload);
    apply_mask(&mut frame[start..], key, 0);
    frame
}

/// Returns a payload of the given length, with a non-repeating mask pattern.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|n| u8::try_from(n % 251).unwrap()).collect()
}

/// Responds with a fixed greeting.
fn hello(conn: &mut Connection) -> Result<Dispatch> {
    let headers: [(&str, &str); 0] = [];
    conn.response_begin(200, Some(14), &headers)?;
    conn.write(b"Hello, world!\n")?;
    conn.response_end()?;
    Ok(Dispatch::Handled)
}

/// Responds with a body of unknown length.
fn chunked(conn: &mut Connection) -> Result<Dispatch> {
    let headers = [("Content-Type", "text/plain")];
    conn.response_begin(200, None, &headers)?;
    for part in [&b"Hello, "[..], b"", b"world!\n"] {
        conn.write(part)?;
    }
    conn.response_end()?;
    Ok(Dispatch::Handled)
}

/// Drives the server until the client is done, and returns its result.
fn run<H, F, T>(mut server: Server<H>, client: F) -> (Server<H>, T)
where
    H: Handler,
    F: FnOnce(SocketAddr) -> T + Send + 'static,
    T: Send + 'static,
{
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();

    // Serve until the client thread finishes, then reap what's left
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || client(addr));
    while !handle.is_finished() {
        server.update().unwrap();
    }
    for _ in 0..4 {
        server.update().unwrap();
    }
    (server, handle.join().unwrap())
}

/// Creates a builder bound to an ephemeral loopback port.
fn builder<H>(handler: H) -> Builder<H>
where
    H: Handler,
{
    Server::builder(handler).bind("127.0.0.1:0").unwrap()
}

/// Sends a request and reads until the server closes the connection.
fn exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    String::from_utf8(response).unwrap()
}

/// Reads until the received data ends with the given suffix.
fn read_until(stream: &mut TcpStream, suffix: &str) -> String {
    let mut response = Vec::new();
    let mut buffer = [0; 256];
    while !response.ends_with(suffix.as_bytes()) {
        let n = stream.read(&mut buffer).unwrap();
        assert!(n > 0, "connection closed early");
        response.extend_from_slice(&buffer[..n]);
    }
    String::from_utf8(response).unwrap()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[test]
fn test_response_with_content_length() {
    let server = builder(hello).listen().unwrap();
    let (_, response) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"GET /foo HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        read_until(&mut stream, "world!\n")
    });
    assert_eq!(
        response,
        "HTTP/1.1 200 OK\r\n\
         Content-Length: 14\r\n\
         Server: wby\r\n\
         \r\n\
         Hello, world!\n"
    );
}

#[test]
fn test_response_closes_on_request() {
    let server = builder(hello).listen().unwrap();
    let (server, response) = run(server, |addr| {
        exchange(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
    });
    assert!(response.contains("Server: wby\r\nConnection: close\r\n\r\n"));
    assert_eq!(response.matches("Connection").count(), 1);
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_chunked_response() {
    let server = builder(chunked).listen().unwrap();
    let (_, response) = run(server, |addr| {
        exchange(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
    });
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!response.contains("Content-Length"));
    assert!(
        response.ends_with("7\r\nHello, \r\n7\r\nworld!\n\r\n0\r\n\r\n")
    );
}

#[test]
fn test_keep_alive() {
    let server = builder(hello).listen().unwrap();
    let (server, responses) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut responses = Vec::new();
        for _ in 0..3 {
            stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
            responses.push(read_until(&mut stream, "world!\n"));
        }
        responses
    });
    assert!(responses.iter().all(|r| r.starts_with("HTTP/1.1 200 OK")));
    assert!(responses.iter().all(|r| !r.contains("Connection: close")));
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_unhandled_request() {
    let server = builder(Echo::default()).listen().unwrap();
    let (server, response) = run(server, |addr| {
        exchange(addr, "GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n")
    });
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("No handler for /missing\r\n"));
    assert!(response.ends_with("0\r\n\r\n"));
    assert_eq!(server.handler().requests, 1);
}

#[test]
fn test_body_sent_with_head() {
    let server = builder(Echo::default()).listen().unwrap();
    let (_, response) = run(server, |addr| {
        exchange(
            addr,
            "POST /echo HTTP/1.1\r\n\
             Content-Length: 11\r\n\
             Connection: close\r\n\
             \r\n\
             hello world",
        )
    });
    assert!(response.contains("Content-Length: 11\r\n"));
    assert!(response.ends_with("\r\n\r\nhello world"));
}

#[test]
fn test_expect_continue() {
    let server = builder(Echo::default()).listen().unwrap();
    let (_, (interim, response)) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"POST /echo HTTP/1.1\r\n\
                  Content-Length: 5\r\n\
                  Expect: 100-continue\r\n\
                  Connection: close\r\n\
                  \r\n",
            )
            .unwrap();

        // Only send the body after the server agreed
        let interim = read_until(&mut stream, "\r\n\r\n");
        stream.write_all(b"hello").unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
        (interim, response)
    });
    assert_eq!(interim, "HTTP/1.1 100 Continue\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("hello"));
}

#[test]
fn test_unread_body_is_discarded() {
    let server = builder(hello).listen().unwrap();
    let (_, responses) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody")
            .unwrap();
        let first = read_until(&mut stream, "world!\n");
        stream
            .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut second = String::new();
        let _ = stream.read_to_string(&mut second);
        (first, second)
    });
    assert!(responses.0.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(responses.1.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn test_huge_content_length() {
    let server = builder(hello).listen().unwrap();
    let (_, response) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"POST / HTTP/1.1\r\n\
                  Content-Length: 18446744073709551615\r\n\r\nabc",
            )
            .unwrap();

        // The body never completes, so the server gives up once we're done
        stream.shutdown(Shutdown::Write).unwrap();
        let _ = stream.read_to_end(&mut Vec::new());
        exchange(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
    });
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("world!\n"));
}

#[test]
fn test_header_overflow_closes_connection() {
    let server = builder(Echo::default())
        .request_buffer_size(64)
        .listen()
        .unwrap();
    let (server, response) = run(server, |addr| {
        let padding = "a".repeat(100);
        exchange(addr, &format!("GET / HTTP/1.1\r\nX-Padding: {padding}"))
    });
    assert!(response.is_empty());
    assert_eq!(server.handler().requests, 0);
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_too_many_headers_closes_connection() {
    let server = builder(Echo::default())
        .request_buffer_size(4096)
        .listen()
        .unwrap();
    let (server, response) = run(server, |addr| {
        let mut request = String::from("GET / HTTP/1.1\r\n");
        for n in 0..=MAX_HEADERS {
            request.push_str(&format!("X-{n}: {n}\r\n"));
        }
        request.push_str("\r\n");
        exchange(addr, &request)
    });
    assert!(response.is_empty());
    assert_eq!(server.handler().requests, 0);
}

#[test]
fn test_websocket_echo() {
    let handler = Echo { accept: true, ..Echo::default() };
    let server = builder(handler).listen().unwrap();
    let (server, messages) = run(server, |addr| {
        let stream = TcpStream::connect(addr).unwrap();
        let (mut ws, response) =
            tungstenite::client(format!("ws://{addr}/ws"), stream).unwrap();
        assert_eq!(response.status(), 101);

        // Receive greeting, then echo text and binary messages
        let mut messages = vec![ws.read().unwrap()];
        ws.send(Message::text("hello there")).unwrap();
        messages.push(ws.read().unwrap());
        ws.send(Message::binary(vec![1, 2, 3, 4, 5])).unwrap();
        messages.push(ws.read().unwrap());
        ws.send(Message::Ping(Default::default())).unwrap();
        messages.push(ws.read().unwrap());

        // Close, and wait for the server to go away
        ws.close(None).unwrap();
        while ws.read().is_ok() {}
        messages
    });
    assert_eq!(messages[0], Message::text("welcome"));
    assert_eq!(messages[1], Message::text("hello there"));
    assert_eq!(messages[2], Message::binary(vec![1, 2, 3, 4, 5]));
    assert!(matches!(messages[3], Message::Pong(_)));

    // Pings and closes never reach the handler
    let handler = server.handler();
    assert_eq!(handler.connected, 1);
    assert_eq!(handler.frames, 2);
    assert_eq!(handler.refused, 2);
    assert_eq!(handler.closed, 1);
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_websocket_payload_larger_than_buffer() {
    let handler = Echo { accept: true, ..Echo::default() };
    let server = builder(handler).io_buffer_size(64).listen().unwrap();
    let (server, echo) = run(server, |addr| {
        let mut client = RawClient::connect(addr);
        assert_eq!(client.read_message(), (Opcode::Text, b"welcome".to_vec()));

        // Unmasking continues across buffered and directly received bytes
        let frame = masked_frame(Opcode::Binary, &payload(1000));
        assert_eq!(frame[1], 0x80 | 126);
        client.stream.write_all(&frame).unwrap();
        client.read_message()
    });
    assert_eq!(echo, (Opcode::Binary, payload(1000)));
    assert_eq!(server.handler().frames, 1);
}

#[test]
fn test_websocket_frames_in_one_read() {
    let handler = Echo { accept: true, ..Echo::default() };
    let server = builder(handler).listen().unwrap();
    let (server, echoes) = run(server, |addr| {
        let mut client = RawClient::connect(addr);
        assert_eq!(client.read_message(), (Opcode::Text, b"welcome".to_vec()));

        // Both frames are sent with a single write
        let mut frames = masked_frame(Opcode::Text, b"first");
        frames.extend(masked_frame(Opcode::Binary, b"second"));
        client.stream.write_all(&frames).unwrap();
        [client.read_message(), client.read_message()]
    });
    assert_eq!(echoes[0], (Opcode::Text, b"first".to_vec()));
    assert_eq!(echoes[1], (Opcode::Binary, b"second".to_vec()));
    assert_eq!(server.handler().frames, 2);
}

#[test]
fn test_websocket_64_bit_length() {
    let handler = Echo { accept: true, ..Echo::default() };
    let server = builder(handler).listen().unwrap();
    let (server, echo) = run(server, |addr| {
        let mut client = RawClient::connect(addr);
        assert_eq!(client.read_message(), (Opcode::Text, b"welcome".to_vec()));

        // Payloads beyond 16 bits need the 64-bit length code
        let frame = masked_frame(Opcode::Binary, &payload(70_000));
        assert_eq!(frame[1], 0x80 | 127);
        client.stream.write_all(&frame).unwrap();
        client.read_message()
    });
    assert_eq!(echo, (Opcode::Binary, payload(70_000)));
    assert_eq!(server.handler().frames, 1);
}

#[test]
fn test_websocket_refused() {
    let server = builder(Echo::default()).listen().unwrap();
    let (server, response) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                  Connection: Upgrade\r\n\
                  Upgrade: websocket\r\n\
                  Sec-WebSocket-Version: 13\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  \r\n",
            )
            .unwrap();
        read_until(&mut stream, "0\r\n\r\n")
    });
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.contains("WebSockets not supported at /ws\r\n"));
    assert_eq!(server.handler().connected, 0);
}

#[test]
fn test_websocket_unsupported_version() {
    let handler = Echo { accept: true, ..Echo::default() };
    let server = builder(handler).listen().unwrap();
    let (server, response) = run(server, |addr| {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(
                b"GET /ws HTTP/1.1\r\n\
                  Connection: keep-alive, Upgrade\r\n\
                  Upgrade: WebSocket\r\n\
                  Sec-WebSocket-Version: 8\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                  \r\n",
            )
            .unwrap();
        read_until(&mut stream, "0\r\n\r\n")
    });
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.contains("WebSockets could not be enabled\r\n"));
    assert_eq!(server.handler().connected, 0);
}

#[test]
fn test_broadcast() {
    let handler = Echo { accept: true, ..Echo::default() };
    let mut server = builder(handler).listen().unwrap();
    let addr = server.local_addr().unwrap();
    let client = thread::spawn(move || {
        let stream = TcpStream::connect(addr).unwrap();
        let (mut ws, _) =
            tungstenite::client(format!("ws://{addr}/ws"), stream).unwrap();
        let greeting = ws.read().unwrap();
        let news = ws.read().unwrap();
        (greeting, news)
    });

    // Broadcast once the handshake completed
    let mut recipients = 0;
    while !client.is_finished() {
        server.update().unwrap();
        if recipients == 0 && server.handler().connected == 1 {
            recipients = server.broadcast(Opcode::Text, b"news");
        }
    }
    let (greeting, news) = client.join().unwrap();
    assert_eq!(recipients, 1);
    assert_eq!(greeting, Message::text("welcome"));
    assert_eq!(news, Message::text("news"));
}

#[test]
fn test_connection_limit() {
    let server = builder(hello).connection_max(1).listen().unwrap();
    let (server, responses) = run(server, |addr| {
        let mut first = TcpStream::connect(addr).unwrap();
        first.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let a = read_until(&mut first, "world!\n");

        // The second connection waits in the backlog until the first closes
        let mut second = TcpStream::connect(addr).unwrap();
        second
            .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();
        drop(first);
        let mut b = String::new();
        let _ = second.read_to_string(&mut b);
        (a, b)
    });
    assert!(responses.0.ends_with("world!\n"));
    assert!(responses.1.ends_with("world!\n"));
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_stop_reports_open_websockets() {
    let handler = Echo { accept: true, ..Echo::default() };
    let mut server = builder(handler).listen().unwrap();
    let addr = server.local_addr().unwrap();
    let client = thread::spawn(move || {
        let stream = TcpStream::connect(addr).unwrap();
        let (mut ws, _) =
            tungstenite::client(format!("ws://{addr}/ws"), stream).unwrap();
        ws.read().unwrap()
    });
    while !client.is_finished() {
        server.update().unwrap();
    }
    assert_eq!(client.join().unwrap(), Message::text("welcome"));
    assert_eq!(server.connections(), 1);

    // Stopping reports the open WebSocket and hands back the handler
    server.handler_mut().frames = 42;
    let handler = server.stop();
    assert_eq!(handler.closed, 1);
    assert_eq!(handler.frames, 42);
}
