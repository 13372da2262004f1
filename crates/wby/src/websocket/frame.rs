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

//! WebSocket frame.

use std::fmt;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Maximum size of a frame header, including the mask key.
pub const MAX_HEADER_SIZE: usize = 14;

/// Reply to a ping, which is an empty and final pong frame.
pub const PONG: [u8; 3] = [0x80, 0x0A, 0x00];

// ----------------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------------

/// WebSocket opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// Text message.
    Text,
    /// Binary message.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
    /// Reserved opcode, carrying its 4-bit value.
    Reserved(u8),
}

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// WebSocket frame header.
///
/// A frame is decoded from the start of the I/O buffer of a connection, as
/// soon as enough bytes arrived to hold the complete header. The payload is
/// not part of the frame, but is read through the connection afterwards.
///
/// # Examples
///
/// ```
/// use wby::websocket::{Frame, Opcode};
///
/// // Decode masked text frame header
/// let bytes = [0x81, 0x85, 1, 2, 3, 4];
/// let frame = Frame::decode(&bytes).unwrap();
/// assert!(frame.fin);
/// assert_eq!(frame.opcode, Opcode::Text);
/// assert_eq!(frame.mask, Some([1, 2, 3, 4]));
/// assert_eq!(frame.header_size, 6);
/// assert_eq!(frame.payload_len, 5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Whether this is the final fragment of a message.
    pub fin: bool,
    /// Mask key, if the payload is masked.
    pub mask: Option<[u8; 4]>,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Number of header bytes.
    pub header_size: usize,
    /// Number of payload bytes.
    pub payload_len: usize,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Frame {
    /// Decodes a frame header from the start of the given bytes.
    ///
    /// Returns [`None`] as long as the bytes don't contain the full header.
    /// Lengths encoded in 64 bits are read into a 32-bit accumulator, so only
    /// the low 32 bits are honored, and payloads of 4 GiB or more are not
    /// supported.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let [first, second, ..] = *bytes else {
            return None;
        };

        // Compute header size from length code and mask bit
        let code = second & 0x7F;
        let masked = second & 0x80 != 0;
        let extra = match code {
            126 => 2,
            127 => 8,
            _ => 0,
        };
        let header_size = 2 + extra + if masked { 4 } else { 0 };
        if bytes.len() < header_size {
            return None;
        }

        // Read extended payload length, if any
        let payload_len = match code {
            126 => usize::from(u16::from_be_bytes([bytes[2], bytes[3]])),
            127 => {
                let acc = bytes[2..10]
                    .iter()
                    .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));
                acc as usize
            }
            len => usize::from(len),
        };

        // Read mask key, which follows the length
        let mask = masked.then(|| {
            let at = 2 + extra;
            [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
        });

        // Return frame header
        Some(Self {
            fin: first & 0x80 != 0,
            mask,
            opcode: Opcode::from(first & 0x0F),
            header_size,
            payload_len,
        })
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl Default for Frame {
    /// Creates an empty final frame.
    #[inline]
    fn default() -> Self {
        Self {
            fin: true,
            mask: None,
            opcode: Opcode::Continuation,
            header_size: 0,
            payload_len: 0,
        }
    }
}

// ----------------------------------------------------------------------------

impl From<u8> for Opcode {
    /// Creates an opcode from the low nibble of the given byte.
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0 => Opcode::Continuation,
            1 => Opcode::Text,
            2 => Opcode::Binary,
            8 => Opcode::Close,
            9 => Opcode::Ping,
            10 => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    /// Returns the 4-bit value of the opcode.
    fn from(opcode: Opcode) -> u8 {
        match opcode {
            Opcode::Continuation => 0,
            Opcode::Text => 1,
            Opcode::Binary => 2,
            Opcode::Close => 8,
            Opcode::Ping => 9,
            Opcode::Pong => 10,
            Opcode::Reserved(value) => value & 0x0F,
        }
    }
}

// ----------------------------------------------------------------------------

impl fmt::Display for Opcode {
    /// Formats the opcode for display.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opcode::Continuation => f.write_str("continuation"),
            Opcode::Text => f.write_str("text"),
            Opcode::Binary => f.write_str("binary"),
            Opcode::Close => f.write_str("close"),
            Opcode::Ping => f.write_str("ping"),
            Opcode::Pong => f.write_str("pong"),
            Opcode::Reserved(value) => write!(f, "reserved ({value:#x})"),
        }
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Encodes an unmasked frame header and returns its size.
///
/// The header takes 2 bytes for payloads shorter than 126 bytes, 4 bytes for
/// payloads shorter than 64 KiB, and 10 bytes otherwise.
///
/// # Examples
///
/// ```
/// use wby::websocket::{encode_header, Opcode};
///
/// // Encode header of final text frame
/// let mut header = [0; 10];
/// let size = encode_header(&mut header, Opcode::Text, 5, true);
/// assert_eq!(&header[..size], &[0x81, 0x05]);
/// ```
pub fn encode_header(
    header: &mut [u8; 10], opcode: Opcode, len: usize, fin: bool,
) -> usize {
    header[0] = u8::from(opcode) | if fin { 0x80 } else { 0x00 };
    if len < 126 {
        #[allow(clippy::cast_possible_truncation)]
        let code = len as u8;
        header[1] = code;
        2
    } else if let Ok(len) = u16::try_from(len) {
        header[1] = 126;
        header[2..4].copy_from_slice(&len.to_be_bytes());
        4
    } else {
        header[1] = 127;
        header[2..10].copy_from_slice(&(len as u64).to_be_bytes());
        10
    }
}

/// Applies the mask key to the given payload bytes.
///
/// The offset is the position of the first byte within the payload, so a
/// payload can be unmasked in several calls. Masking is its own inverse.
///
/// # Examples
///
/// ```
/// use wby::websocket::apply_mask;
///
/// // Mask and unmask payload in two steps
/// let key = [0x37, 0xfa, 0x21, 0x3d];
/// let mut data = *b"Hello";
/// apply_mask(&mut data, key, 0);
/// apply_mask(&mut data[..2], key, 0);
/// apply_mask(&mut data[2..], key, 2);
/// assert_eq!(&data, b"Hello");
/// ```
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    for (n, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + n) % 4];
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        let mut header = [0; 10];
        for (len, size) in [
            (0, 2),
            (125, 2),
            (126, 4),
            (65_535, 4),
            (65_536, 10),
            (1 << 20, 10),
        ] {
            let n = encode_header(&mut header, Opcode::Binary, len, true);
            assert_eq!(n, size);
            assert_eq!(header[1] & 0x80, 0);
        }
    }

    #[test]
    fn test_encode_then_decode_lengths() {
        let mut header = [0; 10];
        for len in [3, 300, 70_000] {
            let size = encode_header(&mut header, Opcode::Text, len, false);
            let frame = Frame::decode(&header[..size]).unwrap();
            assert!(!frame.fin);
            assert_eq!(frame.mask, None);
            assert_eq!(frame.header_size, size);
            assert_eq!(frame.payload_len, len);
        }
    }

    #[test]
    fn test_decode_waits_for_full_header() {
        let bytes = [0x82, 0xFE, 0x01, 0x00, 9, 9, 9, 9];
        for end in 0..bytes.len() {
            assert_eq!(Frame::decode(&bytes[..end]), None);
        }
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload_len, 256);
        assert_eq!(frame.mask, Some([9; 4]));
        assert_eq!(frame.header_size, 8);
    }

    #[test]
    fn test_decode_keeps_low_32_bits() {
        let bytes = [0x82, 0x7F, 0, 0, 0, 1, 0, 0, 0, 7];
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload_len, 7);
    }

    #[test]
    fn test_mask_is_involution() {
        let key = [0xde, 0xad, 0xbe, 0xef];
        let payload: Vec<u8> = (0..=255).collect();
        let mut data = payload.clone();
        apply_mask(&mut data, key, 0);
        assert_ne!(data, payload);
        apply_mask(&mut data, key, 0);
        assert_eq!(data, payload);
    }

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(Opcode::from(0x89), Opcode::Ping);
        assert_eq!(Opcode::from(3), Opcode::Reserved(3));
        assert_eq!(u8::from(Opcode::Pong), 10);
        assert_eq!(Frame::decode(&PONG[..2]).unwrap().opcode, Opcode::Pong);
    }
}
