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

//! Fixed-capacity byte buffer.

use std::fmt;

// ----------------------------------------------------------------------------
// Structs
// ----------------------------------------------------------------------------

/// Fixed-capacity byte buffer.
///
/// Buffers are allocated exactly once, when the server starts, and are never
/// resized afterwards. The number of used bytes can never exceed the capacity,
/// so all operations that add data copy as much as fits and report how much
/// was actually taken.
///
/// # Examples
///
/// ```
/// use wby::buffer::Buffer;
///
/// // Create buffer and push data
/// let mut buffer = Buffer::with_capacity(4);
/// assert_eq!(buffer.push(b"Hello"), 4);
/// assert!(buffer.is_full());
/// assert_eq!(buffer.as_slice(), b"Hell");
/// ```
pub struct Buffer {
    /// Backing storage.
    data: Box<[u8]>,
    /// Number of used bytes.
    used: usize,
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------

impl Buffer {
    /// Creates a buffer with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Returns the used part of the buffer.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Returns the unused part of the buffer for writing.
    ///
    /// Bytes written into the returned slice only become part of the buffer
    /// after calling [`Buffer::advance`].
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.used..]
    }

    /// Marks the given number of spare bytes as used.
    ///
    /// The count is clamped to the remaining space.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        debug_assert!(count <= self.remaining());
        self.used += count.min(self.remaining());
    }

    /// Copies as much of the given data as fits and returns the count.
    ///
    /// # Examples
    ///
    /// ```
    /// use wby::buffer::Buffer;
    ///
    /// // Create buffer and push data twice
    /// let mut buffer = Buffer::with_capacity(8);
    /// assert_eq!(buffer.push(b"Hello"), 5);
    /// assert_eq!(buffer.push(b", world"), 3);
    /// ```
    pub fn push(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.remaining());
        self.data[self.used..self.used + count]
            .copy_from_slice(&data[..count]);
        self.used += count;
        count
    }

    /// Drops the first bytes and moves the rest to the front.
    ///
    /// This keeps bytes that already belong to the next message, e.g., when
    /// a client sent several WebSocket frames at once.
    pub fn discard_front(&mut self, count: usize) {
        let count = count.min(self.used);
        self.data.copy_within(count..self.used, 0);
        self.used -= count;
    }

    /// Clears the buffer.
    #[inline]
    pub fn clear(&mut self) {
        self.used = 0;
    }
}

#[allow(clippy::must_use_candidate)]
impl Buffer {
    /// Returns the number of used bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    /// Returns whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Returns the capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of bytes that can still be added.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.used
    }

    /// Returns whether the buffer is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == self.data.len()
    }
}

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl fmt::Debug for Buffer {
    /// Formats the buffer for debugging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("used", &self.used)
            .field("max", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_never_exceeds_capacity() {
        let mut buffer = Buffer::with_capacity(10);
        for chunk in [&b"abcd"[..], b"efgh", b"ijkl", b"mnop"] {
            buffer.push(chunk);
            assert!(buffer.len() <= buffer.capacity());
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.push(b"q"), 0);
        assert_eq!(buffer.as_slice(), b"abcdefghij");
    }

    #[test]
    fn test_spare_and_advance() {
        let mut buffer = Buffer::with_capacity(6);
        buffer.spare_mut()[..3].copy_from_slice(b"abc");
        buffer.advance(3);
        assert_eq!(buffer.as_slice(), b"abc");
        assert_eq!(buffer.remaining(), 3);
        assert_eq!(buffer.spare_mut().len(), 3);
    }

    #[test]
    fn test_discard_front_keeps_tail() {
        let mut buffer = Buffer::with_capacity(8);
        buffer.push(b"frame1f2");
        buffer.discard_front(6);
        assert_eq!(buffer.as_slice(), b"f2");
        buffer.discard_front(100);
        assert!(buffer.is_empty());
    }
}
