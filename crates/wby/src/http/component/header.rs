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

//! HTTP header.

use std::fmt;

// ----------------------------------------------------------------------------
// Trait implementations
// ----------------------------------------------------------------------------

impl AsRef<str> for Header {
    /// Returns the string representation.
    #[inline]
    fn as_ref(&self) -> &str {
        self.name()
    }
}

// ----------------------------------------------------------------------------

impl fmt::Display for Header {
    /// Formats the header for display.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Macros
// ----------------------------------------------------------------------------

/// Defines and implements HTTP headers.
macro_rules! define_and_impl_header {
    (
        $(
            // Header definition
            $(#[$comment:meta])*
            $name:ident = $header:expr
        ),+
        $(,)?
    ) => {
        /// HTTP header.
        ///
        /// This enum only lists the headers the engine itself inspects or
        /// emits. Requests keep all headers in arrival order, so any other
        /// header can still be looked up by its name as a string, since all
        /// lookups accept anything implementing [`AsRef<str>`].
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
        pub enum Header {
            $(
                $(#[$comment])*
                $name,
            )+
        }

        impl Header {
            /// Returns the header name.
            ///
            /// # Examples
            ///
            /// ```
            /// use wby::http::Header;
            ///
            /// // Obtain header name
            /// assert_eq!(Header::ContentLength.name(), "Content-Length");
            /// ```
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        Header::$name => $header,
                    )+
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------

define_and_impl_header! {
    /// Connection
    Connection = "Connection",
    /// Content-Length
    ContentLength = "Content-Length",
    /// Content-Type
    ContentType = "Content-Type",
    /// Expect
    Expect = "Expect",
    /// Host
    Host = "Host",
    /// Server
    Server = "Server",
    /// Transfer-Encoding
    TransferEncoding = "Transfer-Encoding",
    /// Upgrade
    Upgrade = "Upgrade",
    /// Sec-WebSocket-Accept
    SecWebSocketAccept = "Sec-WebSocket-Accept",
    /// Sec-WebSocket-Key
    SecWebSocketKey = "Sec-WebSocket-Key",
    /// Sec-WebSocket-Version
    SecWebSocketVersion = "Sec-WebSocket-Version",
}

impl Header {
    /// Returns whether the given name refers to this header.
    ///
    /// Header names are compared case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use wby::http::Header;
    ///
    /// // Compare header names
    /// assert!(Header::TransferEncoding.matches("transfer-encoding"));
    /// assert!(!Header::TransferEncoding.matches("Content-Length"));
    /// ```
    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }
}
