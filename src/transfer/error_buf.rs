use std::fmt;

/// Capacity of [`ErrorBuffer`], matching libcurl's `CURL_ERROR_SIZE`.
pub const ERROR_BUFFER_SIZE: usize = 256;

/// Fixed-capacity storage for a transport error message.
///
/// Lives inline in its request for the whole transfer and is written only
/// when the transfer fails. Messages longer than [`ERROR_BUFFER_SIZE`] are
/// truncated on a character boundary.
pub struct ErrorBuffer {
    buf: [u8; ERROR_BUFFER_SIZE],
    len: usize,
}

impl ErrorBuffer {
    #[inline]
    pub const fn new() -> Self {
        Self {
            buf: [0; ERROR_BUFFER_SIZE],
            len: 0,
        }
    }

    pub fn set(&mut self, message: &str) {
        let mut end = message.len().min(ERROR_BUFFER_SIZE);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        self.buf[..end].copy_from_slice(&message.as_bytes()[..end]);
        self.len = end;
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // `set` only ever copies a prefix that ends on a char boundary.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for ErrorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorBuffer").field(&self.as_str()).finish()
    }
}
