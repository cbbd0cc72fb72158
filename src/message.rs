use std::fmt::{Display, Formatter};

use crate::error::Result;

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// A weather message: opaque UTF-8 text carried as the raw datagram payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Message(String);

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Message(text.into())
    }

    /// Decodes a datagram payload. No framing, the whole payload is the text.
    pub fn from_datagram(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)?;
        Ok(Message(text.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns a copy cut down to at most `max_len` bytes on a char boundary,
    /// or `None` if it already fits.
    pub fn truncated(&self, max_len: usize) -> Option<Message> {
        if self.0.len() <= max_len {
            return None;
        }
        let mut end = max_len;
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        Some(Message(self.0[..end].to_owned()))
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message(value)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message(value.to_owned())
    }
}

impl PartialEq<str> for Message {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
