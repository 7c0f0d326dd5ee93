use std::fmt;

/// One serialized log entry, usually a single JSON object.
///
/// The bytes are never parsed or validated; they are spliced verbatim into the
/// batch payload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LogRecord {
    bytes: Box<[u8]>,
}

impl LogRecord {
    /// Copy `bytes` into a new record.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The serialized bytes of this record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the serialized record in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the record holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for LogRecord {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }
}

impl From<&[u8]> for LogRecord {
    fn from(bytes: &[u8]) -> Self {
        Self::copy_from_slice(bytes)
    }
}

impl From<String> for LogRecord {
    fn from(s: String) -> Self {
        s.into_bytes().into()
    }
}

impl From<&str> for LogRecord {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl AsRef<[u8]> for LogRecord {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LogRecord")
            .field(&String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}
