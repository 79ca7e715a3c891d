//! Blog name validation. A [`Key`] is also a directory name and a download filename,
//! so only `[A-Za-z0-9_-]` is accepted.

use std::fmt;
use std::path::Path;

/// Pattern accepted by [`Key::parse`], as reported back to callers.
pub const KEY_PATTERN: &str = "^[A-Za-z0-9_-]+$";

/// Why a raw name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("tumblr parameter required")]
    MissingKey,
    #[error("tumblr parameter must match {}", KEY_PATTERN)]
    InvalidKeyFormat,
}

/// Validated blog name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    /// Accept `raw` unchanged if it is non-empty and every char is an ASCII letter, digit, `_` or `-`.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::MissingKey);
        }
        if !raw.bytes().all(is_key_byte) {
            return Err(KeyError::InvalidKeyFormat);
        }
        Ok(Key(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename offered in `Content-Disposition`.
    pub fn archive_filename(&self) -> String {
        format!("{}.zip", self.0)
    }
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for Key {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}
