//! Key and value kinds with their byte codecs
//!
//! A [`Kind`] names one side of a relation and fixes how its bytes are read:
//! - `Integer`: fixed-width big-endian number, all-NUL is zero
//! - `Text`: NUL-padded string, truncated at the first NUL
//! - `None`: raw bytes, unchanged (zero width works as a presence marker)

use std::fmt;

use crate::store::error::{StoreError, StoreResult};
use crate::store::format::{display_key, validate_key};

/// Widest integer value in bytes
pub const MAX_INTEGER_WIDTH: usize = 8;

/// How stored bytes convert to a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    None,
    Integer,
    Text,
}

/// A decoded value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Raw(Vec<u8>),
    Integer(u64),
    Text(String),
}

impl Value {
    /// Key bytes for looking this value up in another relation
    ///
    /// Integers are rendered as decimal text since keys are NUL-padded
    /// strings.
    pub fn to_key(&self) -> Vec<u8> {
        match self {
            Value::Raw(bytes) => bytes.clone(),
            Value::Integer(n) => n.to_string().into_bytes(),
            Value::Text(s) => s.as_bytes().to_vec(),
        }
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Raw(bytes) if bytes.is_empty() => write!(f, "<marker>"),
            Value::Raw(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Integer(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One side of a relation: name, stored width and conversion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Kind {
    pub name: String,
    pub width: usize,
    pub conversion: Conversion,
}

impl Kind {
    pub fn new(name: impl Into<String>, width: usize, conversion: Conversion) -> Self {
        Self {
            name: name.into(),
            width,
            conversion,
        }
    }

    pub fn integer(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, width, Conversion::Integer)
    }

    pub fn text(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, width, Conversion::Text)
    }

    pub fn raw(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, width, Conversion::None)
    }

    /// Zero-width presence marker
    pub fn marker(name: impl Into<String>) -> Self {
        Self::raw(name, 0)
    }

    fn check_width(&self, len: usize) -> StoreResult<()> {
        if len != self.width {
            return Err(StoreError::InvalidArgument(format!(
                "{} value is {} bytes, expected {}",
                self.name, len, self.width
            )));
        }
        if self.conversion == Conversion::Integer && self.width > MAX_INTEGER_WIDTH {
            return Err(StoreError::InvalidArgument(format!(
                "{} integer width {} exceeds {}",
                self.name, self.width, MAX_INTEGER_WIDTH
            )));
        }
        Ok(())
    }

    /// Decode stored bytes
    pub fn decode(&self, bytes: &[u8]) -> StoreResult<Value> {
        self.check_width(bytes.len())?;
        Ok(match self.conversion {
            Conversion::None => Value::Raw(bytes.to_vec()),
            Conversion::Integer => {
                Value::Integer(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
            }
            Conversion::Text => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let text = std::str::from_utf8(&bytes[..end]).map_err(|e| {
                    StoreError::InvalidArgument(format!(
                        "{} value {:?} is not UTF-8: {}",
                        self.name,
                        display_key(&bytes[..end]),
                        e
                    ))
                })?;
                Value::Text(text.to_string())
            }
        })
    }

    /// Check that `key` is a valid key of this kind
    ///
    /// Keys take the form [`Value::to_key`] produces: integers as canonical
    /// decimal text that fits in `width` bytes, text and raw bytes no longer
    /// than `width`.
    pub fn check_key(&self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        match self.conversion {
            Conversion::Integer => {
                let canonical =
                    key.iter().all(u8::is_ascii_digit) && (key == b"0" || key[0] != b'0');
                let n = std::str::from_utf8(key)
                    .ok()
                    .filter(|_| canonical)
                    .and_then(|s| s.parse::<u64>().ok());
                match n {
                    Some(n) => self.encode(&Value::Integer(n)).map(|_| ()),
                    None => Err(StoreError::InvalidArgument(format!(
                        "{} key {:?} is not a decimal integer",
                        self.name,
                        display_key(key)
                    ))),
                }
            }
            Conversion::Text | Conversion::None => {
                if key.len() > self.width {
                    return Err(StoreError::InvalidArgument(format!(
                        "{} key {:?} is longer than {} bytes",
                        self.name,
                        display_key(key),
                        self.width
                    )));
                }
                Ok(())
            }
        }
    }

    /// Encode a value to exactly `width` bytes
    pub fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        let bytes = match (self.conversion, value) {
            (Conversion::None, Value::Raw(bytes)) => bytes.clone(),
            (Conversion::Integer, Value::Integer(n)) => {
                let full = n.to_be_bytes();
                let width = self.width.min(MAX_INTEGER_WIDTH);
                let (high, low) = full.split_at(MAX_INTEGER_WIDTH - width);
                if high.iter().any(|&b| b != 0) {
                    return Err(StoreError::InvalidArgument(format!(
                        "{} value {} does not fit in {} bytes",
                        self.name, n, self.width
                    )));
                }
                low.to_vec()
            }
            (Conversion::Text, Value::Text(s)) => {
                if s.len() > self.width {
                    return Err(StoreError::InvalidArgument(format!(
                        "{} value {:?} is longer than {} bytes",
                        self.name, s, self.width
                    )));
                }
                if s.as_bytes().contains(&0) {
                    return Err(StoreError::InvalidArgument(format!(
                        "{} value {:?} contains NUL",
                        self.name, s
                    )));
                }
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(self.width, 0);
                bytes
            }
            (conversion, value) => {
                return Err(StoreError::InvalidArgument(format!(
                    "{} expects {:?} values, got {:?}",
                    self.name, conversion, value
                )));
            }
        };
        self.check_width(bytes.len())?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_codec() {
        let id = Kind::integer("id", 4);
        assert_eq!(id.encode(&Value::Integer(258)).unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(id.decode(&[0, 0, 1, 2]).unwrap(), Value::Integer(258));

        // All-NUL is zero, not absence
        assert_eq!(id.decode(&[0, 0, 0, 0]).unwrap(), Value::Integer(0));

        assert!(id.encode(&Value::Integer(1 << 32)).is_err());
        assert!(id.decode(&[0, 1]).is_err());
        assert!(Kind::integer("big", 9).decode(&[0; 9]).is_err());
    }

    #[test]
    fn test_text_codec() {
        let name = Kind::text("name", 8);
        let bytes = name.encode(&Value::from("git")).unwrap();
        assert_eq!(bytes, b"git\0\0\0\0\0");
        assert_eq!(name.decode(&bytes).unwrap(), Value::from("git"));
        assert_eq!(name.decode(b"ab\0cdefg").unwrap(), Value::from("ab"));

        assert!(name.encode(&Value::from("much-too-long")).is_err());
        assert!(name.encode(&Value::Integer(1)).is_err());
    }

    #[test]
    fn test_marker_codec() {
        let claim = Kind::marker("claim");
        assert_eq!(claim.encode(&Value::Raw(vec![])).unwrap(), Vec::<u8>::new());
        assert_eq!(claim.decode(&[]).unwrap(), Value::Raw(vec![]));
        assert!(claim.encode(&Value::Raw(vec![1])).is_err());
    }

    #[test]
    fn test_text_decode_rejects_invalid_utf8() {
        let file = Kind::text("file", 4);
        assert!(matches!(
            file.decode(&[b'a', 0xff, 0, 0]),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_check_key() {
        let id = Kind::integer("id", 2);
        assert!(id.check_key(b"0").is_ok());
        assert!(id.check_key(b"65535").is_ok());
        assert!(id.check_key(b"65536").is_err());
        assert!(id.check_key(b"007").is_err());
        assert!(id.check_key(b"not-an-id").is_err());
        assert!(id.check_key(b"-1").is_err());
        assert!(id.check_key(b"99999999999999999999999").is_err());

        let name = Kind::text("name", 4);
        assert!(name.check_key(b"git").is_ok());
        assert!(name.check_key(b"gitk").is_ok());
        assert!(name.check_key(b"gitkx").is_err());
        assert!(name.check_key(b"").is_err());

        // Every integer key form round-trips through the value codec
        for n in [0u64, 7, 42, 65535] {
            assert!(id.check_key(&Value::Integer(n).to_key()).is_ok());
        }
    }

    #[test]
    fn test_to_key() {
        assert_eq!(Value::Integer(42).to_key(), b"42");
        assert_eq!(Value::from("usr/bin/ls").to_key(), b"usr/bin/ls");
        assert_eq!(Value::Raw(vec![1, 2]).to_key(), vec![1, 2]);
        assert_eq!(Value::Integer(7).to_string(), "7");
    }
}
