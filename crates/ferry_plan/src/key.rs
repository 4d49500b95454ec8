//! Key bounds, key intervals and the binary key text format.
//!
//! Sorted stores report an empty byte string for an open region edge. Inside
//! ferry that convention is replaced by [`KeyBound::Unbounded`], so an empty
//! key and "no bound" never share a representation. Conversion happens once,
//! at the store boundary, through [`KeyBound::from_raw`].

use crate::error::{PlanError, PlanResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Printable bytes that the binary key text format keeps verbatim.
const PLAIN_PUNCTUATION: &[u8] = b" `~!@#$%^&*()-_=+[]{}|;:'\",.<>/?";

/// One edge of a key interval.
///
/// Used as a start bound, `Unbounded` sorts before every key. Used as an end
/// bound, it sorts after every key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyBound {
    /// No bound in this direction.
    Unbounded,
    /// A concrete key.
    Bounded(Bytes),
}

impl KeyBound {
    /// Creates a bounded key.
    pub fn bounded(key: impl Into<Bytes>) -> Self {
        Self::Bounded(key.into())
    }

    /// Converts a raw store key, where an empty key means open-ended.
    pub fn from_raw(raw: &[u8]) -> Self {
        if raw.is_empty() {
            Self::Unbounded
        } else {
            Self::Bounded(Bytes::copy_from_slice(raw))
        }
    }

    /// Parses a configured row key.
    ///
    /// Empty text is unbounded. With `binary` set the text is read in the
    /// binary key text format, otherwise its UTF-8 bytes are the key.
    pub fn parse(text: &str, binary: bool) -> Self {
        if text.is_empty() {
            return Self::Unbounded;
        }
        if binary {
            Self::Bounded(unescape_binary(text))
        } else {
            Self::Bounded(Bytes::copy_from_slice(text.as_bytes()))
        }
    }

    /// Returns true if this bound holds a key.
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Bounded(_))
    }

    /// Returns the key bytes, if bounded.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(key) => Some(key),
        }
    }

    /// Converts back to the store convention (empty key for open-ended).
    pub fn to_raw(&self) -> Bytes {
        match self {
            Self::Unbounded => Bytes::new(),
            Self::Bounded(key) => key.clone(),
        }
    }

    /// Compares two start bounds (`Unbounded` is negative infinity).
    pub fn cmp_as_start(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unbounded, Self::Unbounded) => Ordering::Equal,
            (Self::Unbounded, Self::Bounded(_)) => Ordering::Less,
            (Self::Bounded(_), Self::Unbounded) => Ordering::Greater,
            (Self::Bounded(a), Self::Bounded(b)) => a.cmp(b),
        }
    }

    /// Compares two end bounds (`Unbounded` is positive infinity).
    pub fn cmp_as_end(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unbounded, Self::Unbounded) => Ordering::Equal,
            (Self::Unbounded, Self::Bounded(_)) => Ordering::Greater,
            (Self::Bounded(_), Self::Unbounded) => Ordering::Less,
            (Self::Bounded(a), Self::Bounded(b)) => a.cmp(b),
        }
    }

    /// Returns the later of two start bounds.
    pub fn max_start(&self, other: &Self) -> Self {
        if self.cmp_as_start(other) == Ordering::Less {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// Returns the earlier of two end bounds.
    pub fn min_end(&self, other: &Self) -> Self {
        if self.cmp_as_end(other) == Ordering::Greater {
            other.clone()
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for KeyBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("<unbounded>"),
            Self::Bounded(key) => f.write_str(&escape_binary(key)),
        }
    }
}

/// A half-open key interval `[start, end)`.
///
/// Construction rejects intervals whose bounded start sorts after their
/// bounded end, so every `KeyInterval` in circulation is well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyInterval {
    start: KeyBound,
    end: KeyBound,
}

impl KeyInterval {
    /// Creates an interval, failing with `InvalidRange` when `start > end`.
    pub fn new(start: KeyBound, end: KeyBound) -> PlanResult<Self> {
        if let (KeyBound::Bounded(s), KeyBound::Bounded(e)) = (&start, &end) {
            if s > e {
                return Err(PlanError::InvalidRange {
                    start: escape_binary(s),
                    end: escape_binary(e),
                });
            }
        }
        Ok(Self { start, end })
    }

    /// Builds an interval already known to be ordered.
    pub(crate) fn clipped(start: KeyBound, end: KeyBound) -> Self {
        Self { start, end }
    }

    /// The whole keyspace.
    pub fn unbounded() -> Self {
        Self {
            start: KeyBound::Unbounded,
            end: KeyBound::Unbounded,
        }
    }

    /// Parses an interval from configured row keys.
    pub fn parse(start: &str, end: &str, binary: bool) -> PlanResult<Self> {
        Self::new(KeyBound::parse(start, binary), KeyBound::parse(end, binary))
    }

    /// Start bound (inclusive).
    pub fn start(&self) -> &KeyBound {
        &self.start
    }

    /// End bound (exclusive).
    pub fn end(&self) -> &KeyBound {
        &self.end
    }

    /// Returns true if `key` falls inside the interval.
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            KeyBound::Unbounded => true,
            KeyBound::Bounded(s) => key >= &s[..],
        };
        let before_end = match &self.end {
            KeyBound::Unbounded => true,
            KeyBound::Bounded(e) => key < &e[..],
        };
        after_start && before_end
    }
}

impl fmt::Display for KeyInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Renders a key in the binary key text format.
///
/// ASCII alphanumerics and a fixed punctuation set are written as-is; every
/// other byte (including `\`) becomes `\xHH`.
pub fn escape_binary(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if b.is_ascii_alphanumeric() || PLAIN_PUNCTUATION.contains(&b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}

/// Parses the binary key text format back into key bytes.
///
/// A `\x` not followed by two hex digits is kept literally.
pub fn unescape_binary(text: &str) -> Bytes {
    let input = text.as_bytes();
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\\' && input.get(i + 1) == Some(&b'x') {
            let hex = input.get(i + 2).copied().and_then(hex_value).zip(
                input.get(i + 3).copied().and_then(hex_value),
            );
            if let Some((hi, lo)) = hex {
                out.push((hi << 4) | lo);
                i += 4;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    Bytes::from(out)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
