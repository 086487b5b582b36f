use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::AssetKind;

/// Fixed-size content hash identifying one immutable asset.
///
/// The digest covers the asset kind tag followed by the payload bytes, so identical payloads
/// of different kinds never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum([u8; Checksum::LEN]);

impl Checksum {
	/// Encoded width in bytes.
	pub const LEN: usize = 16;

	/// Computes the checksum of a payload of the given kind.
	pub fn of(kind: AssetKind, payload: &[u8]) -> Self {
		let mut hasher = Xxh3::new();
		hasher.update(&[kind.tag()]);
		hasher.update(payload);
		Self(hasher.digest128().to_le_bytes())
	}

	/// Wraps raw checksum bytes read off the wire.
	pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
		Self(bytes)
	}

	/// Returns the raw checksum bytes.
	pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
		&self.0
	}
}

impl fmt::Display for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}
		Ok(())
	}
}

/// Error parsing a [`Checksum`] from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseChecksumError {
	/// The input is not exactly `2 * Checksum::LEN` characters long.
	#[error("expected {expected} hex digits, got {0} characters", expected = Checksum::LEN * 2)]
	Length(usize),
	/// The input contains a character that is not a hex digit.
	#[error("invalid hex digit at offset {0}")]
	Digit(usize),
}

impl FromStr for Checksum {
	type Err = ParseChecksumError;

	/// Parses the 32-digit hex form produced by `Display`. Upper-case digits are accepted.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits = s.as_bytes();
		if digits.len() != Self::LEN * 2 {
			return Err(ParseChecksumError::Length(s.len()));
		}
		let nibble = |at: usize| match digits[at] {
			b @ b'0'..=b'9' => Ok(b - b'0'),
			b @ b'a'..=b'f' => Ok(b - b'a' + 10),
			b @ b'A'..=b'F' => Ok(b - b'A' + 10),
			_ => Err(ParseChecksumError::Digit(at)),
		};
		let mut bytes = [0u8; Self::LEN];
		for (i, byte) in bytes.iter_mut().enumerate() {
			*byte = (nibble(2 * i)? << 4) | nibble(2 * i + 1)?;
		}
		Ok(Self(bytes))
	}
}

impl fmt::Debug for Checksum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Checksum({self})")
	}
}
