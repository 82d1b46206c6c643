//! Decoding of the attribute syntaxes Active Directory uses for times and
//! identifiers.
use std::fmt;

use time::{macros::datetime, Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::{config::TIME_FORMAT, error::Error};

/// High 32 bits of a large integer time which means "never".
const TIME_NEVER_HIGH_PART: u64 = 0x7fff_ffff;

/// A point in time stored as a large integer, e.g. `pwdLastSet` or
/// `accountExpires`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdTime {
	/// The event does not happen, e.g. an account which does not expire.
	Never,
	/// The event happens (or happened) at the given time. Times beyond what
	/// [`OffsetDateTime`] can represent are clamped to its maximum.
	At(OffsetDateTime),
}

impl fmt::Display for AdTime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Never => write!(f, "<never>"),
			Self::At(time) => write!(f, "{time}"),
		}
	}
}

/// Decode a Windows file time: the number of 100 nanosecond intervals since
/// 1601-01-01 00:00 UTC, read as unsigned.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn file_time(value: i64) -> AdTime {
	let intervals = value as u64;
	if intervals >> 32 == TIME_NEVER_HIGH_PART {
		return AdTime::Never;
	}
	let base = datetime!(1601-01-01 0:00 UTC);
	let time = base
		.checked_add(Duration::microseconds((intervals / 10) as i64))
		.unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc());
	AdTime::At(time)
}

/// Parse an LDAP generalized time such as `20130516200520.0Z`.
pub fn generalized_time(value: &str) -> Result<OffsetDateTime, Error> {
	let digits = value.split(['.', 'Z']).next().unwrap_or_default();
	PrimitiveDateTime::parse(digits, &TIME_FORMAT)
		.map(PrimitiveDateTime::assume_utc)
		.map_err(|err| Error::Invalid(format!("{value:?} is not a generalized time: {err}")))
}

/// Lowercase hexadecimal representation of binary data.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
	hex::encode(bytes)
}

/// Format a 16 byte GUID as `{xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx}`, in the
/// byte order it is stored in.
pub fn guid(bytes: &[u8]) -> Result<String, Error> {
	let guid = Uuid::from_slice(bytes)
		.map_err(|err| Error::Invalid(format!("{} is not a GUID: {err}", hex(bytes))))?;
	Ok(guid.braced().to_string())
}

/// Format a binary security identifier as `S-1-5-21-…`.
pub fn sid(bytes: &[u8]) -> Result<String, Error> {
	let invalid = || Error::Invalid(format!("Malformed security identifier {}", hex(bytes)));
	let (&revision, rest) = bytes.split_first().ok_or_else(invalid)?;
	let (&count, rest) = rest.split_first().ok_or_else(invalid)?;
	if rest.len() != 6 + 4 * usize::from(count) {
		return Err(invalid());
	}
	let (authority, sub_authorities) = rest.split_at(6);
	let authority = authority.iter().fold(0_u64, |value, &byte| value << 8 | u64::from(byte));

	let sub_authorities: String = sub_authorities
		.chunks_exact(4)
		.map(|chunk| format!("-{}", u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
		.collect();
	Ok(format!("S-{revision}-{authority}{sub_authorities}"))
}
