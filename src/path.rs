//! Distinguished names and the `LDAP://` URLs built from them.
use std::{
	fmt,
	hash::{Hash, Hasher},
	str::FromStr,
};

use crate::error::Error;

/// The scheme prefix of directory URLs.
pub const LDAP_URL_PREFIX: &str = "LDAP://";

/// Separator between the components of a path.
const SEPARATOR: char = ',';
/// Separator between keyword and value of a component.
const EQUALS: char = '=';
/// Escape character.
const ESCAPE: char = '\\';
/// Separator between the values of a multi-valued component.
const PLUS: char = '+';
/// Characters which are escaped when they occur in a value.
const SPECIAL: &[char] = &[',', '=', '+', '<', '>', ';', '\\', '"'];
/// Characters a keyword must not contain.
const KEYWORD_FORBIDDEN: &[char] = &[',', '=', '+', '\\'];

/// One `keyword=value` part of a distinguished name, such as `CN=Users`.
///
/// Keywords compare case-insensitively, values exactly. The value is kept
/// unescaped. Multi-valued components (`CN=x+SN=y`) are not supported.
#[derive(Clone, Debug, Eq)]
pub struct PathComponent {
	/// Attribute type, e.g. `CN` or `DC`.
	keyword: String,
	/// Unescaped attribute value.
	value: String,
}

impl PathComponent {
	/// Create a component from an unescaped keyword and value. Whitespace
	/// around the keyword is removed, the value is kept as given. Neither part
	/// may be empty, and the keyword must not contain separators, escapes or
	/// whitespace.
	pub fn new(keyword: &str, value: &str) -> Result<Self, Error> {
		let keyword = keyword.trim();
		let bad_keyword = keyword.is_empty()
			|| keyword.chars().any(|c| c.is_whitespace() || KEYWORD_FORBIDDEN.contains(&c));
		if bad_keyword || value.is_empty() {
			return Err(Error::MalformedPath(format!("{keyword}={value}")));
		}
		Ok(Self { keyword: keyword.to_owned(), value: value.to_owned() })
	}

	/// The attribute type.
	#[must_use]
	pub fn keyword(&self) -> &str {
		&self.keyword
	}

	/// The unescaped value.
	#[must_use]
	pub fn value(&self) -> &str {
		&self.value
	}
}

impl FromStr for PathComponent {
	type Err = Error;

	fn from_str(string: &str) -> Result<Self, Self::Err> {
		let malformed = || Error::MalformedPath(string.to_owned());
		let position = find_unescaped(string, EQUALS).ok_or_else(malformed)?;
		let keyword = &string[..position];
		let raw_value = trim_unescaped(&string[position + 1..]);
		if find_unescaped(raw_value, PLUS).is_some() {
			return Err(malformed());
		}
		let value = unescape(raw_value).ok_or_else(malformed)?;
		Self::new(keyword, &value).map_err(|_| malformed())
	}
}

impl fmt::Display for PathComponent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{EQUALS}", self.keyword)?;
		let end = self.value.len();
		for (index, c) in self.value.char_indices() {
			let outer_space = c == ' ' && (index == 0 || index + c.len_utf8() == end);
			if SPECIAL.contains(&c) || outer_space || (index == 0 && c == '#') {
				write!(f, "{ESCAPE}")?;
			}
			write!(f, "{c}")?;
		}
		Ok(())
	}
}

impl PartialEq for PathComponent {
	fn eq(&self, other: &Self) -> bool {
		self.keyword.eq_ignore_ascii_case(&other.keyword) && self.value == other.value
	}
}

impl Hash for PathComponent {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.keyword.to_ascii_lowercase().hash(state);
		self.value.hash(state);
	}
}

/// A distinguished name: a non-empty sequence of components, the most
/// specific (the relative distinguished name) first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LdapPath {
	/// Always contains at least one component.
	components: Vec<PathComponent>,
}

impl LdapPath {
	/// Create a path from its components.
	pub fn new(components: Vec<PathComponent>) -> Result<Self, Error> {
		if components.is_empty() {
			return Err(Error::MalformedPath(String::new()));
		}
		Ok(Self { components })
	}

	/// Create a path from component strings such as `"cn=Users"`.
	pub fn from_parts<I, S>(parts: I) -> Result<Self, Error>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let components =
			parts.into_iter().map(|part| part.as_ref().parse()).collect::<Result<_, _>>()?;
		Self::new(components)
	}

	/// The components, most specific first.
	#[must_use]
	pub fn components(&self) -> &[PathComponent] {
		&self.components
	}

	/// Number of components.
	#[must_use]
	#[allow(clippy::len_without_is_empty)]
	pub fn len(&self) -> usize {
		self.components.len()
	}

	/// The relative distinguished name, i.e. the value of the first
	/// component.
	#[must_use]
	pub fn rdn(&self) -> &str {
		self.components[0].value()
	}

	/// The directory URL, used as the canonical identity of an entry.
	#[must_use]
	pub fn url(&self) -> String {
		format!("{LDAP_URL_PREFIX}{self}")
	}

	/// The path of the containing entry, or `None` for a top level path.
	#[must_use]
	pub fn parent(&self) -> Option<Self> {
		(self.components.len() > 1).then(|| Self { components: self.components[1..].to_vec() })
	}

	/// The path one level below this one.
	#[must_use]
	pub fn child(&self, component: PathComponent) -> Self {
		let mut components = Vec::with_capacity(self.components.len() + 1);
		components.push(component);
		components.extend_from_slice(&self.components);
		Self { components }
	}
}

impl FromStr for LdapPath {
	type Err = Error;

	/// Parse a distinguished name, with or without the `LDAP://` prefix.
	fn from_str(string: &str) -> Result<Self, Self::Err> {
		let dn = strip_url_prefix(string);
		if dn.trim().is_empty() {
			return Err(Error::MalformedPath(string.to_owned()));
		}
		let components = split_unescaped(dn, SEPARATOR)
			.into_iter()
			.map(str::parse)
			.collect::<Result<Vec<PathComponent>, _>>()
			.map_err(|_| Error::MalformedPath(string.to_owned()))?;
		Self::new(components)
	}
}

impl fmt::Display for LdapPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (index, component) in self.components.iter().enumerate() {
			if index > 0 {
				write!(f, "{SEPARATOR}")?;
			}
			write!(f, "{component}")?;
		}
		Ok(())
	}
}

/// Anything that names a directory entry: a parsed path, a distinguished name
/// or a directory URL.
pub trait AsLdapPath {
	/// Convert to a parsed path.
	fn to_ldap_path(&self) -> Result<LdapPath, Error>;
}

impl AsLdapPath for LdapPath {
	fn to_ldap_path(&self) -> Result<LdapPath, Error> {
		Ok(self.clone())
	}
}

impl AsLdapPath for str {
	fn to_ldap_path(&self) -> Result<LdapPath, Error> {
		self.parse()
	}
}

impl AsLdapPath for String {
	fn to_ldap_path(&self) -> Result<LdapPath, Error> {
		self.parse()
	}
}

impl<T: AsLdapPath + ?Sized> AsLdapPath for &T {
	fn to_ldap_path(&self) -> Result<LdapPath, Error> {
		(**self).to_ldap_path()
	}
}

/// Remove a leading `LDAP://` (in any case) from a string.
#[must_use]
pub fn strip_url_prefix(string: &str) -> &str {
	match string.get(..LDAP_URL_PREFIX.len()) {
		Some(prefix) if prefix.eq_ignore_ascii_case(LDAP_URL_PREFIX) => {
			&string[LDAP_URL_PREFIX.len()..]
		}
		_ => string,
	}
}

/// Byte offset of the first occurrence of `needle` not preceded by an escape.
fn find_unescaped(string: &str, needle: char) -> Option<usize> {
	let mut escaped = false;
	for (index, c) in string.char_indices() {
		match c {
			_ if escaped => escaped = false,
			ESCAPE => escaped = true,
			c if c == needle => return Some(index),
			_ => {}
		}
	}
	None
}

/// Remove surrounding whitespace, except an escaped trailing space.
fn trim_unescaped(raw: &str) -> &str {
	let raw = raw.trim_start();
	let mut end = raw.len();
	while let Some(c) = raw[..end].chars().next_back() {
		if !c.is_whitespace() {
			break;
		}
		let before = &raw[..end - c.len_utf8()];
		if before.chars().rev().take_while(|&b| b == ESCAPE).count() % 2 == 1 {
			break;
		}
		end = before.len();
	}
	&raw[..end]
}

/// Split at every unescaped occurrence of `separator`.
fn split_unescaped(string: &str, separator: char) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut rest = string;
	while let Some(index) = find_unescaped(rest, separator) {
		parts.push(&rest[..index]);
		rest = &rest[index + separator.len_utf8()..];
	}
	parts.push(rest);
	parts
}

/// Resolve escapes in a value: `\` followed by a character stands for that
/// character, `\` followed by two hex digits for that byte.
fn unescape(raw: &str) -> Option<String> {
	let mut bytes = Vec::with_capacity(raw.len());
	let mut chars = raw.chars().peekable();
	while let Some(c) = chars.next() {
		if c != ESCAPE {
			let mut buffer = [0; 4];
			bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
			continue;
		}
		let first = chars.next()?;
		let hex = first.to_digit(16).zip(chars.peek().and_then(|next| next.to_digit(16)));
		if let Some((high, low)) = hex {
			chars.next();
			bytes.push(u8::try_from(high * 16 + low).ok()?);
		} else {
			let mut buffer = [0; 4];
			bytes.extend_from_slice(first.encode_utf8(&mut buffer).as_bytes());
		}
	}
	String::from_utf8(bytes).ok()
}
