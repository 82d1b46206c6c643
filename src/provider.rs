//! The interface to the service that actually talks to the directory.
//!
//! Everything above this module only sees [`Record`]s and [`Row`]s. The
//! LDAP implementation lives in [`crate::ldap`]; tests use an in-memory one.
use std::{collections::HashMap, fmt};

use crate::{config::QueryOptions, error::Error, mapping::signed_to_unsigned};

/// Name of the row field holding the URL of a found entry.
pub const URL_FIELD: &str = "ADsPath";
/// Name of the account control attribute, which is returned with every row.
pub const ACCOUNT_CONTROL_FIELD: &str = "userAccountControl";

/// A single attribute value as reported by the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
	/// A string.
	Text(String),
	/// A number.
	Integer(i64),
	/// Binary data, e.g. GUIDs and SIDs.
	Bytes(Vec<u8>),
	/// A multi-valued attribute.
	Multi(Vec<Value>),
}

impl Value {
	/// The string, if this is a single text value.
	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text),
			_ => None,
		}
	}

	/// The number, if this is a single number or a text holding one.
	#[must_use]
	pub fn as_integer(&self) -> Option<i64> {
		match self {
			Self::Integer(number) => Some(*number),
			Self::Text(text) => text.trim().parse().ok(),
			_ => None,
		}
	}

	/// The value as a 32 bit flag word. Negative numbers are reinterpreted.
	#[must_use]
	pub fn as_flags(&self) -> Option<u32> {
		self.as_integer().map(signed_to_unsigned)
	}

	/// The raw bytes of a single binary or text value.
	#[must_use]
	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Self::Bytes(bytes) => Some(bytes),
			Self::Text(text) => Some(text.as_bytes()),
			_ => None,
		}
	}

	/// All values: the elements of a multi-valued attribute, or the value
	/// itself.
	#[must_use]
	pub fn values(&self) -> &[Value] {
		match self {
			Self::Multi(values) => values,
			single => std::slice::from_ref(single),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Text(text) => write!(f, "{text:?}"),
			Self::Integer(number) => write!(f, "{number}"),
			Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
			Self::Multi(values) => {
				write!(f, "[")?;
				for (index, value) in values.iter().enumerate() {
					if index > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{value}")?;
				}
				write!(f, "]")
			}
		}
	}
}

impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

impl From<String> for Value {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<i64> for Value {
	fn from(number: i64) -> Self {
		Self::Integer(number)
	}
}

impl From<Vec<u8>> for Value {
	fn from(bytes: Vec<u8>) -> Self {
		Self::Bytes(bytes)
	}
}

impl From<Vec<Value>> for Value {
	fn from(values: Vec<Value>) -> Self {
		Self::Multi(values)
	}
}

/// All attributes of one directory entry, as fetched by
/// [`DirectoryProvider::resolve`].
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
	/// The most specific object class of the entry, e.g. `user`.
	pub class_name: String,
	/// Attribute names with their values. `None` marks an attribute the
	/// entry has, but without a value.
	pub attributes: Vec<(String, Option<Value>)>,
}

/// One result of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
	/// Field names and values.
	fields: HashMap<String, Option<Value>>,
}

impl Row {
	/// Create a row from its fields.
	#[must_use]
	pub fn new(fields: HashMap<String, Option<Value>>) -> Self {
		Self { fields }
	}

	/// The value of a field, `None` if it is missing or empty.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.fields.get(name).and_then(Option::as_ref)
	}

	/// The URL of the entry this row describes.
	pub fn url(&self) -> Result<&str, Error> {
		self.get(URL_FIELD)
			.and_then(Value::as_str)
			.ok_or_else(|| Error::Invalid(format!("Result row without {URL_FIELD}")))
	}

	/// The account control flags, if the entry has them.
	#[must_use]
	pub fn account_control(&self) -> Option<u32> {
		self.get(ACCOUNT_CONTROL_FIELD).and_then(Value::as_flags)
	}
}

/// The rows of a query. Single pass, driven by the underlying cursor; not
/// meant to be consumed from more than one place.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Row, Error>> + 'a>;

/// Access to a directory.
///
/// Implementations own the connection; [`DirectoryProvider::connect`] may be
/// called any number of times and only connects once.
pub trait DirectoryProvider {
	/// Open the connection, unless it is open already.
	fn connect(&self) -> Result<(), Error>;

	/// Fetch all attributes of the entry at `url`. Fails with
	/// [`Error::NotFound`] if there is none.
	fn resolve(&self, url: &str) -> Result<Record, Error>;

	/// Search below `base_url` for entries matching `where_clause`, which is
	/// either empty or a `WHERE …` clause as built by
	/// [`SearchFilter::where_clause`](crate::SearchFilter::where_clause).
	/// Every row carries at least the [`URL_FIELD`] and, if set, the
	/// [`ACCOUNT_CONTROL_FIELD`].
	///
	/// A clause the directory rejects fails with [`Error::Query`].
	fn query(
		&self,
		base_url: &str,
		where_clause: &str,
		options: &QueryOptions,
	) -> Result<Rows<'_>, Error>;

	/// Distinguished name of the root of the directory tree.
	fn default_naming_context(&self) -> Result<String, Error>;
}

/// The statement a query amounts to, used for diagnostics.
#[must_use]
pub fn query_statement(base_url: &str, where_clause: &str) -> String {
	let mut statement = format!("SELECT {URL_FIELD}, {ACCOUNT_CONTROL_FIELD}\nFROM '{base_url}'");
	if !where_clause.is_empty() {
		statement.push('\n');
		statement.push_str(where_clause);
	}
	statement
}
