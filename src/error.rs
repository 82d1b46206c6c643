//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A path or path component string could not be parsed.
	#[error("Malformed path: {0:?}")]
	MalformedPath(String),
	/// An attribute was neither stored on an entry nor recorded as empty.
	#[error("No attribute named {0:?}")]
	AttributeNotFound(String),
	/// An exact-match lookup in a named value mapping had no result.
	#[error("Unknown mapping value {0:#010x}")]
	UnknownMappingValue(u32),
	/// A named value mapping was built with the same name twice.
	#[error("Duplicate mapping name {0:?}")]
	DuplicateMappingName(String),
	/// The directory rejected a query. Carries the full statement.
	#[error("{reason}\n\nPossibly faulty query string:\n{query}")]
	Query {
		/// The statement that was sent to the directory.
		query: String,
		/// Why the statement was rejected.
		reason: String,
	},
	/// No directory entry exists at the given location.
	#[error("No such entry: {0}")]
	NotFound(String),
	/// The contents of an attribute or a setting did not conform to the
	/// expected syntax.
	#[error("Malformed data: {0}")]
	Invalid(String),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
	/// Reading a file or setting up the I/O runtime failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
