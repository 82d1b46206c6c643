//! Directory entries and their attributes.
use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	fmt,
	sync::Arc,
};

use time::OffsetDateTime;

use crate::{
	convert::{self, AdTime},
	directory::{Directory, GroupWalk},
	error::Error,
	mapping::{
		signed_to_unsigned, ACCOUNT_DISABLE, GROUP_TYPES, SAM_ACCOUNT_TYPES, USER_ACCOUNT_CONTROL,
	},
	path::{LdapPath, PathComponent},
	provider::{DirectoryProvider, Record, Value, ACCOUNT_CONTROL_FIELD},
};

/// The kinds of entries this library distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
	/// Any entry of a class without special support.
	Generic,
	/// A user account.
	User,
	/// A group.
	Group,
	/// A computer account.
	Computer,
	/// An organizational unit.
	OrganizationalUnit,
	/// The root entry of a domain.
	DomainDns,
	/// An Exchange public folder.
	PublicFolder,
}

/// Object class names of the entry kinds, compared case-insensitively.
const CLASS_NAMES: &[(&str, EntryKind)] = &[
	("user", EntryKind::User),
	("group", EntryKind::Group),
	("computer", EntryKind::Computer),
	("organizationalUnit", EntryKind::OrganizationalUnit),
	("domainDNS", EntryKind::DomainDns),
	("publicFolder", EntryKind::PublicFolder),
];

impl EntryKind {
	/// The kind of entries of an object class. Unknown classes are
	/// [`EntryKind::Generic`].
	#[must_use]
	pub fn from_class_name(class_name: &str) -> Self {
		CLASS_NAMES
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(class_name))
			.map_or(Self::Generic, |&(_, kind)| kind)
	}

	/// Human readable name of the kind.
	#[must_use]
	pub fn name(self) -> &'static str {
		match self {
			Self::Generic => "Entry",
			Self::User => "User",
			Self::Group => "Group",
			Self::Computer => "Computer",
			Self::OrganizationalUnit => "OrganizationalUnit",
			Self::DomainDns => "DomainDns",
			Self::PublicFolder => "PublicFolder",
		}
	}
}

/// A directory entry with the attributes it had when it was fetched.
///
/// Entries are created by [`Directory::produce_entry`] and never change
/// afterwards. Related entries (parent, children, group members) are not
/// referenced directly, but looked up through the directory by path.
#[derive(Clone, Debug)]
pub struct Entry {
	/// Where the entry lives.
	path: LdapPath,
	/// What kind of entry it is.
	kind: EntryKind,
	/// The object class reported by the directory.
	class_name: String,
	/// Attribute values by name, in the case the directory reported.
	attributes: BTreeMap<String, Value>,
	/// Attributes the entry has, but without a value.
	empty: BTreeSet<String>,
	/// Lowercase name to reported name, for stored and empty attributes.
	names: HashMap<String, String>,
}

impl Entry {
	/// Wrap the attributes of a record fetched from `path`.
	#[must_use]
	pub fn from_record(path: LdapPath, record: Record) -> Self {
		let mut entry = Self {
			path,
			kind: EntryKind::from_class_name(&record.class_name),
			class_name: record.class_name,
			attributes: BTreeMap::new(),
			empty: BTreeSet::new(),
			names: HashMap::new(),
		};
		for (name, value) in record.attributes {
			if let Some(previous) = entry.names.insert(name.to_lowercase(), name.clone()) {
				entry.attributes.remove(&previous);
				entry.empty.remove(&previous);
			}
			match value {
				Some(value) => {
					entry.attributes.insert(name, value);
				}
				None => {
					entry.empty.insert(name);
				}
			}
		}
		entry
	}

	/// The path of the entry.
	#[must_use]
	pub fn path(&self) -> &LdapPath {
		&self.path
	}

	/// The URL of the entry, which identifies it in the cache.
	#[must_use]
	pub fn url(&self) -> String {
		self.path.url()
	}

	/// The kind of entry.
	#[must_use]
	pub fn kind(&self) -> EntryKind {
		self.kind
	}

	/// The object class the directory reported.
	#[must_use]
	pub fn class_name(&self) -> &str {
		&self.class_name
	}

	/// Look up an attribute, ignoring the case of its name.
	///
	/// Returns `Ok(None)` for an attribute which the entry has without a
	/// value, and [`Error::AttributeNotFound`] for one it does not have at
	/// all.
	pub fn get(&self, name: &str) -> Result<Option<&Value>, Error> {
		let stored = self
			.names
			.get(&name.to_lowercase())
			.ok_or_else(|| Error::AttributeNotFound(name.to_owned()))?;
		Ok(self.attributes.get(stored))
	}

	/// The first value of an attribute, as text.
	pub fn get_str(&self, name: &str) -> Result<Option<&str>, Error> {
		self.get(name)?
			.and_then(|value| value.values().first())
			.map(|value| {
				value.as_str().ok_or_else(|| Error::Invalid(format!("{name} is not a string")))
			})
			.transpose()
	}

	/// An attribute holding a number.
	pub fn get_integer(&self, name: &str) -> Result<Option<i64>, Error> {
		self.get(name)?
			.map(|value| {
				value.as_integer().ok_or_else(|| Error::Invalid(format!("{name} is not a number")))
			})
			.transpose()
	}

	/// An attribute holding a large integer time, such as `pwdLastSet`.
	pub fn get_time(&self, name: &str) -> Result<Option<AdTime>, Error> {
		Ok(self.get_integer(name)?.map(convert::file_time))
	}

	/// An attribute holding a generalized time, such as `whenChanged`.
	pub fn get_generalized_time(&self, name: &str) -> Result<Option<OffsetDateTime>, Error> {
		self.get_str(name)?.map(convert::generalized_time).transpose()
	}

	/// The `objectGUID`, formatted.
	pub fn guid(&self) -> Result<Option<String>, Error> {
		self.get_bytes("objectGUID")?.map(convert::guid).transpose()
	}

	/// The `objectSid`, formatted as `S-1-…`.
	pub fn sid(&self) -> Result<Option<String>, Error> {
		self.get_bytes("objectSid")?.map(convert::sid).transpose()
	}

	/// The first value of a binary attribute.
	fn get_bytes(&self, name: &str) -> Result<Option<&[u8]>, Error> {
		self.get(name)?
			.and_then(|value| value.values().first())
			.map(|value| {
				value.as_bytes().ok_or_else(|| Error::Invalid(format!("{name} is not binary")))
			})
			.transpose()
	}

	/// A flag word attribute which must be present with a value.
	fn required_flags(&self, name: &str) -> Result<u32, Error> {
		self.get(name)?
			.ok_or_else(|| Error::AttributeNotFound(name.to_owned()))?
			.as_flags()
			.ok_or_else(|| Error::Invalid(format!("{name} is not a number")))
	}

	/// Attribute names and values, sorted by name (case-sensitive, so
	/// uppercase before lowercase). Attributes without value are left out.
	pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.attributes.iter().map(|(name, value)| (name.as_str(), value))
	}

	/// Names of the attributes with a value, sorted.
	pub fn stored_attributes(&self) -> impl Iterator<Item = &str> {
		self.attributes.keys().map(String::as_str)
	}

	/// Names of the attributes without a value, sorted.
	pub fn empty_attributes(&self) -> impl Iterator<Item = &str> {
		self.empty.iter().map(String::as_str)
	}

	/// Write all attributes with a value, one per line, sorted by name.
	pub fn print_dump(&self, output: &mut impl fmt::Write) -> fmt::Result {
		writeln!(output, "<{}: {}>", self.kind.name(), self.path)?;
		writeln!(output, "{{")?;
		for (name, value) in self.items() {
			writeln!(output, "  {name} \u{2192} {value}")?;
		}
		writeln!(output, "}}")
	}

	/// The path of the containing entry, if there is one.
	#[must_use]
	pub fn parent_path(&self) -> Option<LdapPath> {
		self.path.parent()
	}

	/// The path of an entry directly below this one.
	#[must_use]
	pub fn child_path(&self, component: PathComponent) -> LdapPath {
		self.path.child(component)
	}

	/// This entry as a user, if it is one.
	#[must_use]
	pub fn as_user(&self) -> Option<User<'_>> {
		(self.kind == EntryKind::User).then_some(User(self))
	}

	/// This entry as a group, if it is one.
	#[must_use]
	pub fn as_group(&self) -> Option<Group<'_>> {
		(self.kind == EntryKind::Group).then_some(Group(self))
	}

	/// This entry as a computer, if it is one.
	#[must_use]
	pub fn as_computer(&self) -> Option<Computer<'_>> {
		(self.kind == EntryKind::Computer).then_some(Computer(self))
	}
}

impl fmt::Display for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.path)
	}
}

/// Decode `userAccountControl` into flag names.
fn account_control(entry: &Entry) -> Result<BTreeSet<&'static str>, Error> {
	Ok(USER_ACCOUNT_CONTROL.get_flag_names(entry.required_flags(ACCOUNT_CONTROL_FIELD)?))
}

/// Decode `sAMAccountType`.
fn sam_account_type(entry: &Entry) -> Result<Option<&'static str>, Error> {
	entry
		.get_integer("sAMAccountType")?
		.map(|number| SAM_ACCOUNT_TYPES.get_name(signed_to_unsigned(number)))
		.transpose()
}

/// A user account.
#[derive(Clone, Copy, Debug)]
pub struct User<'a>(&'a Entry);

impl User<'_> {
	/// Names of the `userAccountControl` flags which are set.
	pub fn account_control(&self) -> Result<BTreeSet<&'static str>, Error> {
		account_control(self.0)
	}

	/// Whether the account is disabled. Fails if `userAccountControl` is
	/// missing or has no value.
	pub fn account_disabled(&self) -> Result<bool, Error> {
		Ok(self.account_control()?.contains(ACCOUNT_DISABLE))
	}

	/// The decoded `sAMAccountType`.
	pub fn sam_account_type(&self) -> Result<Option<&'static str>, Error> {
		sam_account_type(self.0)
	}

	/// When the password was last changed.
	pub fn password_last_set(&self) -> Result<Option<AdTime>, Error> {
		self.0.get_time("pwdLastSet")
	}

	/// The last logon on the queried domain controller.
	pub fn last_logon(&self) -> Result<Option<AdTime>, Error> {
		self.0.get_time("lastLogon")
	}

	/// When the account expires.
	pub fn account_expires(&self) -> Result<Option<AdTime>, Error> {
		self.0.get_time("accountExpires")
	}
}

/// A computer account.
#[derive(Clone, Copy, Debug)]
pub struct Computer<'a>(&'a Entry);

impl Computer<'_> {
	/// Names of the `userAccountControl` flags which are set.
	pub fn account_control(&self) -> Result<BTreeSet<&'static str>, Error> {
		account_control(self.0)
	}

	/// The decoded `sAMAccountType`.
	pub fn sam_account_type(&self) -> Result<Option<&'static str>, Error> {
		sam_account_type(self.0)
	}
}

/// A group.
#[derive(Clone, Copy, Debug)]
pub struct Group<'a>(&'a Entry);

impl Group<'_> {
	/// Names of the `groupType` flags which are set.
	pub fn group_type(&self) -> Result<BTreeSet<&'static str>, Error> {
		Ok(GROUP_TYPES.get_flag_names(self.0.required_flags("groupType")?))
	}

	/// Paths of the direct members. A group without `member` attribute has
	/// no members.
	pub fn members(&self) -> Result<Vec<LdapPath>, Error> {
		let value = match self.0.get("member") {
			Ok(Some(value)) => value,
			Ok(None) | Err(Error::AttributeNotFound(_)) => return Ok(Vec::new()),
			Err(err) => return Err(err),
		};
		value
			.values()
			.iter()
			.map(|member| {
				member
					.as_str()
					.ok_or_else(|| Error::Invalid("member is not a string".to_owned()))?
					.parse()
			})
			.collect()
	}

	/// Walk this group and, depth first, all groups it contains. See
	/// [`Directory::walk`].
	pub fn walk<'d, P: DirectoryProvider>(
		&self,
		directory: &'d Directory<P>,
	) -> Result<GroupWalk<'d, P>, Error> {
		let group: Arc<Entry> = directory.produce_entry(self.0.path(), true)?;
		Ok(directory.walk(group))
	}
}
