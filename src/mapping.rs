//! Bidirectional name/number tables for the integer-coded attributes Active
//! Directory uses, such as `userAccountControl` or `groupType`.
use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	fmt,
	sync::LazyLock,
};

use crate::error::Error;

/// Reinterpret a (possibly negative) 32 bit attribute value as unsigned.
///
/// Directories report flag words such as `groupType` as signed integers, so
/// `SECURITY_ENABLED` shows up as a negative number.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub const fn signed_to_unsigned(number: i64) -> u32 {
	number as u32
}

/// Mapping of names to unsigned integers, supporting lookups in each
/// direction.
#[derive(Clone)]
pub struct NamedValueMapping {
	/// Name to number, in table order.
	by_name: Vec<(String, u32)>,
	/// Index into `by_name`.
	name_index: HashMap<String, usize>,
	/// Number to name. A later name with the same number wins.
	by_number: BTreeMap<u32, String>,
}

impl NamedValueMapping {
	/// Build a mapping from `(name, number)` pairs.
	///
	/// Fails with [`Error::DuplicateMappingName`] if a name occurs twice.
	/// Several names may share a number; the reverse lookup then yields the
	/// one listed last.
	pub fn new<I, S>(pairs: I) -> Result<Self, Error>
	where
		I: IntoIterator<Item = (S, u32)>,
		S: Into<String>,
	{
		let mut mapping =
			Self { by_name: Vec::new(), name_index: HashMap::new(), by_number: BTreeMap::new() };
		for (name, number) in pairs {
			let name = name.into();
			if mapping.name_index.contains_key(&name) {
				return Err(Error::DuplicateMappingName(name));
			}
			mapping.name_index.insert(name.clone(), mapping.by_name.len());
			mapping.by_number.insert(number, name.clone());
			mapping.by_name.push((name, number));
		}
		Ok(mapping)
	}

	/// Build one of the fixed tables of this module. The tables are checked
	/// for duplicates by the unit tests, so the check is skipped here.
	fn from_table(table: &[(&str, u32)]) -> Self {
		let mut mapping =
			Self { by_name: Vec::new(), name_index: HashMap::new(), by_number: BTreeMap::new() };
		for &(name, number) in table {
			mapping.name_index.insert(name.to_owned(), mapping.by_name.len());
			mapping.by_number.insert(number, name.to_owned());
			mapping.by_name.push((name.to_owned(), number));
		}
		mapping
	}

	/// Return the name assigned to exactly this number.
	pub fn get_name(&self, number: u32) -> Result<&str, Error> {
		self.by_number.get(&number).map(String::as_str).ok_or(Error::UnknownMappingValue(number))
	}

	/// Return the number assigned to a name.
	#[must_use]
	pub fn get_value(&self, name: &str) -> Option<u32> {
		self.name_index.get(name).map(|&index| self.by_name[index].1)
	}

	/// `(name, number)` pairs in table order.
	pub fn items(&self) -> impl Iterator<Item = (&str, u32)> {
		self.by_name.iter().map(|(name, number)| (name.as_str(), *number))
	}
}

impl fmt::Debug for NamedValueMapping {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.items()).finish()
	}
}

/// A [`NamedValueMapping`] of bit flags, which can decompose a bit mask into
/// the names of the flags it contains.
#[derive(Clone, Debug)]
pub struct FlagsMapping(NamedValueMapping);

impl FlagsMapping {
	/// Build a flags mapping. See [`NamedValueMapping::new`].
	pub fn new<I, S>(pairs: I) -> Result<Self, Error>
	where
		I: IntoIterator<Item = (S, u32)>,
		S: Into<String>,
	{
		NamedValueMapping::new(pairs).map(Self)
	}

	/// Names of all flags whose bits are all set in `mask`.
	///
	/// Aliases sharing a bit pattern are all included. A zero valued flag
	/// matches every mask.
	#[must_use]
	pub fn get_flag_names(&self, mask: u32) -> BTreeSet<&str> {
		self.0.items().filter(|&(_, bits)| mask & bits == bits).map(|(name, _)| name).collect()
	}

	/// Whether all bits of the named flag are set in `mask`. Unknown names
	/// never match.
	#[must_use]
	pub fn contains(&self, mask: u32, name: &str) -> bool {
		self.0.get_value(name).is_some_and(|bits| mask & bits == bits)
	}
}

impl std::ops::Deref for FlagsMapping {
	type Target = NamedValueMapping;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Name of the `userAccountControl` flag marking a disabled account.
pub const ACCOUNT_DISABLE: &str = "ADS_UF_ACCOUNTDISABLE";

/// Bits of the `groupType` attribute.
const GROUP_TYPES_TABLE: &[(&str, u32)] = &[
	("GLOBAL_GROUP", 0x0000_0002),
	("DOMAIN_LOCAL_GROUP", 0x0000_0004),
	("LOCAL_GROUP", 0x0000_0004),
	("UNIVERSAL_GROUP", 0x0000_0008),
	("SECURITY_ENABLED", 0x8000_0000),
];

/// ADSI authentication flags.
const AUTHENTICATION_TYPES_TABLE: &[(&str, u32)] = &[
	("SECURE_AUTHENTICATION", 0x01),
	("USE_ENCRYPTION", 0x02),
	("USE_SSL", 0x02),
	("READONLY_SERVER", 0x04),
	("PROMPT_CREDENTIALS", 0x08),
	("NO_AUTHENTICATION", 0x10),
	("FAST_BIND", 0x20),
	("USE_SIGNING", 0x40),
	("USE_SEALING", 0x80),
	("USE_DELEGATION", 0x100),
	("SERVER_BIND", 0x200),
	("AUTH_RESERVED", 0x8000_0000),
];

/// Values of the `sAMAccountType` attribute.
const SAM_ACCOUNT_TYPES_TABLE: &[(&str, u32)] = &[
	("SAM_DOMAIN_OBJECT", 0x0),
	("SAM_GROUP_OBJECT", 0x1000_0000),
	("SAM_NON_SECURITY_GROUP_OBJECT", 0x1000_0001),
	("SAM_ALIAS_OBJECT", 0x2000_0000),
	("SAM_NON_SECURITY_ALIAS_OBJECT", 0x2000_0001),
	("SAM_USER_OBJECT", 0x3000_0000),
	("SAM_NORMAL_USER_ACCOUNT", 0x3000_0000),
	("SAM_MACHINE_ACCOUNT", 0x3000_0001),
	("SAM_TRUST_ACCOUNT", 0x3000_0002),
	("SAM_APP_BASIC_GROUP", 0x4000_0000),
	("SAM_APP_QUERY_GROUP", 0x4000_0001),
	("SAM_ACCOUNT_TYPE_MAX", 0x7fff_ffff),
];

/// Bits of the `userAccountControl` attribute.
const USER_ACCOUNT_CONTROL_TABLE: &[(&str, u32)] = &[
	("ADS_UF_SCRIPT", 0x0000_0001),
	(ACCOUNT_DISABLE, 0x0000_0002),
	("ADS_UF_HOMEDIR_REQUIRED", 0x0000_0008),
	("ADS_UF_LOCKOUT", 0x0000_0010),
	("ADS_UF_PASSWD_NOTREQD", 0x0000_0020),
	("ADS_UF_PASSWD_CANT_CHANGE", 0x0000_0040),
	("ADS_UF_ENCRYPTED_TEXT_PASSWORD_ALLOWED", 0x0000_0080),
	("ADS_UF_TEMP_DUPLICATE_ACCOUNT", 0x0000_0100),
	("ADS_UF_NORMAL_ACCOUNT", 0x0000_0200),
	("ADS_UF_INTERDOMAIN_TRUST_ACCOUNT", 0x0000_0800),
	("ADS_UF_WORKSTATION_TRUST_ACCOUNT", 0x0000_1000),
	("ADS_UF_SERVER_TRUST_ACCOUNT", 0x0000_2000),
	("ADS_UF_DONT_EXPIRE_PASSWD", 0x0001_0000),
	("ADS_UF_MNS_LOGON_ACCOUNT", 0x0002_0000),
	("ADS_UF_SMARTCARD_REQUIRED", 0x0004_0000),
	("ADS_UF_TRUSTED_FOR_DELEGATION", 0x0008_0000),
	("ADS_UF_NOT_DELEGATED", 0x0010_0000),
	("ADS_UF_USE_DES_KEY_ONLY", 0x0020_0000),
	("ADS_UF_DONT_REQUIRE_PREAUTH", 0x0040_0000),
	("ADS_UF_PASSWORD_EXPIRED", 0x0080_0000),
	("ADS_UF_TRUSTED_TO_AUTHENTICATE_FOR_DELEGATION", 0x0100_0000),
];

/// Flags of the `groupType` attribute.
pub static GROUP_TYPES: LazyLock<FlagsMapping> =
	LazyLock::new(|| FlagsMapping(NamedValueMapping::from_table(GROUP_TYPES_TABLE)));

/// ADSI authentication flags.
pub static AUTHENTICATION_TYPES: LazyLock<FlagsMapping> =
	LazyLock::new(|| FlagsMapping(NamedValueMapping::from_table(AUTHENTICATION_TYPES_TABLE)));

/// Values of the `sAMAccountType` attribute.
pub static SAM_ACCOUNT_TYPES: LazyLock<NamedValueMapping> =
	LazyLock::new(|| NamedValueMapping::from_table(SAM_ACCOUNT_TYPES_TABLE));

/// Flags of the `userAccountControl` attribute.
pub static USER_ACCOUNT_CONTROL: LazyLock<FlagsMapping> =
	LazyLock::new(|| FlagsMapping(NamedValueMapping::from_table(USER_ACCOUNT_CONTROL_TABLE)));
