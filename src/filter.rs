//! Building the `WHERE` clauses of directory queries.
use std::sync::LazyLock;

use tracing::debug;

use crate::{
	config::QueryOptions,
	error::Error,
	path::LdapPath,
	provider::{query_statement, DirectoryProvider, Rows},
};

/// Constraint name standing for "the primary key of whatever filter is used".
pub const PRIMARY_KEY: &str = "_primary_key_";

/// What to search for: raw clause fragments plus `name = 'value'`
/// constraints.
///
/// ```
/// use ad_reader::Criteria;
///
/// let criteria = Criteria::new()
/// 	.clause("whenChanged >= '20240101000000.0Z'")
/// 	.with("department", "Sales")
/// 	.primary_key("jdoe");
/// assert_eq!(criteria.constraint("department"), Some("Sales"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria {
	/// Raw fragments, used verbatim.
	clauses: Vec<String>,
	/// Named constraints in insertion order. Names are unique, ignoring case.
	constraints: Vec<(String, String)>,
}

impl Criteria {
	/// No constraints at all.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a raw clause fragment such as `"cn = 'a' OR cn = 'b'"`. It is not
	/// checked here; a broken fragment makes the query fail.
	#[must_use]
	pub fn clause(mut self, clause: impl Into<String>) -> Self {
		self.clauses.push(clause.into());
		self
	}

	/// Require attribute `name` to equal `value`. Replaces an earlier
	/// constraint on the same attribute.
	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let (name, value) = (name.into(), value.into());
		match self.constraints.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
		{
			Some((_, existing)) => *existing = value,
			None => self.constraints.push((name, value)),
		}
		self
	}

	/// Require the primary key attribute of the search filter to equal
	/// `value`.
	#[must_use]
	pub fn primary_key(self, value: impl Into<String>) -> Self {
		self.with(PRIMARY_KEY, value)
	}

	/// The raw clause fragments.
	#[must_use]
	pub fn clauses(&self) -> &[String] {
		&self.clauses
	}

	/// The value a named constraint requires.
	#[must_use]
	pub fn constraint(&self, name: &str) -> Option<&str> {
		self.constraints
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Remove a named constraint, returning its value.
	pub(crate) fn take(&mut self, name: &str) -> Option<String> {
		let index =
			self.constraints.iter().position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
		Some(self.constraints.remove(index).1)
	}

	/// Put a raw clause fragment in front of all others.
	pub(crate) fn prepend_clause(&mut self, clause: String) {
		self.clauses.insert(0, clause);
	}
}

/// A reusable search template: the attribute searched by
/// [`Criteria::primary_key`], plus constraints which every search made with
/// it has.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchFilter {
	/// Attribute the primary key constraint applies to.
	primary_key_name: Option<String>,
	/// Constraints which always apply and win over caller constraints.
	fixed: Vec<(String, String)>,
}

impl SearchFilter {
	/// A filter whose primary key is the given attribute.
	#[must_use]
	pub fn new(primary_key_name: impl Into<String>) -> Self {
		Self { primary_key_name: Some(primary_key_name.into()), fixed: Vec::new() }
	}

	/// A filter without primary key and without fixed constraints.
	#[must_use]
	pub fn empty() -> Self {
		Self::default()
	}

	/// Add a constraint that every search with this filter has.
	#[must_use]
	pub fn with_fixed(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.fixed.push((name.into(), value.into()));
		self
	}

	/// The primary key attribute.
	#[must_use]
	pub fn primary_key_name(&self) -> Option<&str> {
		self.primary_key_name.as_deref()
	}

	/// The fixed constraints.
	#[must_use]
	pub fn fixed_constraints(&self) -> &[(String, String)] {
		&self.fixed
	}

	/// Whether a fixed constraint applies to the attribute.
	fn is_fixed(&self, name: &str) -> bool {
		self.fixed.iter().any(|(fixed, _)| fixed.eq_ignore_ascii_case(name))
	}

	/// Build the `WHERE` clause for a search, or an empty string if there is
	/// nothing to constrain.
	///
	/// The fragments are, in order: the raw clauses (parenthesized when
	/// combined with others), the named constraints, the fixed constraints and
	/// the primary key constraint. A named constraint on an attribute with a
	/// fixed constraint is dropped, as is one on the primary key attribute if
	/// a primary key is given.
	///
	/// Fails if a primary key is given but the filter has no primary key
	/// attribute.
	pub fn where_clause(&self, criteria: &Criteria) -> Result<String, Error> {
		let primary_key = criteria.constraint(PRIMARY_KEY);
		let primary_key = match (primary_key, &self.primary_key_name) {
			(None, _) => None,
			(Some(value), Some(name)) => Some((name.as_str(), value)),
			(Some(value), None) => {
				return Err(Error::Invalid(format!(
					"Primary key {value:?} given, but the search filter has no primary key"
				)))
			}
		};

		let named = criteria.constraints.iter().filter(|(name, _)| {
			!name.eq_ignore_ascii_case(PRIMARY_KEY)
				&& !self.is_fixed(name)
				&& primary_key.map_or(true, |(key, _)| !key.eq_ignore_ascii_case(name))
		});
		let constraints: Vec<String> = named
			.chain(self.fixed.iter())
			.map(|(name, value)| equals(name, value))
			.chain(
				primary_key
					.filter(|(name, _)| !self.is_fixed(name))
					.map(|(name, value)| equals(name, value)),
			)
			.collect();

		let total = criteria.clauses.len() + constraints.len();
		let fragments: Vec<String> = criteria
			.clauses
			.iter()
			.map(|clause| if total > 1 { format!("({clause})") } else { clause.clone() })
			.chain(constraints)
			.collect();

		if fragments.is_empty() {
			return Ok(String::new());
		}
		Ok(format!("WHERE {}", fragments.join(" AND ")))
	}

	/// Run a search below `base` and return the resulting rows.
	pub fn execute_query<'p, P>(
		&self,
		provider: &'p P,
		base: &LdapPath,
		criteria: &Criteria,
		options: &QueryOptions,
	) -> Result<Rows<'p>, Error>
	where
		P: DirectoryProvider + ?Sized,
	{
		let base_url = base.url();
		let where_clause = self.where_clause(criteria)?;
		debug!("Executing query {}", query_statement(&base_url, &where_clause));
		provider.query(&base_url, &where_clause, options)
	}
}

/// Render `name = 'value'`, doubling quotes in the value.
pub(crate) fn equals(name: &str, value: &str) -> String {
	format!("{name} = '{}'", value.replace('\'', "''"))
}

/// Keyword for the computer search filter.
pub const COMPUTER: &str = "computer";
/// Keyword for the group search filter.
pub const GROUP: &str = "group";
/// Keyword for the organizational unit search filter.
pub const OU: &str = "ou";
/// Keyword for the public folder search filter.
pub const PUBLIC_FOLDER: &str = "public_folder";
/// Keyword for the user search filter.
pub const USERID: &str = "userid";

/// The predefined search filters and the keywords selecting them, in the
/// order in which [`Directory::search`](crate::Directory::search) looks for
/// the keywords.
pub static SEARCH_FILTERS: LazyLock<Vec<(&'static str, SearchFilter)>> = LazyLock::new(|| {
	vec![
		(COMPUTER, SearchFilter::new("cn").with_fixed("objectCategory", "Computer")),
		(GROUP, SearchFilter::new("cn").with_fixed("objectCategory", "group")),
		(OU, SearchFilter::new("ou").with_fixed("objectClass", "organizationalUnit")),
		(PUBLIC_FOLDER, SearchFilter::new("displayName").with_fixed("objectClass", "publicFolder")),
		(
			USERID,
			SearchFilter::new("sAMAccountName")
				.with_fixed("objectCategory", "Person")
				.with_fixed("objectClass", "User"),
		),
	]
});

/// The predefined search filter for a keyword.
#[must_use]
pub fn search_filter(keyword: &str) -> Option<&'static SearchFilter> {
	SEARCH_FILTERS.iter().find(|(candidate, _)| *candidate == keyword).map(|(_, filter)| filter)
}
