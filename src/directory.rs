//! The entry point: fetching, caching and searching directory entries.
use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use crate::{
	cache::EntryCache,
	config::QueryOptions,
	entry::{Entry, EntryKind},
	error::Error,
	filter::{self, equals, search_filter, Criteria, SearchFilter, SEARCH_FILTERS},
	mapping::{ACCOUNT_DISABLE, USER_ACCOUNT_CONTROL},
	path::{AsLdapPath, LdapPath, PathComponent},
	provider::DirectoryProvider,
};

/// Attributes a user name given to [`Directory::search_users`] is matched
/// against.
const USER_NAME_ATTRIBUTES: &[&str] = &["sAMAccountName", "displayName", "cn"];

/// URLs of found entries. Single pass, pulled lazily from the provider.
pub type SearchResults<'a> = Box<dyn Iterator<Item = Result<String, Error>> + 'a>;

/// Options of [`Directory::search`] besides the criteria.
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
	/// Only return enabled (`Some(true)`) or disabled (`Some(false)`)
	/// accounts. Entries without account control flags are always returned.
	pub active: Option<bool>,
	/// Where to search. Defaults to the directory root.
	pub search_base: Option<LdapPath>,
	/// The filter to use. Without one, it is picked by the keyword
	/// constraints in the criteria, see [`SEARCH_FILTERS`].
	pub search_filter: Option<SearchFilter>,
}

impl SearchOptions {
	/// Only return enabled or disabled accounts.
	#[must_use]
	pub fn active(mut self, active: bool) -> Self {
		self.active = Some(active);
		self
	}

	/// Search below the given entry.
	#[must_use]
	pub fn search_base(mut self, base: LdapPath) -> Self {
		self.search_base = Some(base);
		self
	}

	/// Search with the given filter.
	#[must_use]
	pub fn search_filter(mut self, filter: SearchFilter) -> Self {
		self.search_filter = Some(filter);
		self
	}
}

/// A directory, reached through a [`DirectoryProvider`].
///
/// Entries are fetched on demand and kept in a cache keyed by URL, so that
/// asking twice for the same entry yields the same [`Arc`].
#[derive(Debug)]
pub struct Directory<P> {
	/// Talks to the directory
	provider: P,
	/// Entries fetched so far
	cache: EntryCache,
	/// Options for every query
	options: QueryOptions,
}

impl<P: DirectoryProvider> Directory<P> {
	/// A directory using the default query options.
	#[must_use]
	pub fn new(provider: P) -> Self {
		Self::with_options(provider, QueryOptions::default())
	}

	/// A directory using the given query options.
	#[must_use]
	pub fn with_options(provider: P, options: QueryOptions) -> Self {
		Self { provider, cache: EntryCache::new(), options }
	}

	/// The provider.
	#[must_use]
	pub fn provider(&self) -> &P {
		&self.provider
	}

	/// The entry cache.
	#[must_use]
	pub fn cache(&self) -> &EntryCache {
		&self.cache
	}

	/// The entry at `path`.
	///
	/// With `lazy`, an entry cached earlier is returned as is. Otherwise,
	/// and when nothing is cached, the entry is fetched and replaces any
	/// cached one.
	pub fn produce_entry<T>(&self, path: &T, lazy: bool) -> Result<Arc<Entry>, Error>
	where
		T: AsLdapPath + ?Sized,
	{
		let path = path.to_ldap_path()?;
		let url = path.url();
		if lazy {
			if let Some(entry) = self.cache.get(&url) {
				debug!("Cache hit for {url}");
				return Ok(entry);
			}
		}
		self.provider.connect()?;
		let record = self.provider.resolve(&url)?;
		let entry = Arc::new(Entry::from_record(path, record));
		debug!("Fetched {url} as {:?}", entry.kind());
		Ok(self.cache.insert(url, entry))
	}

	/// The root entry of the directory, i.e. its default naming context.
	pub fn root(&self) -> Result<Arc<Entry>, Error> {
		if let Some(url) = self.cache.root_url() {
			return self.produce_entry(&url, true);
		}
		self.provider.connect()?;
		let path: LdapPath = self.provider.default_naming_context()?.parse()?;
		self.cache.set_root_url(path.url());
		self.produce_entry(&path, true)
	}

	/// The entry containing `entry`, or `None` at the top.
	pub fn parent(&self, entry: &Entry) -> Result<Option<Arc<Entry>>, Error> {
		entry.parent_path().map(|path| self.produce_entry(&path, true)).transpose()
	}

	/// The entry directly below `entry` named by `component`, e.g.
	/// `"cn=Users"`.
	pub fn child(&self, entry: &Entry, component: &str) -> Result<Arc<Entry>, Error> {
		let component: PathComponent = component.parse()?;
		self.produce_entry(&entry.child_path(component), true)
	}

	/// Search for entries, yielding their URLs.
	///
	/// Without an explicit [`SearchOptions::search_filter`], the criteria are
	/// checked for the keywords of [`SEARCH_FILTERS`] in table order. The
	/// first keyword found selects its filter and its value becomes the
	/// primary key; without any keyword, an empty filter is used.
	///
	/// An invalid clause or a query the directory rejects fails right away;
	/// errors while reading the results are yielded by the iterator.
	pub fn search(
		&self,
		mut criteria: Criteria,
		options: SearchOptions,
	) -> Result<SearchResults<'_>, Error> {
		let base = match options.search_base {
			Some(base) => base,
			None => self.root()?.path().clone(),
		};
		let search_filter = match options.search_filter {
			Some(filter) => filter,
			None => select_filter(&mut criteria),
		};
		self.provider.connect()?;
		let rows = search_filter.execute_query(&self.provider, &base, &criteria, &self.options)?;

		let active = options.active;
		let results = rows.filter_map(move |row| {
			let row = match row {
				Ok(row) => row,
				Err(err) => return Some(Err(err)),
			};
			if let (Some(active), Some(flags)) = (active, row.account_control()) {
				let disabled = USER_ACCOUNT_CONTROL.contains(flags, ACCOUNT_DISABLE);
				if disabled == active {
					return None;
				}
			}
			Some(row.url().map(str::to_owned))
		});
		Ok(Box::new(results))
	}

	/// Search for user accounts.
	///
	/// A `name` matches any of `sAMAccountName`, `displayName` and `cn`,
	/// except those the criteria constrain already.
	pub fn search_users(
		&self,
		name: Option<&str>,
		mut criteria: Criteria,
		mut options: SearchOptions,
	) -> Result<SearchResults<'_>, Error> {
		if let Some(name) = name {
			let alternatives: Vec<String> = USER_NAME_ATTRIBUTES
				.iter()
				.filter(|attribute| criteria.constraint(attribute).is_none())
				.map(|attribute| equals(attribute, name))
				.collect();
			if !alternatives.is_empty() {
				criteria.prepend_clause(alternatives.join(" OR "));
			}
		}
		options.search_filter = search_filter(filter::USERID).cloned();
		self.search(criteria, options)
	}

	/// The first entry a search finds, if any.
	pub fn get_first_entry(
		&self,
		criteria: Criteria,
		options: SearchOptions,
	) -> Result<Option<Arc<Entry>>, Error> {
		let first = self.search(criteria, options)?.next();
		self.materialize(first)
	}

	/// The first user a search finds, if any.
	pub fn get_first_user(
		&self,
		name: Option<&str>,
		criteria: Criteria,
		options: SearchOptions,
	) -> Result<Option<Arc<Entry>>, Error> {
		let first = self.search_users(name, criteria, options)?.next();
		self.materialize(first)
	}

	/// The first entry below the root matching the criteria.
	pub fn find(&self, criteria: Criteria) -> Result<Option<Arc<Entry>>, Error> {
		self.get_first_entry(criteria, SearchOptions::default())
	}

	/// The user with the given account name or display name.
	pub fn find_user(&self, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.get_first_user(Some(name), Criteria::new(), SearchOptions::default())
	}

	/// The group with the given common name.
	pub fn find_group(&self, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.find_by_keyword(filter::GROUP, name)
	}

	/// The computer with the given common name.
	pub fn find_computer(&self, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.find_by_keyword(filter::COMPUTER, name)
	}

	/// The organizational unit with the given name.
	pub fn find_ou(&self, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.find_by_keyword(filter::OU, name)
	}

	/// The public folder with the given display name.
	pub fn find_public_folder(&self, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.find_by_keyword(filter::PUBLIC_FOLDER, name)
	}

	/// First entry of a keyword search.
	fn find_by_keyword(&self, keyword: &str, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		self.find(Criteria::new().with(keyword, name))
	}

	/// Turn the first search result into an entry.
	fn materialize(
		&self,
		first: Option<Result<String, Error>>,
	) -> Result<Option<Arc<Entry>>, Error> {
		first.map(|url| self.produce_entry(&url?, true)).transpose()
	}

	/// Walk a group and, depth first, every group it contains.
	///
	/// Each step yields a group with its direct member groups and users, in
	/// preorder.
	/// Members are looked up through the cache. A group is visited once per
	/// walk, even if it is reachable along several paths or through a cycle.
	#[must_use]
	pub fn walk(&self, group: Arc<Entry>) -> GroupWalk<'_, P> {
		GroupWalk { directory: self, stack: vec![group], visited: HashSet::new() }
	}
}

/// Pick the predefined filter whose keyword the criteria use, turning the
/// keyword's value into the primary key.
fn select_filter(criteria: &mut Criteria) -> SearchFilter {
	for (keyword, candidate) in SEARCH_FILTERS.iter() {
		if let Some(value) = criteria.take(keyword) {
			*criteria = std::mem::take(criteria).primary_key(value);
			return candidate.clone();
		}
	}
	SearchFilter::empty()
}

/// One step of a [`GroupWalk`].
#[derive(Clone, Debug)]
pub struct WalkStep {
	/// The group visited.
	pub group: Arc<Entry>,
	/// Its direct members which are groups.
	pub groups: Vec<Arc<Entry>>,
	/// Its direct members which are users.
	pub users: Vec<Arc<Entry>>,
}

/// Depth first iteration over nested groups, see [`Directory::walk`].
///
/// After an error, the walk ends.
#[derive(Debug)]
pub struct GroupWalk<'d, P> {
	/// Where members are looked up
	directory: &'d Directory<P>,
	/// Groups still to be visited, the next one last
	stack: Vec<Arc<Entry>>,
	/// URLs of the groups visited
	visited: HashSet<String>,
}

impl<P: DirectoryProvider> GroupWalk<'_, P> {
	/// Visit a group: resolve its members and schedule the member groups.
	fn step(&mut self, group: Arc<Entry>) -> Result<WalkStep, Error> {
		let members = match group.as_group() {
			Some(view) => view.members()?,
			None => Vec::new(),
		};
		let mut groups = Vec::new();
		let mut users = Vec::new();
		for member in members {
			let entry = self.directory.produce_entry(&member, true)?;
			match entry.kind() {
				EntryKind::Group => groups.push(entry),
				EntryKind::User => users.push(entry),
				_ => {}
			}
		}
		self.stack.extend(
			groups.iter().rev().filter(|member| !self.visited.contains(&member.url())).cloned(),
		);
		Ok(WalkStep { group, groups, users })
	}
}

impl<P: DirectoryProvider> Iterator for GroupWalk<'_, P> {
	type Item = Result<WalkStep, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		let group = loop {
			let group = self.stack.pop()?;
			if self.visited.insert(group.url()) {
				break group;
			}
			debug!("Not visiting {group} again");
		};
		match self.step(group) {
			Ok(step) => Some(Ok(step)),
			Err(err) => {
				warn!("Walking groups failed: {err}");
				self.stack.clear();
				Some(Err(err))
			}
		}
	}
}
