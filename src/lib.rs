//! Read-only access to Active Directory entries.
//!
//! Entries are addressed by their distinguished name ([`LdapPath`]) and
//! fetched through a [`Directory`], which caches them so that every entry is
//! fetched once per process unless a fresh copy is asked for. Attributes are
//! looked up by name regardless of case. Users, groups and computers get
//! typed views decoding their flag words and times.
//!
//! Searches are built from [`Criteria`] and a [`SearchFilter`], and yield the
//! URLs of the found entries lazily. The predefined filters in
//! [`SEARCH_FILTERS`](filter::SEARCH_FILTERS) are selected by keyword:
//! `Criteria::new().with("group", "Staff")` looks for groups with the common
//! name `Staff`.
//!
//! The directory is reached through a [`DirectoryProvider`]; [`LdapProvider`]
//! speaks LDAP using the `ldap3` crate. For a general primer on LDAP, the
//! [introduction] of `ldap3` is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use url::Url;
//! use ad_reader::{
//!     config::{Config, ConnectionConfig, QueryOptions},
//!     Criteria, Directory, LdapProvider, SearchOptions,
//! };
//!
//! // Configuration can also be deserialized with serde. It's hand-constructed
//! // here for demonstration purposes.
//! let config = Config {
//!     url: Url::parse("ldap://dc01.example.com")?,
//!     connection: ConnectionConfig::default(),
//!     search_user: Some("EXAMPLE\\reader".to_owned()),
//!     search_password: Some("verysecret".to_owned()),
//!     naming_context: None,
//!     query: QueryOptions::default(),
//! };
//!
//! let directory = Directory::with_options(LdapProvider::new(config.clone())?, config.query);
//! if let Some(user) = directory.find_user("jdoe")? {
//!     println!("{user}: disabled = {:?}", user.as_user().map(|user| user.account_disabled()));
//! }
//!
//! let disabled = SearchOptions::default().active(false);
//! for url in directory.search_users(None, Criteria::new(), disabled)? {
//!     let mut dump = String::new();
//!     directory.produce_entry(&url?, true)?.print_dump(&mut dump)?;
//!     println!("{dump}");
//! }
//!
//! if let Some(group) = directory.find_group("Staff")? {
//!     for step in directory.walk(group) {
//!         let step = step?;
//!         println!("{} has {} users", step.group, step.users.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Nothing is ever written to the directory.
//! * Cached entries are not refreshed by themselves; ask for a fresh copy
//!   with [`Directory::produce_entry`] when it matters.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing the search user
//!   password, it probably should be
//! * The `WHERE` clauses understood by [`LdapProvider`] are limited to
//!   comparisons joined with `AND`, `OR` and `NOT`, see [`sql`].

pub mod cache;
pub mod config;
pub mod convert;
pub mod directory;
pub mod entry;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod mapping;
pub mod path;
pub mod provider;
pub mod sql;

pub use ldap3;

pub use crate::{
	config::{Config, ConnectionConfig, QueryOptions},
	directory::{Directory, GroupWalk, SearchOptions, SearchResults, WalkStep},
	entry::{Computer, Entry, EntryKind, Group, User},
	error::Error,
	filter::{Criteria, SearchFilter},
	ldap::LdapProvider,
	path::{AsLdapPath, LdapPath, PathComponent},
	provider::{DirectoryProvider, Record, Row, Rows, Value},
};
