//! A [`DirectoryProvider`] talking LDAP to a directory server.
//!
//! `ldap3` is asynchronous, so the provider owns a small tokio runtime and
//! blocks on it for each operation. Its methods must therefore not be called
//! from within an asynchronous context; use
//! [`tokio::task::spawn_blocking`] there.
use std::{
	collections::HashSet,
	sync::{Mutex, MutexGuard, PoisonError},
};

use ldap3::{
	adapters::{Adapter, EntriesOnly, PagedResults},
	LdapConnAsync, LdapError, Scope, SearchEntry, SearchStream,
};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::{
	config::{Config, QueryOptions},
	error::Error,
	path::{strip_url_prefix, LDAP_URL_PREFIX},
	provider::{
		query_statement, DirectoryProvider, Record, Row, Rows, Value, ACCOUNT_CONTROL_FIELD,
		URL_FIELD,
	},
	sql::{self, MATCH_ALL},
};

/// Result code of a search whose base does not exist.
const NO_SUCH_OBJECT: u32 = 32;

/// Constructed attribute listing every attribute the schema allows for an
/// entry, set or not.
const ALLOWED_ATTRIBUTES: &str = "allowedAttributes";

/// Attributes never reported as empty; they are expensive to read.
const IGNORED_ATTRIBUTES: &[&str] = &["nTSecurityDescriptor"];

/// Attributes requested for every query row.
const ROW_ATTRIBUTES: [&str; 1] = [ACCOUNT_CONTROL_FIELD];

/// Stream of a running query.
type QueryStream = SearchStream<'static, &'static str, [&'static str; 1]>;

/// Provides directory access over LDAP.
#[derive(Debug)]
pub struct LdapProvider {
	/// The configuration of the LDAP client.
	config: Config,
	/// Runs the connection and the operations on it.
	runtime: Runtime,
	/// Handle of the open connection.
	ldap: Mutex<Option<ldap3::Ldap>>,
}

impl LdapProvider {
	/// Create a provider. It connects when first used.
	pub fn new(config: Config) -> Result<Self, Error> {
		let runtime = Builder::new_multi_thread().worker_threads(1).enable_all().build()?;
		Ok(Self { config, runtime, ldap: Mutex::new(None) })
	}

	/// The configuration.
	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Lock the connection handle.
	fn lock(&self) -> MutexGuard<'_, Option<ldap3::Ldap>> {
		self.ldap.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// A handle of the connection, connecting first if necessary.
	fn handle(&self) -> Result<ldap3::Ldap, Error> {
		self.connect()?;
		self.lock()
			.clone()
			.ok_or_else(|| Error::Invalid("Connection closed while in use".to_owned()))
	}

	/// Unbind and close the connection, if it is open. Using the provider
	/// afterwards connects again.
	pub fn disconnect(&self) -> Result<(), Error> {
		let Some(mut ldap) = self.lock().take() else {
			return Ok(());
		};
		self.runtime.block_on(ldap.unbind())?;
		info!("Disconnected from {}", self.config.url);
		Ok(())
	}

	/// Start a search for the rows of a query.
	fn start_query(
		&self,
		dn: &str,
		filter: &str,
		options: &QueryOptions,
		statement: &str,
	) -> Result<QueryStream, Error> {
		let mut ldap = self.handle()?;
		let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
		if let Some(page_size) = options.page_size {
			adapters.push(Box::new(PagedResults::new(page_size)));
		}
		self.runtime
			.block_on(async {
				ldap.with_timeout(options.timeout)
					.streaming_search_with(adapters, dn, Scope::Subtree, filter, ROW_ATTRIBUTES)
					.await
			})
			.map_err(|err| query_error(statement, err))
	}
}

impl DirectoryProvider for LdapProvider {
	fn connect(&self) -> Result<(), Error> {
		let mut guard = self.lock();
		if guard.is_some() {
			return Ok(());
		}
		let settings = self.config.connection.to_settings()?;
		let ldap = self.runtime.block_on(async {
			let (conn, mut ldap) =
				LdapConnAsync::from_url_with_settings(settings, &self.config.url).await?;
			self.runtime.spawn(async move {
				if let Err(err) = conn.drive().await {
					warn!("Ldap connection error {err}");
				}
			});
			if let (Some(user), Some(password)) =
				(&self.config.search_user, &self.config.search_password)
			{
				ldap.simple_bind(user, password).await?.success()?;
			}
			Ok::<_, LdapError>(ldap)
		})?;
		info!("Connected to {}", self.config.url);
		*guard = Some(ldap);
		Ok(())
	}

	fn resolve(&self, url: &str) -> Result<Record, Error> {
		let mut ldap = self.handle()?;
		let dn = strip_url_prefix(url);
		let result = self.runtime.block_on(async {
			ldap.with_timeout(self.config.connection.operation_timeout)
				.search(dn, Scope::Base, MATCH_ALL, vec!["*", ALLOWED_ATTRIBUTES])
				.await
		})?;
		let entries = match result.success() {
			Ok((entries, _)) => entries,
			Err(LdapError::LdapResult { result }) if result.rc == NO_SUCH_OBJECT => {
				return Err(Error::NotFound(url.to_owned()));
			}
			Err(err) => return Err(err.into()),
		};
		let entry = entries
			.into_iter()
			.next()
			.map(SearchEntry::construct)
			.ok_or_else(|| Error::NotFound(url.to_owned()))?;
		Ok(entry.into_record())
	}

	fn query(
		&self,
		base_url: &str,
		where_clause: &str,
		options: &QueryOptions,
	) -> Result<Rows<'_>, Error> {
		let statement = query_statement(base_url, where_clause);
		let filter = sql::to_ldap_filter(where_clause).map_err(|err| match err {
			Error::Query { reason, .. } => Error::Query { query: statement.clone(), reason },
			other => other,
		})?;
		debug!("Searching below {base_url} with filter {filter}");
		let stream = self.start_query(strip_url_prefix(base_url), &filter, options, &statement)?;

		let rows = LdapRows { runtime: &self.runtime, stream: Some(stream), statement };
		if options.asynchronous {
			Ok(Box::new(rows))
		} else {
			let rows: Vec<Result<Row, Error>> = rows.collect();
			Ok(Box::new(rows.into_iter()))
		}
	}

	fn default_naming_context(&self) -> Result<String, Error> {
		if let Some(naming_context) = &self.config.naming_context {
			return Ok(naming_context.clone());
		}
		let mut ldap = self.handle()?;
		let (entries, _) = self
			.runtime
			.block_on(async {
				ldap.with_timeout(self.config.connection.operation_timeout)
					.search("", Scope::Base, MATCH_ALL, vec!["defaultNamingContext"])
					.await
			})?
			.success()?;
		entries
			.into_iter()
			.next()
			.map(SearchEntry::construct)
			.and_then(|entry| entry.attr_first("defaultNamingContext").map(str::to_owned))
			.ok_or_else(|| Error::Invalid("The rootDSE has no defaultNamingContext".to_owned()))
	}
}

/// Report a failed search as a rejected query, unless it failed for reasons
/// unrelated to the query.
fn query_error(statement: &str, err: LdapError) -> Error {
	match err {
		LdapError::LdapResult { result } => {
			let reason = format!("{} (result code {})", result.text, result.rc);
			Error::Query { query: statement.to_owned(), reason }
		}
		other => Error::Ldap(other),
	}
}

/// Rows pulled from a running search, one entry at a time.
struct LdapRows<'p> {
	/// Runtime of the connection
	runtime: &'p Runtime,
	/// The search, until it has been finished
	stream: Option<QueryStream>,
	/// The statement, for error messages
	statement: String,
}

impl Iterator for LdapRows<'_> {
	type Item = Result<Row, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		let stream = self.stream.as_mut()?;
		match self.runtime.block_on(stream.next()) {
			Ok(Some(entry)) => Some(Ok(SearchEntry::construct(entry).into_row())),
			Ok(None) => {
				let result = self.runtime.block_on(stream.finish());
				self.stream = None;
				result.success().err().map(|err| Err(query_error(&self.statement, err)))
			}
			Err(err) => {
				self.stream = None;
				Some(Err(query_error(&self.statement, err)))
			}
		}
	}
}

/// Conversions of [`SearchEntry`]s.
trait SearchEntryExt {
	/// Get the first value of an attribute. Will return `None` if attribute
	/// value is not valid UTF-8.
	fn attr_first(&self, attr: &str) -> Option<&str>;

	/// All attributes, with the most specific object class. Attributes the
	/// schema allows but which have no value are included without one.
	fn into_record(self) -> Record;

	/// The URL and account control flags.
	fn into_row(self) -> Row;
}

impl SearchEntryExt for SearchEntry {
	fn attr_first(&self, attr: &str) -> Option<&str> {
		let attr = self.attrs.get(attr)?;
		attr.first().map(String::as_str)
	}

	fn into_record(mut self) -> Record {
		let allowed = self
			.attrs
			.keys()
			.find(|name| name.eq_ignore_ascii_case(ALLOWED_ATTRIBUTES))
			.cloned()
			.and_then(|key| self.attrs.remove(&key))
			.unwrap_or_default();
		let mut present: HashSet<String> = self
			.attrs
			.keys()
			.chain(self.bin_attrs.keys())
			.map(|name| name.to_ascii_lowercase())
			.collect();
		let ignored = |name: &String| {
			IGNORED_ATTRIBUTES.iter().any(|ignored| name.eq_ignore_ascii_case(ignored))
		};
		let empty: Vec<(String, Option<Value>)> = allowed
			.into_iter()
			.filter(|name| !ignored(name))
			.filter(|name| present.insert(name.to_ascii_lowercase()))
			.map(|name| (name, None))
			.collect();

		let class_name = self
			.attrs
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case("objectClass"))
			.and_then(|(_, classes)| classes.last().cloned())
			.unwrap_or_default();
		let text = self
			.attrs
			.into_iter()
			.map(|(name, values)| (name, to_value(values.into_iter().map(Value::Text).collect())));
		let binary = self
			.bin_attrs
			.into_iter()
			.map(|(name, values)| (name, to_value(values.into_iter().map(Value::Bytes).collect())));
		Record { class_name, attributes: text.chain(binary).chain(empty).collect() }
	}

	fn into_row(self) -> Row {
		let account_control = self
			.attrs
			.into_iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(ACCOUNT_CONTROL_FIELD))
			.and_then(|(_, values)| to_value(values.into_iter().map(Value::Text).collect()));
		Row::new(
			[
				(URL_FIELD.to_owned(), Some(Value::Text(format!("{LDAP_URL_PREFIX}{}", self.dn)))),
				(ACCOUNT_CONTROL_FIELD.to_owned(), account_control),
			]
			.into_iter()
			.collect(),
		)
	}
}

/// A single value, several values, or none.
fn to_value(mut values: Vec<Value>) -> Option<Value> {
	match values.len() {
		0 => None,
		1 => values.pop(),
		_ => Some(Value::Multi(values)),
	}
}
