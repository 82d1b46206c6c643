#![allow(dead_code)]

use std::{
	collections::BTreeMap,
	error::Error,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
};

use ad_reader::{
	config::QueryOptions, path::strip_url_prefix, provider::query_statement, DirectoryProvider,
	Record, Row, Rows, Value,
};
use ldap3::LdapConnAsync;

pub const ROOT: &str = "DC=example,DC=com";
pub const STAFF: &str = "OU=Staff,DC=example,DC=com";
pub const EMPTY: &str = "OU=Empty,DC=example,DC=com";
pub const ALICE: &str = "CN=alice,OU=Staff,DC=example,DC=com";
pub const BOB: &str = "CN=bob,OU=Staff,DC=example,DC=com";
pub const CAROL: &str = "CN=carol,OU=Staff,DC=example,DC=com";
pub const WS01: &str = "CN=ws01,OU=Staff,DC=example,DC=com";
pub const TEAM_A: &str = "CN=Team A,OU=Staff,DC=example,DC=com";
pub const TEAM_B: &str = "CN=Team B,OU=Staff,DC=example,DC=com";
pub const TEAM_C: &str = "CN=Team C,OU=Staff,DC=example,DC=com";
pub const BROKEN: &str = "CN=Broken,OU=Staff,DC=example,DC=com";

/// Where clauses containing this are rejected like a directory would.
pub const REJECTED: &str = "bogus";

pub fn url(dn: &str) -> String {
	format!("LDAP://{dn}")
}

/// An in-memory directory.
#[derive(Debug, Default)]
pub struct FakeProvider {
	/// Records by URL
	pub records: BTreeMap<String, Record>,
	pub connects: AtomicUsize,
	pub resolves: Mutex<Vec<String>>,
	pub naming_context_lookups: AtomicUsize,
	/// Where clauses of all queries, in order
	pub queries: Mutex<Vec<String>>,
}

impl FakeProvider {
	pub fn add(&mut self, dn: &str, class_name: &str, attributes: Vec<(&str, Option<Value>)>) {
		let attributes =
			attributes.into_iter().map(|(name, value)| (name.to_owned(), value)).collect();
		self.records.insert(url(dn), Record { class_name: class_name.to_owned(), attributes });
	}

	pub fn resolve_count(&self, dn: &str) -> usize {
		self.resolves.lock().unwrap().iter().filter(|resolved| **resolved == url(dn)).count()
	}

	pub fn last_query(&self) -> Option<String> {
		self.queries.lock().unwrap().last().cloned()
	}
}

/// A small domain: an OU with users, a computer and nested groups (Team A
/// and Team B contain each other, Team C contains Team B).
pub fn example() -> FakeProvider {
	let mut provider = FakeProvider::default();
	provider.add(ROOT, "domainDNS", vec![("dc", Some(Value::from("example")))]);
	provider.add(STAFF, "organizationalUnit", vec![("ou", Some(Value::from("Staff")))]);
	provider.add(EMPTY, "organizationalUnit", vec![("ou", Some(Value::from("Empty")))]);
	provider.add(ALICE, "user", vec![
		("sAMAccountName", Some(Value::from("alice"))),
		("displayName", Some(Value::from("Alice Example"))),
		("userAccountControl", Some(Value::from("512"))),
		("description", None),
	]);
	provider.add(BOB, "user", vec![
		("sAMAccountName", Some(Value::from("bob"))),
		("userAccountControl", Some(Value::from("514"))),
	]);
	provider.add(CAROL, "user", vec![("sAMAccountName", Some(Value::from("carol")))]);
	provider.add(WS01, "computer", vec![("userAccountControl", Some(Value::from("4096")))]);
	provider.add(TEAM_A, "group", vec![(
		"member",
		Some(Value::Multi(vec![Value::from(ALICE), Value::from(TEAM_B)])),
	)]);
	provider.add(TEAM_B, "group", vec![(
		"member",
		Some(Value::Multi(vec![Value::from(BOB), Value::from(TEAM_A), Value::from(WS01)])),
	)]);
	provider.add(TEAM_C, "group", vec![("member", Some(Value::from(TEAM_B)))]);
	provider.add(BROKEN, "group", vec![(
		"member",
		Some(Value::Multi(vec![
			Value::from("CN=ghost,OU=Staff,DC=example,DC=com"),
			Value::from(ALICE),
		])),
	)]);
	provider
}

impl DirectoryProvider for FakeProvider {
	fn connect(&self) -> Result<(), ad_reader::Error> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn resolve(&self, url: &str) -> Result<Record, ad_reader::Error> {
		self.resolves.lock().unwrap().push(url.to_owned());
		self.records.get(url).cloned().ok_or_else(|| ad_reader::Error::NotFound(url.to_owned()))
	}

	/// Every entry strictly below the base, in URL order. Of the clause, only
	/// `cn = '…'` constraints are checked, against the first path component.
	fn query(
		&self,
		base_url: &str,
		where_clause: &str,
		_options: &QueryOptions,
	) -> Result<Rows<'_>, ad_reader::Error> {
		self.queries.lock().unwrap().push(where_clause.to_owned());
		if where_clause.contains(REJECTED) {
			return Err(ad_reader::Error::Query {
				query: query_statement(base_url, where_clause),
				reason: "Syntax error".to_owned(),
			});
		}
		let suffix = format!(",{}", strip_url_prefix(base_url));
		let names: Vec<String> = where_clause
			.match_indices("cn = '")
			.map(|(index, pattern)| {
				let rest = &where_clause[index + pattern.len()..];
				format!("LDAP://CN={},", &rest[..rest.find('\'').unwrap_or(rest.len())])
			})
			.collect();
		let rows = self
			.records
			.iter()
			.filter(move |(url, _)| {
				url.ends_with(&suffix)
					&& names.iter().all(|prefix| url.starts_with(prefix.as_str()))
			})
			.map(|(url, record)| {
				let account_control = record
					.attributes
					.iter()
					.find(|(name, _)| name == "userAccountControl")
					.and_then(|(_, value)| value.clone());
				Ok(Row::new(
					[
						("ADsPath".to_owned(), Some(Value::from(url.as_str()))),
						("userAccountControl".to_owned(), account_control),
					]
					.into_iter()
					.collect(),
				))
			});
		Ok(Box::new(rows))
	}

	fn default_naming_context(&self) -> Result<String, ad_reader::Error> {
		self.naming_context_lookups.fetch_add(1, Ordering::SeqCst);
		Ok(ROOT.to_owned())
	}
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?;
	Ok(ldap)
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, cn: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("cn={},ou=users,dc=example,dc=org", cn)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	sn: &str,
	display_name: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("cn={},ou=users,dc=example,dc=org", cn),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("sn", [sn].into()),
			("displayName", [display_name].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}
