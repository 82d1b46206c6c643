#![allow(
	clippy::dbg_macro,
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::print_stderr,
	clippy::print_stdout,
	clippy::unwrap_used,
	clippy::bool_assert_comparison
)]
use std::{
	error::Error,
	sync::{atomic::Ordering, Arc},
};

use ad_reader::{
	config::{Config, ConnectionConfig, QueryOptions},
	filter::{self, SEARCH_FILTERS},
	Criteria, Directory, EntryKind, LdapProvider, SearchFilter, SearchOptions, Value,
};
use serial_test::serial;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use url::Url;

mod common;

use common::{
	example, ldap_add_organizational_unit, ldap_add_user, ldap_connect,
	ldap_delete_organizational_unit, ldap_delete_user, url, FakeProvider, ALICE, BOB, BROKEN,
	CAROL, EMPTY, REJECTED, ROOT, STAFF, TEAM_A, TEAM_B, TEAM_C, WS01,
};

fn init_tracing() {
	let tracing_filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	let _ = tracing_subscriber::fmt().with_env_filter(tracing_filter).try_init();
}

fn directory() -> Directory<FakeProvider> {
	init_tracing();
	Directory::new(example())
}

fn collect(results: ad_reader::SearchResults<'_>) -> Vec<String> {
	results.collect::<Result<_, _>>().unwrap()
}

#[test]
fn lazy_lookup_is_cached() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let first = directory.produce_entry(ALICE, true)?;
	let second = directory.produce_entry(&url(ALICE), true)?;
	assert!(Arc::ptr_eq(&first, &second), "The URL and the DN name the same entry");
	assert_eq!(directory.provider().resolve_count(ALICE), 1);
	assert_eq!(first.kind(), EntryKind::User);
	Ok(())
}

#[test]
fn eager_lookup_replaces_cached_entry() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let stale = directory.produce_entry(ALICE, true)?;
	let fresh = directory.produce_entry(ALICE, false)?;
	assert!(!Arc::ptr_eq(&stale, &fresh));
	assert_eq!(directory.provider().resolve_count(ALICE), 2);

	let cached = directory.produce_entry(ALICE, true)?;
	assert!(Arc::ptr_eq(&cached, &fresh), "Later lazy lookups see the fresh entry");
	Ok(())
}

#[test]
fn missing_entry() {
	let directory = directory();
	let result = directory.produce_entry("CN=ghost,DC=example,DC=com", true);
	assert!(matches!(result, Err(ad_reader::Error::NotFound(_))));
	assert!(matches!(
		directory.produce_entry("not a path", true),
		Err(ad_reader::Error::MalformedPath(_))
	));
}

#[test]
fn attributes_ignore_case() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let alice = directory.produce_entry(ALICE, true)?;
	assert_eq!(alice.get_str("samaccountname")?, Some("alice"));
	assert_eq!(alice.get("DESCRIPTION")?, None, "description is known, but empty");
	assert!(matches!(alice.get("mail"), Err(ad_reader::Error::AttributeNotFound(_))));
	Ok(())
}

#[test]
fn account_disabled() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let alice = directory.produce_entry(ALICE, true)?;
	let bob = directory.produce_entry(BOB, true)?;
	let carol = directory.produce_entry(CAROL, true)?;
	assert_eq!(alice.as_user().unwrap().account_disabled()?, false);
	assert_eq!(bob.as_user().unwrap().account_disabled()?, true);
	assert!(matches!(
		carol.as_user().unwrap().account_disabled(),
		Err(ad_reader::Error::AttributeNotFound(_))
	));

	let ws01 = directory.produce_entry(WS01, true)?;
	let flags = ws01.as_computer().unwrap().account_control()?;
	assert!(flags.contains("ADS_UF_WORKSTATION_TRUST_ACCOUNT"));
	Ok(())
}

#[test]
fn root_and_navigation() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let root = directory.root()?;
	assert_eq!(root.kind(), EntryKind::DomainDns);
	assert!(Arc::ptr_eq(&root, &directory.root()?));
	assert_eq!(directory.provider().naming_context_lookups.load(Ordering::SeqCst), 1);

	let staff = directory.child(&root, "OU=Staff")?;
	assert_eq!(staff.kind(), EntryKind::OrganizationalUnit);
	let alice = directory.child(&staff, "CN=alice")?;
	assert_eq!(alice.url(), url(ALICE));

	let parent = directory.parent(&alice)?.unwrap();
	assert!(Arc::ptr_eq(&parent, &staff));
	assert!(Arc::ptr_eq(&directory.parent(&staff)?.unwrap(), &root));
	Ok(())
}

#[test]
fn search_without_keyword() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let results = collect(directory.search(Criteria::new(), SearchOptions::default())?);
	assert_eq!(results.len(), 10, "Everything below the root");
	assert_eq!(directory.provider().last_query().as_deref(), Some(""));

	let base = STAFF.parse()?;
	let criteria = Criteria::new().with("sn", "O'Brien");
	directory.search(criteria, SearchOptions::default().search_base(base))?;
	assert_eq!(directory.provider().last_query().as_deref(), Some("WHERE sn = 'O''Brien'"));
	Ok(())
}

#[test]
fn search_selects_filter_by_keyword() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	directory.search(Criteria::new().with("group", "Team A"), SearchOptions::default())?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some("WHERE objectCategory = 'group' AND cn = 'Team A'")
	);

	// The first keyword in table order wins; the others stay constraints.
	let criteria = Criteria::new().with("ou", "Staff").with("computer", "ws01");
	directory.search(criteria, SearchOptions::default())?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some("WHERE ou = 'Staff' AND objectCategory = 'Computer' AND cn = 'ws01'")
	);
	assert_eq!(SEARCH_FILTERS[0].0, filter::COMPUTER);
	Ok(())
}

#[test]
fn explicit_filter_skips_keywords() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let options = SearchOptions::default()
		.search_filter(SearchFilter::new("mail").with_fixed("objectClass", "contact"));
	directory.search(Criteria::new().with("group", "x").primary_key("a@example.com"), options)?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some("WHERE group = 'x' AND objectClass = 'contact' AND mail = 'a@example.com'")
	);
	Ok(())
}

#[test]
fn search_active_accounts() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let active =
		collect(directory.search(Criteria::new(), SearchOptions::default().active(true))?);
	assert!(active.contains(&url(ALICE)));
	assert!(!active.contains(&url(BOB)));
	assert!(active.contains(&url(CAROL)), "Entries without flags are not filtered");
	assert!(active.contains(&url(WS01)));

	let inactive =
		collect(directory.search(Criteria::new(), SearchOptions::default().active(false))?);
	assert!(inactive.contains(&url(BOB)));
	assert!(!inactive.contains(&url(ALICE)));
	assert!(inactive.contains(&url(TEAM_A)));
	Ok(())
}

#[test]
fn search_is_lazy() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let mut results = directory.search(Criteria::new(), SearchOptions::default())?;
	assert_eq!(directory.provider().resolves.lock().unwrap().len(), 1, "Only the root");
	let first = results.next().unwrap()?;
	assert_eq!(first, url(BROKEN), "Rows come in URL order");
	Ok(())
}

#[test]
fn search_users_by_name() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	directory.search_users(Some("alice"), Criteria::new(), SearchOptions::default())?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some(
			"WHERE (sAMAccountName = 'alice' OR displayName = 'alice' OR cn = 'alice') AND \
			 objectCategory = 'Person' AND objectClass = 'User'"
		)
	);

	let criteria = Criteria::new().with("cn", "Alice Example");
	directory.search_users(Some("alice"), criteria, SearchOptions::default())?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some(
			"WHERE (sAMAccountName = 'alice' OR displayName = 'alice') AND cn = 'Alice Example' \
			 AND objectCategory = 'Person' AND objectClass = 'User'"
		)
	);

	directory.search_users(None, Criteria::new().primary_key("bob"), SearchOptions::default())?;
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some("WHERE objectCategory = 'Person' AND objectClass = 'User' AND sAMAccountName = 'bob'")
	);
	Ok(())
}

#[test]
fn first_entry() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let group = directory.find_group("Team A")?.unwrap();
	assert_eq!(group.url(), url(TEAM_A));
	let alice = directory.find(Criteria::new().with("cn", "alice"))?.unwrap();
	assert_eq!(alice.kind(), EntryKind::User);
	assert_eq!(directory.provider().last_query().as_deref(), Some("WHERE cn = 'alice'"));

	let options = SearchOptions::default().search_base(EMPTY.parse()?);
	assert!(directory.get_first_entry(Criteria::new(), options.clone())?.is_none());
	assert!(directory.get_first_user(Some("nobody"), Criteria::new(), options)?.is_none());
	Ok(())
}

#[test]
fn find_user_by_identity() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let alice = directory.find_user("alice")?.unwrap();
	assert_eq!(alice.url(), url(ALICE));
	assert!(Arc::ptr_eq(&alice, &directory.produce_entry(ALICE, true)?));
	assert_eq!(
		directory.provider().last_query().as_deref(),
		Some(
			"WHERE (sAMAccountName = 'alice' OR displayName = 'alice' OR cn = 'alice') AND \
			 objectCategory = 'Person' AND objectClass = 'User'"
		)
	);

	let bob = directory.get_first_user(Some("bob"), Criteria::new(), SearchOptions::default())?;
	assert_eq!(bob.unwrap().url(), url(BOB));
	assert!(directory.find_user("nobody")?.is_none());
	Ok(())
}

#[test]
fn rejected_query() {
	let directory = directory();
	let result = directory.search(Criteria::new().clause(REJECTED), SearchOptions::default());
	let Err(ad_reader::Error::Query { query, .. }) = result else {
		panic!("The query should have been rejected");
	};
	let expected =
		format!("SELECT ADsPath, userAccountControl\nFROM '{}'\nWHERE {REJECTED}", url(ROOT));
	assert_eq!(query, expected);

	let result = directory.search(
		Criteria::new().primary_key("x"),
		SearchOptions::default().search_filter(SearchFilter::empty()),
	);
	assert!(matches!(result, Err(ad_reader::Error::Invalid(_))));
}

#[test]
fn walk_nested_groups() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let team_c = directory.produce_entry(TEAM_C, true)?;
	let steps = directory.walk(team_c).collect::<Result<Vec<_>, _>>()?;
	let groups: Vec<String> = steps.iter().map(|step| step.group.url()).collect();
	assert_eq!(groups, [url(TEAM_C), url(TEAM_B), url(TEAM_A)], "Every group is visited once");

	assert!(steps[0].users.is_empty());
	assert_eq!(steps[1].users.len(), 1);
	assert_eq!(steps[1].users[0].url(), url(BOB));
	assert_eq!(steps[1].groups.len(), 1, "The computer is neither group nor user");
	assert_eq!(steps[2].groups[0].url(), url(TEAM_B), "Known groups are still listed");
	assert_eq!(steps[2].users[0].url(), url(ALICE));

	assert_eq!(directory.provider().resolve_count(TEAM_B), 1, "Members come from the cache");
	Ok(())
}

#[test]
fn walk_is_depth_first() -> Result<(), Box<dyn Error>> {
	init_tracing();
	let [a, b, c, d] = ["A", "B", "C", "D"].map(|name| format!("CN={name},OU=Empty,{ROOT}"));
	let mut provider = example();
	let members = |dns: &[&String]| {
		Some(Value::Multi(dns.iter().map(|dn| Value::from(dn.as_str())).collect()))
	};
	provider.add(&a, "group", vec![("member", members(&[&b, &c]))]);
	provider.add(&b, "group", vec![("member", members(&[&c, &d]))]);
	provider.add(&c, "group", vec![]);
	provider.add(&d, "group", vec![]);
	let directory = Directory::new(provider);

	let start = directory.produce_entry(&a, true)?;
	let groups = directory
		.walk(start)
		.map(|step| step.map(|step| step.group.url()))
		.collect::<Result<Vec<_>, _>>()?;
	assert_eq!(groups, [url(&a), url(&b), url(&c), url(&d)], "C is visited once, below B");
	Ok(())
}

#[test]
fn walk_from_group_view() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let team_a = directory.produce_entry(TEAM_A, true)?;
	let walk = team_a.as_group().unwrap().walk(&directory)?;
	assert_eq!(walk.count(), 2, "Team A and Team B contain each other");
	Ok(())
}

#[test]
fn walk_stops_after_error() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let broken = directory.produce_entry(BROKEN, true)?;
	let mut walk = directory.walk(broken);
	assert!(matches!(walk.next(), Some(Err(ad_reader::Error::NotFound(_)))));
	assert!(walk.next().is_none());
	Ok(())
}

#[test]
fn shared_between_threads() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let entries = std::thread::scope(|scope| {
		let handles: Vec<_> =
			(0..4).map(|_| scope.spawn(|| directory.produce_entry(ALICE, true))).collect();
		handles.into_iter().map(|handle| handle.join().unwrap()).collect::<Result<Vec<_>, _>>()
	})?;
	assert_eq!(entries.len(), 4);
	let cached = directory.produce_entry(ALICE, true)?;
	assert!(entries.iter().any(|entry| Arc::ptr_eq(entry, &cached)));
	Ok(())
}

#[test]
fn dump() -> Result<(), Box<dyn Error>> {
	let directory = directory();
	let bob = directory.produce_entry(BOB, true)?;
	let mut output = String::new();
	bob.print_dump(&mut output)?;
	assert_eq!(
		output,
		format!(
			"<User: {BOB}>\n{{\n  sAMAccountName \u{2192} \"bob\"\n  userAccountControl \u{2192} \
			 \"514\"\n}}\n"
		)
	);
	assert_eq!(bob.get("sAMAccountName")?, Some(&Value::from("bob")));
	Ok(())
}

#[ignore = "docker"]
#[test]
#[serial]
fn ldap_directory_test() -> Result<(), Box<dyn Error>> {
	init_tracing();
	let runtime = tokio::runtime::Runtime::new()?;
	runtime.block_on(async {
		let mut ldap = ldap_connect().await?;
		let _ = ldap_delete_user(&mut ldap, "user01").await;
		let _ = ldap_delete_user(&mut ldap, "user02").await;
		let _ = ldap_delete_organizational_unit(&mut ldap, "users").await;
		ldap_add_organizational_unit(&mut ldap, "users").await?;
		ldap_add_user(&mut ldap, "user01", "User1", "MyName1").await?;
		ldap_add_user(&mut ldap, "user02", "User2", "MyName2").await?;
		ldap.unbind().await?;
		Ok::<_, Box<dyn Error>>(())
	})?;

	let config = Config {
		url: Url::parse("ldap://localhost:1389")?,
		connection: ConnectionConfig::default(),
		search_user: Some("cn=admin,dc=example,dc=org".to_owned()),
		search_password: Some("adminpassword".to_owned()),
		naming_context: Some("dc=example,dc=org".to_owned()),
		query: QueryOptions { page_size: Some(1), ..QueryOptions::default() },
	};
	let directory = Directory::with_options(LdapProvider::new(config.clone())?, config.query);

	let root = directory.root()?;
	assert_eq!(root.url(), "LDAP://dc=example,dc=org");

	let options = SearchOptions::default()
		.search_base("ou=users,dc=example,dc=org".parse()?)
		.search_filter(SearchFilter::new("cn").with_fixed("objectClass", "inetOrgPerson"));
	let criteria = Criteria::new().primary_key("user01");
	let results = collect(directory.search(criteria, options.clone())?);
	assert_eq!(results, ["LDAP://cn=user01,ou=users,dc=example,dc=org"]);

	let user = directory.produce_entry(&results[0], true)?;
	assert_eq!(user.get_str("DISPLAYNAME")?, Some("MyName1"));
	assert_eq!(directory.parent(&user)?.unwrap().path().rdn(), "users");

	let paged = collect(directory.search(Criteria::new().clause("sn = 'User*'"), options.clone())?);
	assert_eq!(paged.len(), 2, "Pages of one entry are combined");

	let rejected = directory.search(Criteria::new().clause("sn ="), options);
	assert!(matches!(rejected, Err(ad_reader::Error::Query { .. })));
	assert!(matches!(
		directory.produce_entry("cn=nobody,ou=users,dc=example,dc=org", true),
		Err(ad_reader::Error::NotFound(_))
	));

	directory.provider().disconnect()?;
	runtime.block_on(async {
		let mut ldap = ldap_connect().await?;
		ldap_delete_user(&mut ldap, "user01").await?;
		ldap_delete_user(&mut ldap, "user02").await?;
		ldap_delete_organizational_unit(&mut ldap, "users").await?;
		ldap.unbind().await?;
		Ok::<_, Box<dyn Error>>(())
	})?;
	Ok(())
}
