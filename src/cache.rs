//! Process-wide store of the entries fetched so far.
use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::entry::Entry;

/// Entries by URL, plus the URL of the directory root once it is known.
///
/// Every operation takes the lock for a single read or write, so the cache
/// can be shared between threads. A fresh entry for a URL replaces the one
/// stored before.
#[derive(Debug, Default)]
pub struct EntryCache {
	/// Cached data, guarded as a whole
	inner: Mutex<CacheData>,
}

/// The data behind the lock
#[derive(Debug, Default)]
struct CacheData {
	/// Entries keyed by [`LdapPath::url`](crate::LdapPath::url)
	entries: HashMap<String, Arc<Entry>>,
	/// URL of the root entry of the connected directory
	root_url: Option<String>,
}

impl EntryCache {
	/// An empty cache.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Lock the data. A panic while holding the lock cannot leave the map in
	/// an inconsistent state, so a poisoned lock is still usable.
	fn lock(&self) -> MutexGuard<'_, CacheData> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// The entry cached for a URL.
	#[must_use]
	pub fn get(&self, url: &str) -> Option<Arc<Entry>> {
		self.lock().entries.get(url).cloned()
	}

	/// Store an entry, replacing the one previously cached for the URL, and
	/// hand it back.
	pub fn insert(&self, url: String, entry: Arc<Entry>) -> Arc<Entry> {
		self.lock().entries.insert(url, Arc::clone(&entry));
		entry
	}

	/// Whether an entry is cached for a URL.
	#[must_use]
	pub fn contains(&self, url: &str) -> bool {
		self.lock().entries.contains_key(url)
	}

	/// Number of cached entries.
	#[must_use]
	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	/// Whether nothing is cached.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.lock().entries.is_empty()
	}

	/// The URL of the directory root, if it was looked up already.
	#[must_use]
	pub fn root_url(&self) -> Option<String> {
		self.lock().root_url.clone()
	}

	/// Remember the URL of the directory root.
	pub fn set_root_url(&self, url: String) {
		self.lock().root_url = Some(url);
	}

	/// Forget all entries and the root URL.
	pub fn clear(&self) {
		let mut data = self.lock();
		data.entries.clear();
		data.root_url = None;
	}
}
