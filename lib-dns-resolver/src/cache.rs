use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_types::protocol::types::*;

/// A convenience wrapper around a `Cache` which lets it be shared
/// between threads.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

impl SharedCache {
    /// Make a new, empty, shared cache.
    pub fn new() -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::new())),
        }
    }

    /// Create a new cache with the given desired size.
    pub fn with_desired_size(desired_size: usize) -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::with_desired_size(desired_size))),
        }
    }

    /// Get records for a domain, restricted by query type.  Expired
    /// records are never returned, even if a sweep has not run since
    /// they lapsed: lookups filter by expiry time.
    ///
    /// The TTL in each returned record is the time it has left, not
    /// the TTL it was inserted with.
    pub fn get(&self, name: &DomainName, qtype: QueryType) -> Vec<ResourceRecord> {
        let mut rrs = self
            .cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get(name, qtype);
        rrs.retain(|rr| rr.ttl > 0);
        rrs
    }

    /// Insert a record.  A record with the same (name, type, rdata)
    /// has its TTL refreshed rather than being stored twice.  Records
    /// with a zero TTL are not cacheable and are skipped.
    pub fn insert(&self, record: &ResourceRecord) {
        if record.ttl > 0 {
            self.cache
                .lock()
                .expect(MUTEX_POISON_MESSAGE)
                .insert(record);
        }
    }

    /// Remove all records for a domain.
    pub fn remove(&self, name: &DomainName) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).remove(name);
    }

    /// Atomically delete all expired records and, if the cache has
    /// grown beyond its desired size, evict whole domains in
    /// least-recently-read order to get back down to size.
    ///
    /// Returns `(has overflowed?, current size, num expired, num evicted)`.
    pub fn prune(&self) -> (bool, usize, usize, usize) {
        self.cache.lock().expect(MUTEX_POISON_MESSAGE).prune()
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching for `ResourceRecord`s, keyed by domain name.
///
/// Each domain holds a flat list of records, unique by (type, rdata);
/// every record carries its own expiry instant, and the sweep is a
/// scan over the whole table, in the spirit of a `DELETE ... WHERE
/// expired_at <= now` against a record store.
///
/// You probably want to use `SharedCache` instead.
#[derive(Debug, Clone)]
pub struct Cache {
    /// Cached records, indexed by domain name.
    ///
    /// INVARIANT: no entry has an empty record list.
    entries: HashMap<DomainName, DomainEntry>,

    /// Domains ordered by when they were last read, oldest first.
    /// When the cache is over its desired size, whole domains are
    /// evicted in this order.
    ///
    /// INVARIANT: the domains in here are exactly the domains in
    /// `entries`.
    access_order: PriorityQueue<DomainName, Reverse<Instant>>,

    /// The number of records in the cache.
    ///
    /// INVARIANT: this is the total length of the record lists in
    /// `entries`.
    current_size: usize,

    /// The desired maximum number of records in the cache.
    desired_size: usize,
}

/// The cached records for a single domain.
#[derive(Debug, Clone)]
struct DomainEntry {
    /// The time this domain was last read at.
    last_read: Instant,

    /// The records, unique by (type, rdata).
    records: Vec<CachedRecord>,
}

/// One cached record and when it stops being valid.
#[derive(Debug, Clone)]
struct CachedRecord {
    rtype_with_data: RecordTypeWithData,
    expires_at: Instant,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create a new cache with a default desired size.
    pub fn new() -> Self {
        Self::with_desired_size(512)
    }

    /// Create a new cache with the given desired size.
    ///
    /// # Panics
    ///
    /// If called with a `desired_size` of 0.
    pub fn with_desired_size(desired_size: usize) -> Self {
        assert!(desired_size > 0, "cannot create a zero-size cache");

        Self {
            // most domains will have more than one record, so
            // `desired_size` would be too big for `entries`
            entries: HashMap::with_capacity(desired_size / 2),
            access_order: PriorityQueue::with_capacity(desired_size),
            current_size: 0,
            desired_size,
        }
    }

    /// Get records for a domain, restricted by query type.
    ///
    /// An expired record comes back with a TTL of 0: `SharedCache`
    /// filters those out before the caller sees them.
    pub fn get(&mut self, name: &DomainName, qtype: QueryType) -> Vec<ResourceRecord> {
        let now = Instant::now();

        let Some(entry) = self.entries.get_mut(name) else {
            return Vec::new();
        };

        let mut rrs = Vec::new();
        for record in &entry.records {
            if record.rtype_with_data.matches(qtype) {
                rrs.push(ResourceRecord {
                    name: name.clone(),
                    rtype_with_data: record.rtype_with_data.clone(),
                    rclass: RecordClass::IN,
                    ttl: remaining_ttl(record.expires_at, now),
                });
            }
        }

        if !rrs.is_empty() {
            entry.last_read = now;
            self.access_order.push(name.clone(), Reverse(now));
        }

        rrs
    }

    /// Insert a record.
    ///
    /// If a record with the same (name, type, rdata) is already
    /// present, its expiry is moved forward instead: the TTL is
    /// refreshed and nothing is duplicated.
    pub fn insert(&mut self, record: &ResourceRecord) {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(record.ttl.into());

        let entry = self
            .entries
            .entry(record.name.clone())
            .or_insert_with(|| DomainEntry {
                last_read: now,
                records: Vec::with_capacity(1),
            });

        match entry
            .records
            .iter_mut()
            .find(|existing| existing.rtype_with_data == record.rtype_with_data)
        {
            Some(existing) => existing.expires_at = expires_at,
            None => {
                entry.records.push(CachedRecord {
                    rtype_with_data: record.rtype_with_data.clone(),
                    expires_at,
                });
                self.current_size += 1;
            }
        }

        entry.last_read = now;
        self.access_order.push(record.name.clone(), Reverse(now));
    }

    /// Remove all records for a domain.
    ///
    /// Returns the number of records removed.
    pub fn remove(&mut self, name: &DomainName) -> usize {
        match self.entries.remove(name) {
            Some(entry) => {
                self.access_order.remove(name);
                self.current_size -= entry.records.len();
                entry.records.len()
            }
            None => 0,
        }
    }

    /// Delete all expired records, dropping domains that end up with
    /// no records at all.
    ///
    /// Returns the number of records deleted.
    pub fn remove_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        let entries = &mut self.entries;
        let access_order = &mut self.access_order;

        entries.retain(|name, entry| {
            let before = entry.records.len();
            entry.records.retain(|record| record.expires_at > now);
            removed += before - entry.records.len();

            if entry.records.is_empty() {
                access_order.remove(name);
                false
            } else {
                true
            }
        });

        self.current_size -= removed;
        removed
    }

    /// Delete all expired records, and then evict whole domains,
    /// least recently read first, until the cache is back down to its
    /// desired size.
    ///
    /// Returns `(has overflowed?, current size, num expired, num evicted)`.
    pub fn prune(&mut self) -> (bool, usize, usize, usize) {
        let has_overflowed = self.current_size > self.desired_size;
        let num_expired = self.remove_expired();
        let mut num_evicted = 0;

        while self.current_size > self.desired_size {
            let Some((name, _)) = self.access_order.pop() else {
                break;
            };

            if let Some(entry) = self.entries.remove(&name) {
                self.current_size -= entry.records.len();
                num_evicted += entry.records.len();
            }
        }

        (has_overflowed, self.current_size, num_expired, num_evicted)
    }
}

/// How long a record has left, in whole seconds.
fn remaining_ttl(expires_at: Instant, now: Instant) -> u32 {
    match expires_at.saturating_duration_since(now).as_secs().try_into() {
        Ok(ttl) => ttl,
        Err(_) => u32::MAX,
    }
}
