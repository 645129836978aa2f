//! In-process store implementation.
//!
//! Provides a concurrent, sharded map implementing the full [`Store`] port.
//! Useful for tests, single-process deployments and as the reference
//! behaviour the Redis adapter is checked against.

use crate::application::ports::{Clock, SetCondition, SetOptions, Store};
use crate::domain::bucket::{self, BucketState};
use crate::domain::error::StoreError;
use crate::domain::key::DerivedKey;
use crate::domain::policy::{Decision, RateLimitPolicy};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Bytes(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<Vec<u8>>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "cardinality counter",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// Unix ms after which the entry reads as absent
    expires_at: Option<i64>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    /// Placeholder left in the map while an entry is being rewritten.
    fn placeholder() -> Self {
        Self::new(Value::Bytes(Vec::new()))
    }
}

fn wrong_type(operation: &'static str, found: &Value) -> StoreError {
    StoreError::unexpected(
        operation,
        format!("WRONGTYPE key holds a {}", found.type_name()),
    )
}

fn deadline(now: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_add(ttl_ms)
}

fn parse_integer(operation: &'static str, bytes: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::unexpected(operation, "value is not an integer"))
}

/// Thread-safe sharded store backed by DashMap.
///
/// Each operation holds the shard lock for its key for the whole
/// read-modify-write, which makes every single-key operation atomic,
/// including token bucket acquisitions. Expired entries read as absent and
/// are dropped when next written or by [`MemoryStore::purge_expired`].
#[derive(Debug)]
pub struct MemoryStore {
    map: DashMap<DerivedKey, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store using `clock` for expiry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
        }
    }

    /// Write raw bytes under `key`, bypassing every check.
    ///
    /// Lets tests plant records a real store could end up holding.
    pub fn insert_raw(&self, key: DerivedKey, bytes: Vec<u8>) {
        self.map.insert(key, Entry::new(Value::Bytes(bytes)));
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.map.len())
    }

    /// Run `f` on the live entry for `key` (or `None`) under the shard lock.
    ///
    /// Whatever `f` leaves in the slot is written back; leaving `None`
    /// removes the key.
    fn with_slot<R>(&self, key: &DerivedKey, f: impl FnOnce(&mut Option<Entry>) -> R) -> R {
        let now = self.clock.now_ms();
        match self.map.entry(*key) {
            MapEntry::Occupied(mut occupied) => {
                let mut slot = if occupied.get().is_live(now) {
                    Some(std::mem::replace(occupied.get_mut(), Entry::placeholder()))
                } else {
                    None
                };
                let result = f(&mut slot);
                match slot {
                    Some(entry) => *occupied.get_mut() = entry,
                    None => {
                        occupied.remove();
                    }
                }
                result
            }
            MapEntry::Vacant(vacant) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(entry) = slot {
                    vacant.insert(entry);
                }
                result
            }
        }
    }

    /// Clone the live value under `key`, if any.
    fn read(&self, key: &DerivedKey) -> Option<Value> {
        let now = self.clock.now_ms();
        self.map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &DerivedKey) -> Result<Option<Vec<u8>>, StoreError> {
        match self.read(key) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(wrong_type("GET", &other)),
        }
    }

    async fn set(
        &self,
        key: &DerivedKey,
        value: &[u8],
        options: SetOptions,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let applied = self.with_slot(key, |slot| {
            let write = match options.condition {
                SetCondition::Always => true,
                SetCondition::IfAbsent => slot.is_none(),
                SetCondition::IfPresent => slot.is_some(),
            };
            if write {
                *slot = Some(Entry {
                    value: Value::Bytes(value.to_vec()),
                    expires_at: options.ttl.map(|ttl| deadline(now, ttl)),
                });
            }
            write
        });
        Ok(applied)
    }

    async fn delete(&self, key: &DerivedKey) -> Result<bool, StoreError> {
        Ok(self.with_slot(key, |slot| slot.take().is_some()))
    }

    async fn eval_token_bucket(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        self.with_slot(key, |slot| -> Result<Decision, StoreError> {
            let current = match slot.as_ref().map(|entry| &entry.value) {
                None => None,
                Some(Value::Bytes(bytes)) => Some(
                    BucketState::decode(bytes)
                        .map_err(|e| StoreError::corrupted(key.to_hex(), e.to_string()))?,
                ),
                Some(other) => {
                    return Err(StoreError::corrupted(
                        key.to_hex(),
                        format!("key holds a {}", other.type_name()),
                    ))
                }
            };

            let update = bucket::apply(current, policy);
            if let Some(state) = update.persist {
                // Keep any expiry the caller attached to the key
                let expires_at = slot.as_ref().and_then(|entry| entry.expires_at);
                *slot = Some(Entry {
                    value: Value::Bytes(state.encode().to_vec()),
                    expires_at,
                });
            }
            Ok(update.decision)
        })
    }

    async fn list_push(&self, key: &DerivedKey, values: &[Vec<u8>]) -> Result<u64, StoreError> {
        if values.is_empty() {
            return Err(StoreError::invalid_argument("list_push needs at least one value"));
        }
        self.with_slot(key, |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
            match &mut entry.value {
                Value::List(list) => {
                    list.extend(values.iter().cloned());
                    Ok(list.len() as u64)
                }
                other => Err(wrong_type("RPUSH", other)),
            }
        })
    }

    async fn list_range(
        &self,
        key: &DerivedKey,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let list = match self.read(key) {
            None => return Ok(Vec::new()),
            Some(Value::List(list)) => list,
            Some(other) => return Err(wrong_type("LRANGE", &other)),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(list
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .collect())
    }

    async fn cardinality_add(
        &self,
        key: &DerivedKey,
        items: &[Vec<u8>],
    ) -> Result<bool, StoreError> {
        self.with_slot(key, |slot| {
            let created = slot.is_none();
            let entry = slot.get_or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
            match &mut entry.value {
                Value::Set(set) => {
                    let mut changed = created;
                    for item in items {
                        changed |= set.insert(item.clone());
                    }
                    Ok(changed)
                }
                other => Err(wrong_type("PFADD", other)),
            }
        })
    }

    async fn cardinality_count(&self, key: &DerivedKey) -> Result<u64, StoreError> {
        match self.read(key) {
            None => Ok(0),
            Some(Value::Set(set)) => Ok(set.len() as u64),
            Some(other) => Err(wrong_type("PFCOUNT", &other)),
        }
    }

    async fn incr_by(&self, key: &DerivedKey, by: i64) -> Result<i64, StoreError> {
        self.with_slot(key, |slot| -> Result<i64, StoreError> {
            let current = match slot.as_ref().map(|entry| &entry.value) {
                None => 0,
                Some(Value::Bytes(bytes)) => parse_integer("INCRBY", bytes)?,
                Some(other) => return Err(wrong_type("INCRBY", other)),
            };
            let next = current
                .checked_add(by)
                .ok_or_else(|| StoreError::unexpected("INCRBY", "increment would overflow"))?;

            let expires_at = slot.as_ref().and_then(|entry| entry.expires_at);
            *slot = Some(Entry {
                value: Value::Bytes(next.to_string().into_bytes()),
                expires_at,
            });
            Ok(next)
        })
    }

    async fn expire(&self, key: &DerivedKey, ttl: Duration) -> Result<bool, StoreError> {
        let at = deadline(self.clock.now_ms(), ttl);
        Ok(self.with_slot(key, |slot| match slot {
            Some(entry) => {
                entry.expires_at = Some(at);
                true
            }
            None => false,
        }))
    }

    async fn get_many(&self, keys: &[DerivedKey]) -> Result<Vec<Option<i64>>, StoreError> {
        keys.iter()
            .map(|key| match self.read(key) {
                Some(Value::Bytes(bytes)) => parse_integer("MGET", &bytes).map(Some),
                // MGET reports non-string keys as missing
                Some(_) | None => Ok(None),
            })
            .collect()
    }
}
