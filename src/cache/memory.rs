//! In-memory store backend.
//!
//! [`MemoryStore`] implements [`CacheStore`] over a `DashMap` with lazy
//! expiry: expired entries are dropped when touched, not swept in the
//! background. Per-key atomicity (for `incr_by`, `set_nx`,
//! `delete_if_equals`) comes from DashMap's shard-level entry locking.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::store::{CacheStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|d| Instant::now() + d)
}

/// Thread-safe in-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries. Test helper.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.value().expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the entry at `key`, dropping it first if expired.
    fn live_entry(&self, key: &str) -> Option<StoredEntry> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().expired() {
                    occupied.remove();
                    None
                } else {
                    Some(occupied.get().clone())
                }
            }
            Entry::Vacant(_) => None,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.live_entry(key) {
            Some(StoredEntry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.data.insert(
            key.to_string(),
            StoredEntry {
                value: Value::Text(value.to_string()),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match self.data.remove(key) {
            Some((_, entry)) => Ok(!entry.expired()),
            None => Ok(false),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(StoredEntry {
                        value: Value::Text(delta.to_string()),
                        expires_at: None,
                    });
                    return Ok(delta);
                }
                let Value::Text(text) = &occupied.get().value else {
                    return Err(StoreError::WrongType {
                        key: key.to_string(),
                    });
                };
                let current: i64 = text.parse().map_err(|_| StoreError::WrongType {
                    key: key.to_string(),
                })?;
                let next = current + delta;
                occupied.get_mut().value = Value::Text(next.to_string());
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: Value::Text(delta.to_string()),
                    expires_at: None,
                });
                Ok(delta)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.remove();
                    return Ok(false);
                }
                occupied.get_mut().expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    let mut fields = HashMap::new();
                    fields.insert(field.to_string(), value.to_string());
                    occupied.insert(StoredEntry {
                        value: Value::Hash(fields),
                        expires_at: deadline(ttl),
                    });
                    return Ok(());
                }
                let Value::Hash(fields) = &mut occupied.get_mut().value else {
                    return Err(StoreError::WrongType {
                        key: key.to_string(),
                    });
                };
                fields.insert(field.to_string(), value.to_string());
                if let Some(at) = deadline(ttl) {
                    occupied.get_mut().expires_at = Some(at);
                }
                Ok(())
            }
            Entry::Vacant(vacant) => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                vacant.insert(StoredEntry {
                    value: Value::Hash(fields),
                    expires_at: deadline(ttl),
                });
                Ok(())
            }
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self.live_entry(key) {
            Some(StoredEntry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    let mut members = HashSet::new();
                    members.insert(member.to_string());
                    occupied.insert(StoredEntry {
                        value: Value::Set(members),
                        expires_at: deadline(ttl),
                    });
                    return Ok(true);
                }
                let Value::Set(members) = &mut occupied.get_mut().value else {
                    return Err(StoreError::WrongType {
                        key: key.to_string(),
                    });
                };
                let added = members.insert(member.to_string());
                if let Some(at) = deadline(ttl) {
                    occupied.get_mut().expires_at = Some(at);
                }
                Ok(added)
            }
            Entry::Vacant(vacant) => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                vacant.insert(StoredEntry {
                    value: Value::Set(members),
                    expires_at: deadline(ttl),
                });
                Ok(true)
            }
        }
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        match self.live_entry(key) {
            Some(StoredEntry {
                value: Value::Set(members),
                ..
            }) => Ok(members.contains(member)),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(false),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(StoredEntry {
                        value: Value::Text(value.to_string()),
                        expires_at: deadline(Some(ttl)),
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: Value::Text(value.to_string()),
                    expires_at: deadline(Some(ttl)),
                });
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().expired() {
                    occupied.remove();
                    return Ok(false);
                }
                match &occupied.get().value {
                    Value::Text(text) if text == value => {
                        occupied.remove();
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            Entry::Vacant(_) => Ok(false),
        }
    }
}
