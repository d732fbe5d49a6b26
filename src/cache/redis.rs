//! Redis store backend.
//!
//! [`RedisStore`] implements [`CacheStore`] over a multiplexed async
//! connection. The connection is cloned per operation; all clones share one
//! TCP connection. The compare-and-delete release primitive uses a Lua
//! script so the comparison and the `DEL` happen in a single round-trip.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;

use super::store::{CacheStore, StoreError};

/// Delete `KEYS[1]` only if it currently holds `ARGV[1]`.
///
/// Returns 1 on deletion, 0 otherwise. Keeps lock release atomic: a holder
/// whose lock already expired and was re-acquired by someone else cannot
/// delete the new holder's entry.
const LUA_DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}

/// Redis-backed [`CacheStore`].
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    delete_if_equals: Script,
}

impl RedisStore {
    /// Connect to a Redis server, e.g. `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(StoreError::from)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::from)?;
        Ok(Self::new(conn))
    }

    /// Wrap an existing multiplexed connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            delete_if_equals: Script::new(LUA_DELETE_IF_EQUALS),
        }
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

/// Redis EXPIRE/SET EX take whole seconds; round sub-second TTLs up so a
/// short TTL never becomes "no TTL".
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn();
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl_seconds(ttl)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let set: bool = conn.expire(key, ttl_seconds(ttl) as i64).await?;
        Ok(set)
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.hset(key, field, value).await?;
        if let Some(ttl) = ttl {
            let _: bool = conn.expire(key, ttl_seconds(ttl) as i64).await?;
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let added: i64 = conn.sadd(key, member).await?;
        if let Some(ttl) = ttl {
            let _: bool = conn.expire(key, ttl_seconds(ttl) as i64).await?;
        }
        Ok(added > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let member_present: bool = conn.sismember(key, member).await?;
        Ok(member_present)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        // SET key value NX EX <ttl>: nil reply means the key already existed.
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: i64 = self
            .delete_if_equals
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}
