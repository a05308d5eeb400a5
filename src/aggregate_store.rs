//! Shared key-value aggregate state: statuses, open-entity sets, counters,
//! and per-entity error logs. The event tracker is the only writer; other
//! components (the gateway's query handler) only read.

use crate::error::AggregateStoreError;
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), AggregateStoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, AggregateStoreError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), AggregateStoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), AggregateStoreError>;
    async fn scard(&self, key: &str) -> Result<u64, AggregateStoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, AggregateStoreError>;
    async fn incr(&self, key: &str) -> Result<i64, AggregateStoreError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AggregateStoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AggregateStoreError>;
    async fn rpush(&self, key: &str, value: &str) -> Result<(), AggregateStoreError>;
    async fn lrange(&self, key: &str) -> Result<Vec<String>, AggregateStoreError>;
}

/// Production aggregate store backed by Redis via a pooled connection
/// manager, mirroring the cloud-storage manager's `Arc`-wrapped-trait
/// pattern elsewhere in this crate.
pub struct RedisAggregateStore {
    pool: Pool,
}

impl RedisAggregateStore {
    pub fn new(redis_url: &str) -> Result<Self, AggregateStoreError> {
        let cfg = PoolConfig::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| AggregateStoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, AggregateStoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| AggregateStoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl AggregateStore for RedisAggregateStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<u64, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn incr(&self, key: &str) -> Result<i64, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, AggregateStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        let values: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(values)
    }
}

#[derive(Default)]
struct MemoryState {
    strings: BTreeMap<String, String>,
    sets: BTreeMap<String, BTreeSet<String>>,
    hashes: BTreeMap<String, BTreeMap<String, String>>,
    lists: BTreeMap<String, Vec<String>>,
}

/// In-memory aggregate store used by unit and integration tests.
#[derive(Default)]
pub struct InMemoryAggregateStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), AggregateStoreError> {
        self.state
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AggregateStoreError> {
        Ok(self.state.lock().unwrap().strings.get(key).cloned())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), AggregateStoreError> {
        self.state
            .lock()
            .unwrap()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), AggregateStoreError> {
        if let Some(set) = self.state.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<u64, AggregateStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, AggregateStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn incr(&self, key: &str) -> Result<i64, AggregateStoreError> {
        let mut state = self.state.lock().unwrap();
        let entry = state.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0) + 1;
        *entry = next.to_string();
        Ok(next)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), AggregateStoreError> {
        self.state
            .lock()
            .unwrap()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, AggregateStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), AggregateStoreError> {
        self.state
            .lock()
            .unwrap()
            .lists
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, AggregateStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_membership_and_counters_behave() {
        let store = InMemoryAggregateStore::new();
        store.sadd("book:b:chapters", "c1").await.unwrap();
        store.sadd("book:b:chapters", "c2").await.unwrap();
        assert_eq!(store.scard("book:b:chapters").await.unwrap(), 2);
        store.srem("book:b:chapters", "c1").await.unwrap();
        assert_eq!(store.scard("book:b:chapters").await.unwrap(), 1);

        assert_eq!(store.incr("book:b:completed_chapters").await.unwrap(), 1);
        assert_eq!(store.incr("book:b:completed_chapters").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn hash_and_list_ops_round_trip() {
        let store = InMemoryAggregateStore::new();
        store.hset("chapter:c", "title", "Chapter One").await.unwrap();
        assert_eq!(
            store.hget("chapter:c", "title").await.unwrap(),
            Some("Chapter One".to_string())
        );

        store.rpush("errors:chapter:c", "boom").await.unwrap();
        store.rpush("errors:chapter:c", "boom again").await.unwrap();
        assert_eq!(
            store.lrange("errors:chapter:c").await.unwrap(),
            vec!["boom".to_string(), "boom again".to_string()]
        );
    }
}
