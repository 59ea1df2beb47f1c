//! Redis 实体缓存
//!
//! 每个条目是一个 JSON 字符串键，TTL 由 `SET EX` 维护。

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use save_common::GameSaveId;
use save_errors::{AppError, AppResult};
use save_ports::{CacheKind, CachePort, CacheValue};
use tracing::{debug, warn};

use crate::keys::{KeySpace, id_from_key};
use crate::redis_error;

const SCAN_COUNT: usize = 200;

/// 单一实体类型的 Redis 缓存
pub struct RedisCache<V> {
    conn: ConnectionManager,
    keys: KeySpace,
    kind: CacheKind,
    default_ttl: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> RedisCache<V> {
    pub fn new(conn: ConnectionManager, keys: KeySpace, kind: CacheKind, default_ttl: Duration) -> Self {
        Self {
            conn,
            keys,
            kind,
            default_ttl,
            _value: PhantomData,
        }
    }

    fn encode(&self, value: &V) -> AppResult<String> {
        serde_json::to_string(value).map_err(|e| {
            AppError::serialization(format!("Failed to encode {} entry: {}", self.kind, e))
        })
    }

    fn decode(&self, raw: &str) -> AppResult<V> {
        serde_json::from_str(raw).map_err(|e| {
            AppError::serialization(format!("Failed to decode {} entry: {}", self.kind, e))
        })
    }

    /// 按模式遍历所有缓存键
    async fn scan_keys(&self) -> AppResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = self.keys.cache_pattern(self.kind);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("SCAN", e))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }
}

#[async_trait]
impl<V: CacheValue> CachePort<V> for RedisCache<V> {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    async fn get(&self, id: &GameSaveId) -> AppResult<Option<V>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.keys.cache_key(self.kind, id))
            .await
            .map_err(|e| redis_error("GET", e))?;

        raw.map(|raw| self.decode(&raw)).transpose()
    }

    async fn set(&self, id: &GameSaveId, value: &V) -> AppResult<()> {
        self.set_with_ttl(id, value, self.default_ttl).await
    }

    async fn set_with_ttl(&self, id: &GameSaveId, value: &V, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.keys.cache_key(self.kind, id);
        let payload = self.encode(value)?;

        if ttl.is_zero() {
            conn.set::<_, _, ()>(&key, payload)
                .await
                .map_err(|e| redis_error("SET", e))
        } else {
            // SET EX 只接受整秒
            let secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(&key, payload, secs)
                .await
                .map_err(|e| redis_error("SET EX", e))
        }
    }

    async fn unset(&self, id: &GameSaveId) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.keys.cache_key(self.kind, id))
            .await
            .map_err(|e| redis_error("DEL", e))
    }

    async fn get_all(&self) -> AppResult<HashMap<GameSaveId, V>> {
        let keys = self.scan_keys().await?;
        let mut entries = HashMap::with_capacity(keys.len());
        if keys.is_empty() {
            return Ok(entries);
        }

        let mut conn = self.conn.clone();
        for chunk in keys.chunks(SCAN_COUNT) {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("MGET", e))?;

            for (key, raw) in chunk.iter().zip(values) {
                // 键在 SCAN 与 MGET 之间过期
                let Some(raw) = raw else { continue };
                let Some(id) = id_from_key(key) else {
                    warn!(key = %key, "Skipping cache key with malformed id");
                    continue;
                };
                entries.insert(id, self.decode(&raw)?);
            }
        }

        Ok(entries)
    }

    async fn clear(&self) -> AppResult<()> {
        let keys = self.scan_keys().await?;
        let mut conn = self.conn.clone();

        for chunk in keys.chunks(SCAN_COUNT) {
            conn.del::<_, ()>(chunk)
                .await
                .map_err(|e| redis_error("DEL", e))?;
        }

        debug!(kind = %self.kind, removed = keys.len(), "Cache cleared");
        Ok(())
    }
}
