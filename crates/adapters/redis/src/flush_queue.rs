//! Redis 写回队列
//!
//! 待刷新集合与处理中集合都是有序集合。认领与回收通过 Lua 脚本
//! 在服务端原子执行，调度器与消费者之间不需要客户端锁。

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use save_common::GameSaveId;
use save_errors::AppResult;
use save_ports::{FlushQueuePort, ScheduledEntry};
use tracing::warn;

use crate::keys::KeySpace;
use crate::redis_error;

/// KEYS[1] 待刷新集合，KEYS[2] 处理中集合
/// ARGV[1] id，ARGV[2] now，ARGV[3] "force" 时忽略 readyAt
const CLAIM_SCRIPT: &str = r"
local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not score then
    return 0
end
if redis.call('ZSCORE', KEYS[2], ARGV[1]) then
    return 0
end
if ARGV[3] ~= 'force' and tonumber(score) > tonumber(ARGV[2]) then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
";

/// KEYS[1] 待刷新集合，KEYS[2] 处理中集合
/// ARGV[1] claimedAt 上限，ARGV[2] now
const REQUEUE_SCRIPT: &str = r"
local stale = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, id in ipairs(stale) do
    redis.call('ZREM', KEYS[2], id)
    if not redis.call('ZSCORE', KEYS[1], id) then
        redis.call('ZADD', KEYS[1], ARGV[2], id)
    end
end
return stale
";

pub struct RedisFlushQueue {
    conn: ConnectionManager,
    pending_key: String,
    processing_key: String,
    claim_script: Script,
    requeue_script: Script,
}

impl RedisFlushQueue {
    pub fn new(conn: ConnectionManager, keys: &KeySpace) -> Self {
        Self {
            conn,
            pending_key: keys.pending_key(),
            processing_key: keys.processing_key(),
            claim_script: Script::new(CLAIM_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
        }
    }

    async fn run_claim(&self, id: &GameSaveId, now: i64, mode: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let claimed: i64 = self
            .claim_script
            .key(&self.pending_key)
            .key(&self.processing_key)
            .arg(id.to_string())
            .arg(now)
            .arg(mode)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("claim script", e))?;
        Ok(claimed == 1)
    }

    async fn entries(&self, key: &str) -> AppResult<Vec<ScheduledEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, f64)> = conn
            .zrange_withscores(key, 0, -1)
            .await
            .map_err(|e| redis_error("ZRANGE", e))?;

        Ok(raw
            .into_iter()
            .filter_map(|(member, score)| {
                parse_member(&member).map(|id| ScheduledEntry {
                    id,
                    score: score as i64,
                })
            })
            .collect())
    }
}

fn parse_member(member: &str) -> Option<GameSaveId> {
    match member.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(member = %member, error = %e, "Ignoring malformed flush queue member");
            None
        }
    }
}

#[async_trait]
impl FlushQueuePort for RedisFlushQueue {
    async fn schedule(&self, id: &GameSaveId, ready_at: i64) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(&self.pending_key, id.to_string(), ready_at)
            .await
            .map_err(|e| redis_error("ZADD", e))
    }

    async fn due(&self, now: i64) -> AppResult<Vec<GameSaveId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore(&self.pending_key, "-inf", now)
            .await
            .map_err(|e| redis_error("ZRANGEBYSCORE", e))?;

        Ok(members.iter().filter_map(|m| parse_member(m)).collect())
    }

    async fn claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
        self.run_claim(id, now, "due").await
    }

    async fn force_claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
        self.run_claim(id, now, "force").await
    }

    async fn release(&self, id: &GameSaveId) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(&self.processing_key, id.to_string())
            .await
            .map_err(|e| redis_error("ZREM", e))
    }

    async fn pending(&self) -> AppResult<Vec<ScheduledEntry>> {
        self.entries(&self.pending_key).await
    }

    async fn processing(&self) -> AppResult<Vec<ScheduledEntry>> {
        self.entries(&self.processing_key).await
    }

    async fn requeue_stale(&self, claimed_before: i64, now: i64) -> AppResult<Vec<GameSaveId>> {
        let mut conn = self.conn.clone();
        let moved: Vec<String> = self
            .requeue_script
            .key(&self.pending_key)
            .key(&self.processing_key)
            .arg(claimed_before)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("requeue script", e))?;

        Ok(moved.iter().filter_map(|m| parse_member(m)).collect())
    }
}
