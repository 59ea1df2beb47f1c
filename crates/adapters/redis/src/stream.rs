//! Redis Stream 事件来源
//!
//! 游戏请求路径把更新事件写入 Stream，本服务以消费组方式读取。

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Value};
use save_domain::GameSaveEvent;
use save_errors::AppResult;
use save_ports::{EventSourcePort, StreamDelivery};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::redis_error;

/// 消费组读取器
///
/// 阻塞读取会占住多路复用连接，因此应使用独立的连接管理器。
pub struct RedisEventSource {
    conn: Mutex<ConnectionManager>,
    stream: String,
    group: String,
    consumer: String,
}

impl RedisEventSource {
    pub fn new(
        conn: ConnectionManager,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    async fn pending_ids(&self, min_idle_ms: u64, count: usize) -> AppResult<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let result: Value = redis::cmd("XPENDING")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_error("XPENDING", e))?;

        Ok(parse_xpending_response(result))
    }
}

#[async_trait]
impl EventSourcePort for RedisEventSource {
    async fn ensure_group(&self) -> AppResult<()> {
        let mut conn = self.conn.lock().await;
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            // 组已存在
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %self.stream, group = %self.group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(redis_error("XGROUP CREATE", e)),
        }
    }

    async fn read(&self, count: usize, block_ms: usize) -> AppResult<Vec<StreamDelivery>> {
        let mut conn = self.conn.lock().await;
        let result: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_error("XREADGROUP", e))?;

        Ok(parse_xread_response(result))
    }

    async fn ack(&self, entry_ids: &[String]) -> AppResult<()> {
        if entry_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        let acked: usize = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(entry_ids)
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_error("XACK", e))?;

        debug!(stream = %self.stream, acked, "Messages acknowledged");
        Ok(())
    }

    async fn reclaim(&self, min_idle_ms: u64, count: usize) -> AppResult<Vec<StreamDelivery>> {
        let ids = self.pending_ids(min_idle_ms, count).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock().await;
        let result: Value = redis::cmd("XCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle_ms)
            .arg(&ids)
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_error("XCLAIM", e))?;

        Ok(parse_entries(&result))
    }
}

/// 事件发布端，供请求路径与集成测试使用
pub struct RedisEventPublisher {
    conn: ConnectionManager,
    stream: String,
    max_len: Option<usize>,
}

impl RedisEventPublisher {
    pub fn new(conn: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            conn,
            stream: stream.into(),
            max_len: None,
        }
    }

    /// 设置最大长度（自动裁剪）
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub async fn publish(&self, event: &GameSaveEvent) -> AppResult<String> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*");
        for (key, value) in event.to_stream_fields()? {
            cmd.arg(key).arg(value);
        }

        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("XADD", e))?;

        debug!(stream = %self.stream, id = %id, event_type = %event.event_type, "Event published");
        Ok(id)
    }
}

fn bulk_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// 解析 `[id, [field, value, ...]]` 列表，已删除的条目（nil）被跳过
fn parse_entries(value: &Value) -> Vec<StreamDelivery> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let Value::Array(parts) = entry else {
                return None;
            };
            let entry_id = bulk_string(parts.first()?)?;
            let mut fields = HashMap::new();
            if let Some(Value::Array(field_values)) = parts.get(1) {
                for pair in field_values.chunks(2) {
                    if let [key, value] = pair {
                        if let (Some(k), Some(v)) = (bulk_string(key), bulk_string(value)) {
                            fields.insert(k, v);
                        }
                    }
                }
            }
            Some(StreamDelivery { entry_id, fields })
        })
        .collect()
}

/// 解析 XREADGROUP 响应：`[[stream, entries], ...]`，超时返回 nil
fn parse_xread_response(value: Value) -> Vec<StreamDelivery> {
    let Value::Array(streams) = value else {
        return Vec::new();
    };

    streams
        .iter()
        .filter_map(|stream| match stream {
            Value::Array(parts) => parts.get(1).map(parse_entries),
            _ => None,
        })
        .flatten()
        .collect()
}

/// 解析 XPENDING 扩展形式响应：`[[id, consumer, idle, deliveries], ...]`
fn parse_xpending_response(value: Value) -> Vec<String> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(parts) => parts.first().and_then(bulk_string),
            _ => None,
        })
        .collect()
}
