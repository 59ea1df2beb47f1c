//! 键空间

use save_common::GameSaveId;
use save_ports::CacheKind;

const ROOT: &str = "game-save";

/// 所有 Redis 键的生成规则，可选的全局前缀用于多环境共享实例
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: Option<String>,
}

impl KeySpace {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    pub fn cache_key(&self, kind: CacheKind, id: &GameSaveId) -> String {
        self.prefixed(&format!("{}:cache:{}:{}", ROOT, kind.segment(), id))
    }

    /// SCAN 用的匹配模式
    pub fn cache_pattern(&self, kind: CacheKind) -> String {
        self.prefixed(&format!("{}:cache:{}:*", ROOT, kind.segment()))
    }

    pub fn pending_key(&self) -> String {
        self.prefixed(&format!("{}:flush:pending", ROOT))
    }

    pub fn processing_key(&self) -> String {
        self.prefixed(&format!("{}:flush:processing", ROOT))
    }

    pub fn stream_key(&self, stream: &str) -> String {
        self.prefixed(stream)
    }
}

/// 从缓存键末尾解析存档 ID
pub(crate) fn id_from_key(key: &str) -> Option<GameSaveId> {
    key.rsplit(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_without_prefix() {
        let keys = KeySpace::default();
        let id = GameSaveId::new();

        assert_eq!(
            keys.cache_key(CacheKind::Currency, &id),
            format!("game-save:cache:currency:{}", id)
        );
        assert_eq!(keys.pending_key(), "game-save:flush:pending");
        assert_eq!(keys.cache_pattern(CacheKind::Stage), "game-save:cache:stage:*");
    }

    #[test]
    fn test_keys_with_prefix() {
        let keys = KeySpace::new(Some("staging".to_string()));
        assert_eq!(keys.processing_key(), "staging:game-save:flush:processing");
        assert_eq!(keys.stream_key("events"), "staging:events");

        assert_eq!(KeySpace::new(Some(String::new())), KeySpace::default());
    }

    #[test]
    fn test_id_roundtrip() {
        let keys = KeySpace::new(Some("p".to_string()));
        let id = GameSaveId::new();
        assert_eq!(id_from_key(&keys.cache_key(CacheKind::Session, &id)), Some(id));
        assert_eq!(id_from_key("game-save:cache:session:garbage"), None);
    }
}
