//! 会话注册表
//!
//! 持有所有活跃开发者会话，负责 token 签发与解析。
//! token 是外部唯一合法的会话句柄，内部状态一律按 token 查询。

use std::collections::{HashMap, HashSet};
use std::path::Path;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{now_ms, DeveloperSession, SessionToken};

/// 会话注册表
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionToken, DeveloperSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册开发者会话，返回签发的 token
    ///
    /// 重复注册同一 developer_id 会创建独立会话（调用方自行持有 token）。
    /// token 唯一性在签发时检查，碰撞则重新生成。
    pub fn register(
        &mut self,
        developer_id: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> SessionToken {
        let developer_id = developer_id.into();

        let mut token = Uuid::new_v4().to_string();
        while self.sessions.contains_key(&token) {
            token = Uuid::new_v4().to_string();
        }

        let session = DeveloperSession {
            developer_id: developer_id.clone(),
            token: token.clone(),
            metadata,
            active_files: HashSet::new(),
            created_at: now_ms(),
        };
        self.sessions.insert(token.clone(), session);

        tracing::info!("👤 Session registered: developer={}", developer_id);
        token
    }

    /// 按 token 解析会话
    pub fn resolve(&self, token: &str) -> Result<&DeveloperSession> {
        self.sessions
            .get(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))
    }

    /// 注销会话，返回被移除的会话（调用方负责释放 tracker 中的占用）
    pub fn unregister(&mut self, token: &str) -> Result<DeveloperSession> {
        let session = self
            .sessions
            .remove(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))?;
        tracing::info!("👋 Session unregistered: developer={}", session.developer_id);
        Ok(session)
    }

    /// 记录会话在某路径上的活动（open/edit/save 占用，close 释放）
    pub fn touch_file(&mut self, token: &str, path: &Path, active: bool) -> Result<()> {
        let session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| Error::SessionNotFound(token.to_string()))?;
        if active {
            session.active_files.insert(path.to_path_buf());
        } else {
            session.active_files.remove(path);
        }
        Ok(())
    }

    /// 活跃会话数
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 清空（监控器停止时）
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = SessionRegistry::new();
        let token = registry.register("alice", HashMap::new());

        let session = registry.resolve(&token).unwrap();
        assert_eq!(session.developer_id, "alice");
        assert_eq!(session.token, token);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_repeated_register_creates_distinct_sessions() {
        let mut registry = SessionRegistry::new();
        let t1 = registry.register("alice", HashMap::new());
        let t2 = registry.register("alice", HashMap::new());

        assert_ne!(t1, t2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_unknown_token_fails() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.resolve("no-such-token"),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let mut registry = SessionRegistry::new();
        let token = registry.register("bob", HashMap::new());

        registry.unregister(&token).unwrap();
        assert_eq!(registry.len(), 0);
        assert!(registry.resolve(&token).is_err());
        assert!(registry.unregister(&token).is_err());
    }

    #[test]
    fn test_touch_file_tracks_active_set() {
        let mut registry = SessionRegistry::new();
        let token = registry.register("alice", HashMap::new());
        let path = Path::new("/src/App.jsx");

        registry.touch_file(&token, path, true).unwrap();
        assert!(registry.resolve(&token).unwrap().active_files.contains(path));

        registry.touch_file(&token, path, false).unwrap();
        assert!(registry.resolve(&token).unwrap().active_files.is_empty());
    }
}
