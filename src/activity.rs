//! 文件活动追踪
//!
//! 维护 文件路径 → 当前活跃会话条目 的映射。条目超过不活跃窗口后
//! 在每次读取时惰性清除（无后台定时器），避免幽灵会话抬高冲突概率。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::types::{ActivityKind, SessionToken};

/// 单个并发访问条目
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub token: SessionToken,
    pub kind: ActivityKind,
    /// 最后活动时间（毫秒时间戳）
    pub last_activity: i64,
}

/// 文件活动追踪器
#[derive(Debug)]
pub struct FileActivityTracker {
    /// 不活跃窗口（毫秒）
    window_ms: i64,
    entries: HashMap<PathBuf, Vec<AccessEntry>>,
    /// 发生过 save 的路径（粘性标记，后续活动不抹掉，
    /// 路径访问状态清空时复位）
    saved_paths: HashSet<PathBuf>,
}

impl FileActivityTracker {
    pub fn new(inactivity_window_secs: u64) -> Self {
        Self {
            window_ms: (inactivity_window_secs as i64) * 1000,
            entries: HashMap::new(),
            saved_paths: HashSet::new(),
        }
    }

    /// 记录活动：open/edit/save 插入或更新条目，close 移除条目
    pub fn record_activity(&mut self, token: &str, path: &Path, kind: ActivityKind, now: i64) {
        self.sweep_path(path, now);

        let entries = self.entries.entry(path.to_path_buf()).or_default();

        if kind == ActivityKind::Close {
            entries.retain(|e| e.token != token);
            if entries.is_empty() {
                self.entries.remove(path);
                self.saved_paths.remove(path);
            }
            return;
        }

        if let Some(entry) = entries.iter_mut().find(|e| e.token == token) {
            entry.kind = kind;
            entry.last_activity = now;
        } else {
            entries.push(AccessEntry {
                token: token.to_string(),
                kind,
                last_activity: now,
            });
        }

        if kind == ActivityKind::Save {
            self.saved_paths.insert(path.to_path_buf());
        }
    }

    /// 路径上除 `excluding` 外的活跃会话，最近活动优先
    pub fn concurrent_sessions_for(
        &mut self,
        path: &Path,
        excluding: Option<&str>,
        now: i64,
    ) -> Vec<AccessEntry> {
        self.sweep_path(path, now);

        let mut result: Vec<AccessEntry> = self
            .entries
            .get(path)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| excluding != Some(e.token.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        result
    }

    /// 路径上是否发生过 save
    ///
    /// 标记是粘性的：save 后再 edit 不会抹掉保存历史。路径上不再有
    /// 未过期条目时视为访问状态清空，标记随之失效。
    pub fn has_saved(&self, path: &Path, now: i64) -> bool {
        self.saved_paths.contains(path)
            && self
                .entries
                .get(path)
                .map(|entries| entries.iter().any(|e| !self.expired(e, now)))
                .unwrap_or(false)
    }

    /// 释放某会话在所有路径上的占用（注销时）
    pub fn release_session(&mut self, token: &str) {
        let saved_paths = &mut self.saved_paths;
        self.entries.retain(|path, entries| {
            entries.retain(|e| e.token != token);
            if entries.is_empty() {
                saved_paths.remove(path);
                return false;
            }
            true
        });
    }

    /// 当前有未过期条目的路径数（只读，不触发清除）
    pub fn live_path_count(&self, now: i64) -> usize {
        self.entries
            .values()
            .filter(|entries| entries.iter().any(|e| !self.expired(e, now)))
            .count()
    }

    /// 不活跃窗口（毫秒）
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.saved_paths.clear();
    }

    fn expired(&self, entry: &AccessEntry, now: i64) -> bool {
        now - entry.last_activity > self.window_ms
    }

    /// 惰性过期清除
    fn sweep_path(&mut self, path: &Path, now: i64) {
        let window_ms = self.window_ms;
        if let Some(entries) = self.entries.get_mut(path) {
            entries.retain(|e| now - e.last_activity <= window_ms);
            if entries.is_empty() {
                self.entries.remove(path);
                self.saved_paths.remove(path);
            }
        }
    }
}
