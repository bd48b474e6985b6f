//! 学习模式表
//!
//! 以 (文件类型, 协作形态) 为 key 累积风险权重。权重只通过
//! CollaborationAnalyzer 的反馈入口更新，评分阶段只读。
//! 表常驻内存，可选 JSON 快照落盘；快照损坏时回退空表并告警，不致命。

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::now_ms;

/// 单个学习模式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    /// 风险权重 [0.05, 0.95]，0.5 为中性；成功反馈压低，失败反馈抬高
    pub weight: f64,
    /// 置信度 [0,1]，随反馈单调不减
    pub confidence: f64,
    /// 反馈次数
    pub update_count: u64,
    /// 最后更新时间（毫秒时间戳）
    pub last_updated: i64,
}

impl Default for LearnedPattern {
    fn default() -> Self {
        Self {
            weight: 0.5,
            confidence: 0.0,
            update_count: 0,
            last_updated: 0,
        }
    }
}

/// 权重调整步长
const WEIGHT_STEP: f64 = 0.08;
/// 置信度增量
const CONFIDENCE_STEP: f64 = 0.05;
const WEIGHT_MIN: f64 = 0.05;
const WEIGHT_MAX: f64 = 0.95;
const CONFIDENCE_MAX: f64 = 0.95;

/// 学习模式存储
///
/// 由编排器持有，按引用注入 ConflictDetector / CollaborationAnalyzer，
/// 生命周期与 WorkspaceMonitor 一致（非全局单例）。
#[derive(Debug, Default)]
pub struct PatternStore {
    inner: RwLock<HashMap<String, LearnedPattern>>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询模式（无则 None，评分方退回纯启发式）
    pub fn lookup(&self, key: &str) -> Option<LearnedPattern> {
        self.inner.read().get(key).cloned()
    }

    /// 反馈强化：success 压低风险权重，failure 抬高；置信度单调上升
    pub fn reinforce(&self, key: &str, success: bool) -> LearnedPattern {
        let mut inner = self.inner.write();
        let pattern = inner.entry(key.to_string()).or_default();

        let delta = if success { -WEIGHT_STEP } else { WEIGHT_STEP };
        pattern.weight = (pattern.weight + delta).clamp(WEIGHT_MIN, WEIGHT_MAX);
        pattern.confidence = (pattern.confidence + CONFIDENCE_STEP).min(CONFIDENCE_MAX);
        pattern.update_count += 1;
        pattern.last_updated = now_ms();

        pattern.clone()
    }

    /// 已学习的模式数
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// 从 JSON 快照加载
    ///
    /// 文件缺失 → 空表（正常首次启动）；文件损坏 → `LearningStateCorrupt`，
    /// 调用方记告警后继续用空表。
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let content = std::fs::read_to_string(path)?;
        let table: HashMap<String, LearnedPattern> = serde_json::from_str(&content)
            .map_err(|e| Error::LearningStateCorrupt(format!("{:?}: {}", path, e)))?;

        let count = table.len();
        *self.inner.write() = table;
        tracing::info!("📚 Pattern snapshot loaded: {} patterns", count);
        Ok(count)
    }

    /// 落盘 JSON 快照
    pub fn checkpoint(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = {
            let inner = self.inner.read();
            serde_json::to_string_pretty(&*inner)?
        };
        std::fs::write(path, json)?;
        tracing::debug!("💾 Pattern snapshot written: {:?}", path);
        Ok(())
    }
}

/// 模式 key：`扩展名:协作形态`
pub fn pattern_key(path: &Path, shape: &str) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("none");
    format!("{}:{}", ext, shape)
}

/// 按参与人数归类协作形态
///
/// 评分方用并发会话数推导，反馈方回传分析里的同一字符串，两边 key 对齐。
pub fn collaboration_shape(participants: usize) -> &'static str {
    match participants {
        0 | 1 => "solo",
        2 => "pair",
        3 | 4 => "small-group",
        _ => "crowd",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lookup_missing_returns_none() {
        let store = PatternStore::new();
        assert!(store.lookup("jsx:pair").is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_reinforce_success_monotonic_confidence() {
        let store = PatternStore::new();

        let mut last_confidence = 0.0;
        let mut last_weight = 0.5;
        for _ in 0..20 {
            let p = store.reinforce("jsx:pair", true);
            // 置信度单调不减，权重单调不增
            assert!(p.confidence >= last_confidence);
            assert!(p.weight <= last_weight);
            last_confidence = p.confidence;
            last_weight = p.weight;
        }

        let p = store.lookup("jsx:pair").unwrap();
        assert_eq!(p.update_count, 20);
        assert!(p.weight >= 0.05);
        assert!(p.confidence <= 0.95);
    }

    #[test]
    fn test_reinforce_failure_raises_weight() {
        let store = PatternStore::new();
        store.reinforce("rs:crowd", false);
        let p = store.lookup("rs:crowd").unwrap();
        assert!(p.weight > 0.5);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");

        let store = PatternStore::new();
        store.reinforce("jsx:pair", false);
        store.reinforce("jsx:pair", false);
        store.checkpoint(&path).unwrap();

        let restored = PatternStore::new();
        assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
        let p = restored.lookup("jsx:pair").unwrap();
        assert_eq!(p.update_count, 2);
        assert!(p.weight > 0.5);
    }

    #[test]
    fn test_missing_snapshot_is_empty_table() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new();
        assert_eq!(
            store.load_snapshot(&dir.path().join("missing.json")).unwrap(),
            0
        );
    }

    #[test]
    fn test_corrupt_snapshot_reports_and_keeps_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let store = PatternStore::new();
        assert!(matches!(
            store.load_snapshot(&path),
            Err(Error::LearningStateCorrupt(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_pattern_key_and_shape() {
        assert_eq!(pattern_key(Path::new("/src/App.jsx"), "pair"), "jsx:pair");
        assert_eq!(pattern_key(Path::new("/Makefile"), "pair"), "none:pair");
        assert_eq!(collaboration_shape(1), "solo");
        assert_eq!(collaboration_shape(2), "pair");
        assert_eq!(collaboration_shape(4), "small-group");
        assert_eq!(collaboration_shape(9), "crowd");
    }
}
