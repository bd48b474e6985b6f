//! 检测引擎内核
//!
//! 聚合注册表、活动追踪、冲突检测与协作分析。所有可变状态都经由
//! 这一个结构体变动，编排器用单把锁持有它（单写者纪律），
//! 同一路径的事件天然按到达顺序处理。

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::activity::FileActivityTracker;
use crate::analyzer::CollaborationAnalyzer;
use crate::config::MonitorConfig;
use crate::detector::ConflictDetector;
use crate::error::Result;
use crate::patterns::PatternStore;
use crate::session::SessionRegistry;
use crate::types::{
    now_ms, ActivityKind, ConflictAnalysis, DetectorStatistics, SessionSnapshot, SessionToken,
    WorkspaceStatus,
};
use std::collections::HashMap;

/// 检测引擎
pub struct Engine {
    registry: SessionRegistry,
    tracker: FileActivityTracker,
    detector: ConflictDetector,
    analyzer: CollaborationAnalyzer,
    learning_enabled: bool,
}

impl Engine {
    pub fn new(config: &MonitorConfig, patterns: Arc<PatternStore>) -> Self {
        let cd = &config.conflict_detection;
        Self {
            registry: SessionRegistry::new(),
            tracker: FileActivityTracker::new(cd.inactivity_window_secs),
            detector: ConflictDetector::new(cd.threshold, cd.learning_enabled, patterns.clone()),
            analyzer: CollaborationAnalyzer::new(
                patterns,
                config.collaboration.max_suggestions,
                config.collaboration.min_confidence,
            ),
            learning_enabled: cd.learning_enabled,
        }
    }

    pub fn register_session(
        &mut self,
        developer_id: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> SessionToken {
        self.registry.register(developer_id, metadata)
    }

    pub fn unregister_session(&mut self, token: &str) -> Result<()> {
        self.registry.unregister(token)?;
        self.tracker.release_session(token);
        Ok(())
    }

    /// 处理一次文件活动：更新并发状态 → 评分 → 生成建议
    pub fn process_activity(
        &mut self,
        token: &str,
        path: &Path,
        kind: ActivityKind,
    ) -> Result<ConflictAnalysis> {
        let started = Instant::now();
        let now = now_ms();

        // token 必须解析到活跃会话，失败不影响其他会话
        self.registry.resolve(token)?;

        self.tracker.record_activity(token, path, kind, now);
        self.registry
            .touch_file(token, path, kind != ActivityKind::Close)?;

        let others = self.tracker.concurrent_sessions_for(path, Some(token), now);
        let probability = self
            .detector
            .score(path, &others, self.tracker.window_ms(), now);
        let has_conflict = self.detector.is_conflict(probability);

        let concurrent_developers: Vec<SessionSnapshot> = others
            .iter()
            .filter_map(|e| {
                self.registry.resolve(&e.token).ok().map(|s| SessionSnapshot {
                    developer_id: s.developer_id.clone(),
                    token: e.token.clone(),
                    last_activity: e.last_activity,
                    kind: e.kind,
                })
            })
            .collect();

        let suggestions = if has_conflict {
            self.analyzer
                .suggest_for(path, &concurrent_developers, probability)
        } else {
            Vec::new()
        };

        // 争用路径上还没有任何会话 save 过 ⇒ 仍可避免
        let preventable = has_conflict && !self.tracker.has_saved(path, now);

        let detection_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.detector
            .record_analysis(path, has_conflict, detection_time_ms, now);

        if has_conflict {
            tracing::warn!(
                "⚠️ Conflict detected: path={:?}, probability={:.2}, developers={}",
                path,
                probability,
                concurrent_developers.len() + 1
            );
        }

        Ok(ConflictAnalysis {
            path: path.to_string_lossy().to_string(),
            probability,
            has_conflict,
            concurrent_developers,
            suggestions,
            preventable,
            detection_time_ms,
            timestamp: now,
        })
    }

    /// 外部文件变化触发的复查（不归属任何会话，不改会话状态）
    ///
    /// 路径上有两个以上活跃条目时重新评分，告警才返回分析结果。
    pub fn rescore_path(&mut self, path: &Path) -> Option<ConflictAnalysis> {
        let started = Instant::now();
        let now = now_ms();

        let entries = self.tracker.concurrent_sessions_for(path, None, now);
        if entries.len() < 2 {
            return None;
        }

        let probability = self
            .detector
            .score(path, &entries, self.tracker.window_ms(), now);
        let has_conflict = self.detector.is_conflict(probability);
        if !has_conflict {
            return None;
        }

        let concurrent_developers: Vec<SessionSnapshot> = entries
            .iter()
            .filter_map(|e| {
                self.registry.resolve(&e.token).ok().map(|s| SessionSnapshot {
                    developer_id: s.developer_id.clone(),
                    token: e.token.clone(),
                    last_activity: e.last_activity,
                    kind: e.kind,
                })
            })
            .collect();
        let suggestions = self
            .analyzer
            .suggest_for(path, &concurrent_developers, probability);
        let preventable = !self.tracker.has_saved(path, now);

        let detection_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.detector
            .record_analysis(path, true, detection_time_ms, now);

        Some(ConflictAnalysis {
            path: path.to_string_lossy().to_string(),
            probability,
            has_conflict: true,
            concurrent_developers,
            suggestions,
            preventable,
            detection_time_ms,
            timestamp: now,
        })
    }

    /// 结果反馈（精度统计与模式权重唯一的变动入口）
    pub fn record_outcome(
        &mut self,
        path: &Path,
        developer_ids: &[String],
        shape: &str,
        success: bool,
        details: Option<&str>,
    ) {
        if self.learning_enabled {
            if success {
                self.analyzer
                    .learn_from_success(path, developer_ids, shape, details);
            } else {
                self.analyzer
                    .learn_from_failure(path, developer_ids, shape, details);
            }
        }
        self.detector.confirm_feedback(path, success, now_ms());
    }

    pub fn status(&self) -> WorkspaceStatus {
        let (conflicts_detected, conflicts_prevented, average_detection_ms, total_analyses) =
            self.detector.metrics();
        WorkspaceStatus {
            active_sessions: self.registry.len(),
            monitored_files: self.tracker.live_path_count(now_ms()),
            conflicts_detected,
            conflicts_prevented,
            average_detection_ms,
            total_analyses,
        }
    }

    pub fn statistics(&self) -> DetectorStatistics {
        self.detector.statistics()
    }

    /// 停止时清空会话与并发状态（学习模式表由编排器另行落盘）
    pub fn reset_runtime_state(&mut self) {
        self.registry.clear();
        self.tracker.clear();
    }
}
