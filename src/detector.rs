//! 冲突检测
//!
//! 给定一次活动事件与该路径上的并发会话集合，计算冲突概率。
//!
//! 评分曲线（具体形式是实现选择，硬性要求只有单调性与阈值性质）：
//! 每个其他并发会话贡献 `c_i = 0.75 · kind_i · recency_i`，
//! kind 权重 edit=1.0 / save=0.95 / open=0.55，recency 从 1.0 线性衰减到
//! 窗口边界处的 0.3。原始概率取饱和补积 `raw = 1 − Π(1 − c_i)`：
//! 零并发 ⇒ 0，会话数单调递增、收益递减，永不超过 1。
//!
//! 学习混合：信任度 `t = min(n/(n+5), 0.7)`（n 为模式反馈次数），
//! `p = raw·(1−t) + weight·t`。无模式时 t=0，退回纯启发式。
//! 评分对模式表只读；权重只经 CollaborationAnalyzer 的反馈入口变动。

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::activity::AccessEntry;
use crate::patterns::{collaboration_shape, pattern_key, PatternStore};
use crate::types::{ActivityKind, DetectorStatistics};

/// 单会话最大贡献
const BASE_CONTRIBUTION: f64 = 0.75;
/// 窗口边界处的最小 recency 系数
const RECENCY_FLOOR: f64 = 0.3;
/// 已告警预测的反馈匹配窗口（毫秒）
const FEEDBACK_WINDOW_MS: i64 = 60 * 60 * 1000;
/// 预测台账上限
const MAX_FLAGGED: usize = 256;

/// 已告警但尚未收到反馈的预测
#[derive(Debug, Clone)]
struct FlaggedPrediction {
    path: String,
    at: i64,
}

/// 冲突检测器
pub struct ConflictDetector {
    threshold: f64,
    learning_enabled: bool,
    patterns: Arc<PatternStore>,

    total_analyses: u64,
    conflicts_detected: u64,
    conflicts_prevented: u64,
    detection_time_total_ms: f64,

    /// 收到的结果反馈数（精度统计分母）
    feedback_received: u64,
    /// 与已告警预测匹配上的反馈数（分子）
    feedback_confirmed: u64,
    flagged: VecDeque<FlaggedPrediction>,
}

impl ConflictDetector {
    pub fn new(threshold: f64, learning_enabled: bool, patterns: Arc<PatternStore>) -> Self {
        Self {
            threshold,
            learning_enabled,
            patterns,
            total_analyses: 0,
            conflicts_detected: 0,
            conflicts_prevented: 0,
            detection_time_total_ms: 0.0,
            feedback_received: 0,
            feedback_confirmed: 0,
            flagged: VecDeque::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 计算混合冲突概率（纯函数，不动统计与模式表）
    pub fn score(&self, path: &Path, others: &[AccessEntry], window_ms: i64, now: i64) -> f64 {
        let raw = Self::raw_score(others, window_ms, now);

        if !self.learning_enabled || others.is_empty() {
            return raw;
        }

        let shape = collaboration_shape(others.len() + 1);
        let key = pattern_key(path, shape);
        match self.patterns.lookup(&key) {
            Some(pattern) if pattern.update_count > 0 => {
                let n = pattern.update_count as f64;
                // 观测越多越信学习信号，上限 0.7 保证启发式永不被完全覆盖
                let trust = (n / (n + 5.0)).min(0.7);
                (raw * (1.0 - trust) + pattern.weight * trust).clamp(0.0, 1.0)
            }
            _ => raw,
        }
    }

    /// 原始启发式评分（饱和补积）
    fn raw_score(others: &[AccessEntry], window_ms: i64, now: i64) -> f64 {
        let mut survival = 1.0_f64;
        for entry in others {
            let age = (now - entry.last_activity).max(0) as f64;
            let recency = (1.0 - (1.0 - RECENCY_FLOOR) * (age / window_ms as f64))
                .clamp(RECENCY_FLOOR, 1.0);
            let kind = match entry.kind {
                ActivityKind::Edit => 1.0,
                ActivityKind::Save => 0.95,
                ActivityKind::Open => 0.55,
                // close 条目不会留在 tracker 里
                ActivityKind::Close => 0.0,
            };
            let contribution = (BASE_CONTRIBUTION * kind * recency).clamp(0.0, 1.0);
            survival *= 1.0 - contribution;
        }
        (1.0 - survival).clamp(0.0, 1.0)
    }

    pub fn is_conflict(&self, probability: f64) -> bool {
        probability >= self.threshold
    }

    /// 记录一次评分调用（状态指标 + 已告警预测台账）
    pub fn record_analysis(&mut self, path: &Path, has_conflict: bool, elapsed_ms: f64, now: i64) {
        self.total_analyses += 1;
        self.detection_time_total_ms += elapsed_ms;

        if has_conflict {
            self.conflicts_detected += 1;
            if self.flagged.len() >= MAX_FLAGGED {
                self.flagged.pop_front();
            }
            self.flagged.push_back(FlaggedPrediction {
                path: path.to_string_lossy().to_string(),
                at: now,
            });
        }
    }

    /// 接收结果反馈（精度统计唯一的变动入口）
    ///
    /// 反馈若与台账中某条已告警预测（同路径、窗口内）匹配，计为已确认；
    /// success 同时计入 conflicts_prevented。未匹配的反馈只进分母，
    /// 拉低精度（检测器没预测到的结果）。
    pub fn confirm_feedback(&mut self, path: &Path, success: bool, now: i64) -> bool {
        self.feedback_received += 1;

        let path_str = path.to_string_lossy();
        let matched = self
            .flagged
            .iter()
            .position(|p| p.path == path_str && now - p.at <= FEEDBACK_WINDOW_MS);

        if let Some(idx) = matched {
            self.flagged.remove(idx);
            self.feedback_confirmed += 1;
            if success {
                self.conflicts_prevented += 1;
            }
            true
        } else {
            false
        }
    }

    pub fn statistics(&self) -> DetectorStatistics {
        let accuracy = if self.feedback_received == 0 {
            0.0
        } else {
            self.feedback_confirmed as f64 / self.feedback_received as f64
        };
        DetectorStatistics {
            accuracy,
            total_analyses: self.total_analyses,
            pattern_count: self.patterns.len(),
        }
    }

    /// 状态快照所需的累计指标
    pub fn metrics(&self) -> (u64, u64, f64, u64) {
        let avg = if self.total_analyses == 0 {
            0.0
        } else {
            self.detection_time_total_ms / self.total_analyses as f64
        };
        (
            self.conflicts_detected,
            self.conflicts_prevented,
            avg,
            self.total_analyses,
        )
    }
}
