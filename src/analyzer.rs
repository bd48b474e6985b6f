//! 协作分析
//!
//! 把已告警的冲突转成有序缓解建议，并吸收事后结果反馈调整学习模式。
//! 建议从固定目录模板中选取，给定 (并发开发者, 路径, 学习权重) 三元组
//! 时输出确定，按置信度降序，最多 max_suggestions 条。

use std::path::Path;
use std::sync::Arc;

use crate::patterns::{collaboration_shape, pattern_key, PatternStore};
use crate::types::{ActivityKind, Priority, SessionSnapshot, Suggestion, SuggestionType};

/// 协作分析器
pub struct CollaborationAnalyzer {
    patterns: Arc<PatternStore>,
    max_suggestions: usize,
    min_confidence: f64,
}

impl CollaborationAnalyzer {
    pub fn new(patterns: Arc<PatternStore>, max_suggestions: usize, min_confidence: f64) -> Self {
        Self {
            patterns,
            max_suggestions,
            min_confidence,
        }
    }

    /// 为一次冲突分析生成建议
    pub fn suggest_for(
        &self,
        path: &Path,
        concurrent: &[SessionSnapshot],
        probability: f64,
    ) -> Vec<Suggestion> {
        if concurrent.is_empty() {
            return Vec::new();
        }

        let participants = concurrent.len() + 1;
        let shape = collaboration_shape(participants);
        let key = pattern_key(path, shape);
        // 学习到的模式置信度给整组建议加成
        let pattern_boost = self
            .patterns
            .lookup(&key)
            .filter(|p| p.update_count > 0)
            .map(|p| p.confidence * 0.1)
            .unwrap_or(0.0);

        let peer_names: Vec<&str> = concurrent.iter().map(|s| s.developer_id.as_str()).collect();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("this file");
        let someone_saved = concurrent.iter().any(|s| s.kind == ActivityKind::Save);

        let mut suggestions = vec![
            Suggestion {
                r#type: SuggestionType::Communication,
                priority: Priority::Low,
                title: "Talk to the other developers first".to_string(),
                description: format!(
                    "{} {} currently working on {}. A quick message now avoids a merge later.",
                    peer_names.join(", "),
                    if peer_names.len() == 1 { "is" } else { "are" },
                    file_name
                ),
                confidence: clamp01(0.55 + 0.35 * probability + pattern_boost),
            },
            Suggestion {
                r#type: SuggestionType::MergeCoordination,
                priority: Priority::Low,
                title: "Coordinate the merge order".to_string(),
                description: format!(
                    "Agree on who lands changes to {} first{}.",
                    file_name,
                    if someone_saved {
                        "; a save has already happened on this path"
                    } else {
                        ""
                    }
                ),
                confidence: clamp01(
                    0.45 + 0.4 * probability
                        + if someone_saved { 0.1 } else { 0.0 }
                        + pattern_boost,
                ),
            },
            Suggestion {
                r#type: SuggestionType::Scheduling,
                priority: Priority::Low,
                title: "Stagger the work".to_string(),
                description: format!(
                    "With {} developers on one file, splitting the change or taking turns is safer.",
                    participants
                ),
                confidence: clamp01(
                    0.3 + 0.2 * probability
                        + if participants >= 3 { 0.15 } else { 0.0 }
                        + pattern_boost,
                ),
            },
        ];

        for s in &mut suggestions {
            s.priority = priority_for(s.confidence);
        }

        suggestions.retain(|s| s.confidence >= self.min_confidence);
        // 置信度降序，同分时保持目录顺序（sort_by 稳定）
        suggestions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        suggestions.truncate(self.max_suggestions);
        suggestions
    }

    /// 成功结果反馈：协作顺利完成（或告警后冲突被避免）
    ///
    /// 压低对应模式的风险权重，抬高置信度。反馈是模式权重唯一的变动入口。
    pub fn learn_from_success(
        &self,
        path: &Path,
        developer_ids: &[String],
        shape: &str,
        details: Option<&str>,
    ) {
        let key = pattern_key(path, shape);
        let pattern = self.patterns.reinforce(&key, true);
        tracing::info!(
            "📚 Learned from success: key={}, developers={}, weight={:.2}, confidence={:.2}{}",
            key,
            developer_ids.len(),
            pattern.weight,
            pattern.confidence,
            details.map(|d| format!(", details={}", d)).unwrap_or_default()
        );
    }

    /// 失败结果反馈：真实冲突被确认，抬高对应模式的未来权重
    pub fn learn_from_failure(
        &self,
        path: &Path,
        developer_ids: &[String],
        shape: &str,
        details: Option<&str>,
    ) {
        let key = pattern_key(path, shape);
        let pattern = self.patterns.reinforce(&key, false);
        tracing::info!(
            "📚 Learned from failure: key={}, developers={}, weight={:.2}, confidence={:.2}{}",
            key,
            developer_ids.len(),
            pattern.weight,
            pattern.confidence,
            details.map(|d| format!(", details={}", d)).unwrap_or_default()
        );
    }
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn priority_for(confidence: f64) -> Priority {
    if confidence >= 0.75 {
        Priority::High
    } else if confidence >= 0.5 {
        Priority::Medium
    } else {
        Priority::Low
    }
}
