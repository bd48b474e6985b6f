//! 数据类型定义

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 会话 token（外部唯一合法的会话句柄）
pub type SessionToken = String;

/// 当前毫秒时间戳
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 文件活动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Open,
    Edit,
    Save,
    Close,
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(ActivityKind::Open),
            "edit" => Ok(ActivityKind::Edit),
            "save" => Ok(ActivityKind::Save),
            "close" => Ok(ActivityKind::Close),
            _ => Err(format!("Invalid activity kind: {}", s)),
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Open => write!(f, "open"),
            ActivityKind::Edit => write!(f, "edit"),
            ActivityKind::Save => write!(f, "save"),
            ActivityKind::Close => write!(f, "close"),
        }
    }
}

/// 开发者会话
///
/// 由 SessionRegistry 独占持有，其他组件只通过 token 查询。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperSession {
    /// 开发者自报的 ID
    pub developer_id: String,
    /// 会话 token（不可猜测，注册时签发）
    pub token: SessionToken,
    /// 任意元数据（team / skills / timezone 等）
    pub metadata: HashMap<String, String>,
    /// 当前活跃的文件路径集合
    pub active_files: HashSet<PathBuf>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
}

/// 文件活动事件（瞬态，评分后不保留）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileActivityEvent {
    pub token: SessionToken,
    pub path: PathBuf,
    pub kind: ActivityKind,
    pub timestamp: i64,
}

/// 会话快照（ConflictAnalysis 中携带，非活引用）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub developer_id: String,
    pub token: SessionToken,
    /// 在争用路径上的最后活动时间（毫秒）
    pub last_activity: i64,
    /// 在争用路径上的最后活动类型
    pub kind: ActivityKind,
}

/// 建议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// 直接沟通
    Communication,
    /// 合并协调
    MergeCoordination,
    /// 错峰安排
    Scheduling,
}

/// 建议优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// 缓解建议
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub r#type: SuggestionType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    /// 置信度 [0,1]
    pub confidence: f64,
}

/// 冲突分析结果
///
/// 每次 `report_file_activity` 调用新建，返回后不再修改。
/// 使用 camelCase 序列化，与 JSON API 标准保持一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictAnalysis {
    pub path: String,
    /// 冲突概率 [0,1]
    pub probability: f64,
    /// probability >= threshold
    pub has_conflict: bool,
    /// 同路径上的其他会话（最近活动优先）
    pub concurrent_developers: Vec<SessionSnapshot>,
    /// 缓解建议（按置信度降序，最多 max_suggestions 条）
    pub suggestions: Vec<Suggestion>,
    /// 是否在任何会话 save 之前捕获
    pub preventable: bool,
    /// 检测耗时（毫秒）
    pub detection_time_ms: f64,
    /// 分析时间（毫秒时间戳）
    pub timestamp: i64,
}

/// 工作区状态快照（只读视图，按需重算）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    pub active_sessions: usize,
    pub monitored_files: usize,
    pub conflicts_detected: u64,
    pub conflicts_prevented: u64,
    pub average_detection_ms: f64,
    pub total_analyses: u64,
}

/// 检测统计（getStatistics 返回值）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorStatistics {
    /// 已确认预测 / 收到反馈的预测（无反馈的预测不进分母）
    pub accuracy: f64,
    pub total_analyses: u64,
    pub pattern_count: usize,
}
