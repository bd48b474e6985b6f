//! 监控器配置
//!
//! JSON 配置文件，分节组织。缺失必需节或取值越界时 `validate()` 失败，
//! 监控器不会进入 Running。

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 监控器配置（顶层）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// 文件监听配置
    pub monitoring: MonitoringConfig,
    /// 推送通道配置
    pub websocket: WebsocketConfig,
    /// 冲突检测配置
    pub conflict_detection: ConflictDetectionConfig,
    /// 建议目录调优
    pub collaboration: CollaborationConfig,
    /// 数据目录（模式快照等，默认 ~/.workspace-monitor）
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// 文件监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// 监听目录
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,
    /// 忽略的 glob 模式
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
}

/// 推送通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsocketConfig {
    /// 监听端口（0 = 临时端口，实际端口通过 `WorkspaceMonitor::port()` 查询）
    pub port: u16,
    pub max_connections: usize,
    /// 状态快照推送周期（秒）
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

/// 冲突检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetectionConfig {
    /// 告警阈值 [0,1]
    pub threshold: f64,
    pub learning_enabled: bool,
    /// 并发条目过期窗口（秒）
    #[serde(default = "default_inactivity_window")]
    pub inactivity_window_secs: u64,
    /// 模式快照落盘周期（秒）
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
}

/// 建议目录调优
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationConfig {
    /// 单次分析最多返回的建议数
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
    /// 低于此置信度的建议被过滤
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".workspace-monitor")
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
    ]
}

fn default_status_interval() -> u64 {
    30
}

fn default_inactivity_window() -> u64 {
    300
}

fn default_checkpoint_interval() -> u64 {
    60
}

fn default_max_suggestions() -> usize {
    3
}

fn default_min_confidence() -> f64 {
    0.3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig {
                enabled: true,
                watch_paths: Vec::new(),
                ignore_patterns: default_ignore_patterns(),
            },
            websocket: WebsocketConfig {
                port: 9870,
                max_connections: 64,
                status_interval_secs: default_status_interval(),
            },
            conflict_detection: ConflictDetectionConfig {
                threshold: 0.7,
                learning_enabled: true,
                inactivity_window_secs: default_inactivity_window(),
                checkpoint_interval_secs: default_checkpoint_interval(),
            },
            collaboration: CollaborationConfig {
                max_suggestions: default_max_suggestions(),
                min_confidence: default_min_confidence(),
            },
            data_dir: default_data_dir(),
        }
    }
}

impl MonitorConfig {
    /// 从 JSON 文件加载
    ///
    /// 缺失必需节（monitoring/websocket/conflictDetection/collaboration）
    /// 或 JSON 格式非法都视为配置错误。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("无法读取配置文件 {:?}: {}", path, e)))?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("配置文件解析失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围与 glob 模式
    pub fn validate(&self) -> Result<()> {
        let threshold = self.conflict_detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "conflictDetection.threshold 必须在 [0,1] 内: {}",
                threshold
            )));
        }
        if self.conflict_detection.inactivity_window_secs == 0 {
            return Err(Error::Config(
                "conflictDetection.inactivityWindowSecs 必须大于 0".to_string(),
            ));
        }
        if self.websocket.max_connections == 0 {
            return Err(Error::Config(
                "websocket.maxConnections 必须大于 0".to_string(),
            ));
        }
        if self.collaboration.max_suggestions == 0 {
            return Err(Error::Config(
                "collaboration.maxSuggestions 必须大于 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.collaboration.min_confidence) {
            return Err(Error::Config(format!(
                "collaboration.minConfidence 必须在 [0,1] 内: {}",
                self.collaboration.min_confidence
            )));
        }
        // glob 模式在校验阶段编译一次，启动后不再失败
        self.ignore_set()?;
        Ok(())
    }

    /// 编译忽略模式集合
    pub fn ignore_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.monitoring.ignore_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("非法 glob 模式 {:?}: {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("glob 集合构建失败: {}", e)))
    }

    /// 模式快照路径
    pub fn pattern_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("patterns.json")
    }
}
