//! 文件监听器
//!
//! 外部文件变化作为入站事件源送进编排器。`FileWatcher` 是能力接口：
//! 生产实现走 notify（2 秒防抖），测试用确定性的手动实现。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;

/// 外部文件变化类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChangeKind {
    Modified,
    Removed,
}

/// 外部文件变化事件
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsChangeKind,
}

/// 文件监听能力接口
pub trait FileWatcher: Send + 'static {
    /// 开始监听，事件经 `tx` 送入编排器
    fn start(&mut self, paths: &[PathBuf], tx: mpsc::Sender<FsEvent>) -> Result<()>;

    /// 停止监听，释放底层资源
    fn stop(&mut self);
}

/// notify 生产实现
#[derive(Default)]
pub struct NotifyFileWatcher {
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl NotifyFileWatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileWatcher for NotifyFileWatcher {
    fn start(&mut self, paths: &[PathBuf], tx: mpsc::Sender<FsEvent>) -> Result<()> {
        // 2 秒防抖，编辑器连续写入合并为一次事件
        let mut debouncer = new_debouncer(
            Duration::from_secs(2),
            move |res: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| {
                if let Ok(events) = res {
                    for event in events {
                        if event.kind == DebouncedEventKind::Any {
                            let _ = tx.blocking_send(FsEvent {
                                path: event.path,
                                kind: FsChangeKind::Modified,
                            });
                        }
                    }
                }
            },
        )?;

        for path in paths {
            match debouncer.watcher().watch(path, RecursiveMode::Recursive) {
                Ok(_) => {
                    tracing::info!("👁️ Watching directory: {:?}", path);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to watch directory {:?}: {}", path, e);
                }
            }
        }

        if paths.is_empty() {
            tracing::warn!("⚠️ No watch directories configured");
        }

        self.debouncer = Some(debouncer);
        Ok(())
    }

    fn stop(&mut self) {
        self.debouncer = None;
    }
}

/// 确定性手动监听器（测试用）
///
/// `handle()` 返回的句柄可在监听启动后注入事件。
#[derive(Default)]
pub struct ManualFileWatcher {
    tx: Arc<Mutex<Option<mpsc::Sender<FsEvent>>>>,
}

/// 手动监听器句柄
#[derive(Clone)]
pub struct ManualWatcherHandle {
    tx: Arc<Mutex<Option<mpsc::Sender<FsEvent>>>>,
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> ManualWatcherHandle {
        ManualWatcherHandle {
            tx: self.tx.clone(),
        }
    }
}

impl ManualWatcherHandle {
    /// 注入一个文件变化事件，返回是否送达
    pub fn emit(&self, path: impl Into<PathBuf>, kind: FsChangeKind) -> bool {
        let sender = self.tx.lock().clone();
        match sender {
            Some(tx) => tx
                .try_send(FsEvent {
                    path: path.into(),
                    kind,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl FileWatcher for ManualFileWatcher {
    fn start(&mut self, _paths: &[PathBuf], tx: mpsc::Sender<FsEvent>) -> Result<()> {
        *self.tx.lock() = Some(tx);
        Ok(())
    }

    fn stop(&mut self) {
        *self.tx.lock() = None;
    }
}
