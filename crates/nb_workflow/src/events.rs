// crates/nb_workflow/src/events.rs

//! 流水线事件
//!
//! 阶段状态变化以 [`PipelineEvent`] 分发给已注册的监听器。

use crate::job::{StageId, StageKind, StageStatus};
use nb_foundation::ForecastDate;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// 流水线事件
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// 运行开始
    RunStarted {
        /// 处理日期
        date: ForecastDate,
        /// 预报天数
        ndays: u32,
    },
    /// 阶段开始
    StageStarted {
        /// 阶段 ID
        stage_id: StageId,
        /// 阶段类型
        kind: StageKind,
    },
    /// 阶段完成
    StageCompleted {
        /// 阶段 ID
        stage_id: StageId,
        /// 阶段类型
        kind: StageKind,
        /// 运行时长 (秒)
        duration_secs: f64,
        /// 产物
        outputs: Vec<PathBuf>,
    },
    /// 阶段失败
    StageFailed {
        /// 阶段 ID
        stage_id: StageId,
        /// 阶段类型
        kind: StageKind,
        /// 错误信息
        error: String,
        /// 是否终止整个运行
        fatal: bool,
    },
    /// 阶段状态变更
    StageStatusChanged {
        /// 阶段 ID
        stage_id: StageId,
        /// 旧状态
        old_status: StageStatus,
        /// 新状态
        new_status: StageStatus,
    },
    /// 运行结束
    RunFinished {
        /// 是否成功
        success: bool,
    },
}

impl PipelineEvent {
    /// 事件对应的阶段 ID
    pub fn stage_id(&self) -> Option<StageId> {
        match self {
            Self::StageStarted { stage_id, .. }
            | Self::StageCompleted { stage_id, .. }
            | Self::StageFailed { stage_id, .. }
            | Self::StageStatusChanged { stage_id, .. } => Some(*stage_id),
            Self::RunStarted { .. } | Self::RunFinished { .. } => None,
        }
    }

    /// 事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RunStarted",
            Self::StageStarted { .. } => "StageStarted",
            Self::StageCompleted { .. } => "StageCompleted",
            Self::StageFailed { .. } => "StageFailed",
            Self::StageStatusChanged { .. } => "StageStatusChanged",
            Self::RunFinished { .. } => "RunFinished",
        }
    }
}

/// 事件监听器
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &PipelineEvent);

    /// 监听器名称
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 函数式事件监听器
pub struct FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    /// 创建
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 日志事件监听器
pub struct LoggingListener {
    prefix: String,
    verbose: bool,
}

impl LoggingListener {
    /// 创建
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            verbose: false,
        }
    }

    /// 同时记录状态变更
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl EventListener for LoggingListener {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { date, ndays } => {
                tracing::info!("{}: 运行开始 {} ({} 天)", self.prefix, date, ndays);
            }
            PipelineEvent::StageStarted { kind, .. } => {
                tracing::info!("{}: 阶段 {} 开始", self.prefix, kind);
            }
            PipelineEvent::StageCompleted {
                kind,
                duration_secs,
                outputs,
                ..
            } => {
                tracing::info!(
                    "{}: 阶段 {} 完成，用时 {:.1}s，产物 {} 个",
                    self.prefix,
                    kind,
                    duration_secs,
                    outputs.len()
                );
            }
            PipelineEvent::StageFailed {
                kind, error, fatal, ..
            } => {
                if *fatal {
                    tracing::error!("{}: 阶段 {} 失败: {}", self.prefix, kind, error);
                } else {
                    tracing::warn!("{}: 阶段 {} 失败，继续运行: {}", self.prefix, kind, error);
                }
            }
            PipelineEvent::StageStatusChanged {
                stage_id,
                old_status,
                new_status,
            } if self.verbose => {
                tracing::info!(
                    "{}: 阶段 {} 状态 {} -> {}",
                    self.prefix,
                    stage_id,
                    old_status,
                    new_status
                );
            }
            PipelineEvent::RunFinished { success } => {
                tracing::info!(
                    "{}: 运行结束 ({})",
                    self.prefix,
                    if *success { "成功" } else { "失败" }
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        let name = listener.name().to_string();
        self.listeners.write().push(listener);
        tracing::debug!("添加事件监听器: {}", name);
    }

    /// 添加函数式监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 移除监听器
    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// 清除所有监听器
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// 分发事件
    pub fn emit(&self, event: PipelineEvent) {
        let listeners = self.listeners.read();
        tracing::trace!("分发事件: {}", event.name());
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    /// 监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
