// crates/nb_workflow/src/job.rs

//! 阶段任务
//!
//! 一次流水线运行由若干阶段组成，每个阶段记录为一个 [`StageJob`]。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use nb_foundation::ForecastDate;

/// 阶段任务 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(Uuid);

impl StageId {
    /// 新 ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 内部 UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// 同化增量
    Increment,
    /// 开边界
    Boundary,
    /// 径流温度
    Runoff,
    /// 冷启动初始场
    Initial,
    /// 模式运行
    Model,
}

impl StageKind {
    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Boundary => "boundary",
            Self::Runoff => "runoff",
            Self::Initial => "initial",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 阶段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// 等待中
    Pending,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已跳过
    Skipped,
}

impl StageStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        };
        write!(f, "{}", s)
    }
}

/// 阶段任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageJob {
    /// ID
    pub id: StageId,
    /// 类型
    pub kind: StageKind,
    /// 处理日期
    pub date: ForecastDate,
    /// 状态
    pub status: StageStatus,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub completed_at: Option<DateTime<Utc>>,
    /// 产物
    pub outputs: Vec<PathBuf>,
    /// 错误信息
    pub error: Option<String>,
}

impl StageJob {
    /// 新任务
    pub fn new(kind: StageKind, date: ForecastDate) -> Self {
        Self {
            id: StageId::new(),
            kind,
            date,
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            outputs: Vec::new(),
            error: None,
        }
    }

    /// 标记开始
    pub fn mark_started(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// 标记完成
    pub fn mark_completed(&mut self, outputs: Vec<PathBuf>) {
        self.status = StageStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.outputs = outputs;
    }

    /// 标记失败
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// 标记跳过
    pub fn mark_skipped(&mut self) {
        self.status = StageStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }

    /// 运行时长
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| {
            let end = self.completed_at.unwrap_or_else(Utc::now);
            end - start
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id() {
        let a = StageId::new();
        assert_ne!(a, StageId::new());
        let parsed: StageId = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn test_stage_lifecycle() {
        let date = ForecastDate::parse("20250701").unwrap();
        let mut job = StageJob::new(StageKind::Boundary, date);
        assert_eq!(job.status, StageStatus::Pending);
        assert!(job.elapsed().is_none());

        job.mark_started();
        assert!(!job.status.is_terminal());
        job.mark_completed(vec![PathBuf::from("/f/a.nc")]);
        assert!(job.status.is_terminal());
        assert_eq!(job.outputs.len(), 1);
        assert!(job.elapsed().is_some());

        let mut failed = StageJob::new(StageKind::Increment, date);
        failed.mark_failed("缺少 EOF 文件");
        assert_eq!(failed.status, StageStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("缺少 EOF 文件"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&StageStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        assert_eq!(StageKind::Model.to_string(), "model");
    }
}
