// crates/nb_workflow/src/driver.rs

//! 顶层运行驱动
//!
//! 一次业务运行依次执行：同化增量 → 冷启动初始场（仅冷启动日）→ 开边界 →
//! 径流温度 → 模式运行。处理日期为请求日期的前一天（spin-up 偏移）。
//!
//! 同化增量失败只记录警告，其余阶段失败即终止运行。
//! 每个阶段记录为 [`StageJob`]，状态变化以 [`PipelineEvent`] 分发。

use std::path::PathBuf;
use std::sync::Arc;

use crate::events::{EventDispatcher, EventListener, LoggingListener, PipelineEvent};
use crate::job::{StageJob, StageKind, StageStatus};
use crate::model_run::ModelRunner;
use nb_config::PipelineConfig;
use nb_forcing::{
    BoundaryComposer, ForcingContext, IncrementBuilder, IncrementMode, InitialStateBuilder,
    RunoffBuilder, Teos10Options,
};
use nb_foundation::{DateWindow, ForecastDate, NbResult};
use nb_tools::CommandRunner;

/// 运行请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    /// 请求日期（处理日期为其前一天）
    pub date: ForecastDate,
    /// 预报天数
    pub ndays: u32,
    /// 增量模式；None 时按处理日期是否为冷启动日自动选择
    pub mode: Option<IncrementMode>,
}

impl RunRequest {
    /// 创建
    pub fn new(date: ForecastDate, ndays: u32) -> Self {
        Self {
            date,
            ndays,
            mode: None,
        }
    }

    /// 指定增量模式
    pub fn with_mode(mut self, mode: IncrementMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// 处理日期
    pub fn processing_date(&self) -> ForecastDate {
        self.date.previous()
    }
}

/// 运行结果
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 处理日期
    pub date: ForecastDate,
    /// 预报天数
    pub ndays: u32,
    /// 各阶段记录
    pub stages: Vec<StageJob>,
}

impl RunSummary {
    /// 查找阶段
    pub fn stage(&self, kind: StageKind) -> Option<&StageJob> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// 失败的非致命阶段
    pub fn warnings(&self) -> impl Iterator<Item = &StageJob> {
        self.stages.iter().filter(|s| s.status == StageStatus::Failed)
    }
}

/// 顶层运行驱动
pub struct PipelineDriver {
    config: Arc<PipelineConfig>,
    ctx: ForcingContext,
    runner: Arc<dyn CommandRunner>,
    dispatcher: EventDispatcher,
    teos: Teos10Options,
    today: ForecastDate,
}

impl PipelineDriver {
    /// 创建，默认注册日志监听器
    pub fn new(
        config: Arc<PipelineConfig>,
        ctx: ForcingContext,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        dispatcher.add_listener(Arc::new(LoggingListener::new("pipeline")));
        Self {
            config,
            ctx,
            runner,
            dispatcher,
            teos: Teos10Options::default(),
            today: ForecastDate::today(),
        }
    }

    /// 覆盖「今天」（决定模式运行长度）
    pub fn with_today(mut self, today: ForecastDate) -> Self {
        self.today = today;
        self
    }

    /// TEOS-10 缺省经纬度
    pub fn with_teos10(mut self, options: Teos10Options) -> Self {
        self.teos = options;
        self
    }

    /// 注册监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.dispatcher.add_listener(listener);
    }

    /// 事件分发器
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// 执行整次运行
    pub fn run(&self, request: &RunRequest) -> NbResult<RunSummary> {
        let date = request.processing_date();
        tracing::info!("处理日期 {} (请求日期 {})", date, request.date);
        let window = DateWindow::new(date, request.ndays)?;
        self.dispatcher.emit(PipelineEvent::RunStarted {
            date,
            ndays: request.ndays,
        });

        let mut stages = Vec::new();
        let result = self.run_stages(date, &window, request.mode, &mut stages);
        self.dispatcher.emit(PipelineEvent::RunFinished {
            success: result.is_ok(),
        });
        result.map(|_| RunSummary {
            date,
            ndays: request.ndays,
            stages,
        })
    }

    fn run_stages(
        &self,
        date: ForecastDate,
        window: &DateWindow,
        mode: Option<IncrementMode>,
        stages: &mut Vec<StageJob>,
    ) -> NbResult<()> {
        let cold = date == self.config.model.cold_start_date;
        let mode = mode.unwrap_or(if cold {
            IncrementMode::ColdStart
        } else {
            IncrementMode::Operational
        });

        self.run_stage(StageKind::Increment, date, false, stages, || {
            IncrementBuilder::new(&self.ctx)
                .build(&date, mode)
                .map(|p| vec![p])
        })?;

        if cold {
            self.run_stage(StageKind::Initial, date, true, stages, || {
                InitialStateBuilder::new(&self.ctx)
                    .build(&date)
                    .map(|p| vec![p])
            })?;
        } else {
            self.skip_stage(StageKind::Initial, date, stages);
        }

        self.run_stage(StageKind::Boundary, date, true, stages, || {
            let products = BoundaryComposer::new(&self.ctx)
                .with_teos10(self.teos)
                .run(window)?;
            Ok(products
                .surface
                .into_iter()
                .chain(products.profile)
                .chain(products.teos10)
                .collect())
        })?;

        self.run_stage(StageKind::Runoff, date, true, stages, || {
            RunoffBuilder::new(&self.ctx).build(&date).map(|p| vec![p])
        })?;

        self.run_stage(StageKind::Model, date, true, stages, || {
            ModelRunner::with_today(
                self.config.clone(),
                *window,
                self.runner.clone(),
                self.today,
            )?
            .full_run()
        })
    }

    fn run_stage<F>(
        &self,
        kind: StageKind,
        date: ForecastDate,
        fatal: bool,
        stages: &mut Vec<StageJob>,
        body: F,
    ) -> NbResult<()>
    where
        F: FnOnce() -> NbResult<Vec<PathBuf>>,
    {
        let mut job = StageJob::new(kind, date);
        job.mark_started();
        self.dispatcher.emit(PipelineEvent::StageStatusChanged {
            stage_id: job.id,
            old_status: StageStatus::Pending,
            new_status: StageStatus::Running,
        });
        self.dispatcher.emit(PipelineEvent::StageStarted {
            stage_id: job.id,
            kind,
        });

        let result = body();
        let outcome = match result {
            Ok(outputs) => {
                job.mark_completed(outputs.clone());
                let duration_secs = job
                    .elapsed()
                    .map(|d| d.num_milliseconds() as f64 / 1000.0)
                    .unwrap_or(0.0);
                self.dispatcher.emit(PipelineEvent::StageCompleted {
                    stage_id: job.id,
                    kind,
                    duration_secs,
                    outputs,
                });
                Ok(())
            }
            Err(e) => {
                job.mark_failed(e.to_string());
                self.dispatcher.emit(PipelineEvent::StageFailed {
                    stage_id: job.id,
                    kind,
                    error: e.to_string(),
                    fatal,
                });
                if fatal {
                    Err(e)
                } else {
                    Ok(())
                }
            }
        };
        self.dispatcher.emit(PipelineEvent::StageStatusChanged {
            stage_id: job.id,
            old_status: StageStatus::Running,
            new_status: job.status,
        });
        stages.push(job);
        outcome
    }

    fn skip_stage(&self, kind: StageKind, date: ForecastDate, stages: &mut Vec<StageJob>) {
        let mut job = StageJob::new(kind, date);
        job.mark_skipped();
        self.dispatcher.emit(PipelineEvent::StageStatusChanged {
            stage_id: job.id,
            old_status: StageStatus::Pending,
            new_status: StageStatus::Skipped,
        });
        stages.push(job);
    }
}

impl std::fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("ctx", &self.ctx)
            .field("dispatcher", &self.dispatcher)
            .field("today", &self.today)
            .finish()
    }
}
