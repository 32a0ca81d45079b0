// crates/nb_workflow/src/lib.rs

//! NEMO Baltic 流水线编排
//!
//! - [`job`]: 阶段任务与状态
//! - [`events`]: 阶段事件与监听器
//! - [`model_run`]: 模式运行驱动（运行目录、namelist、链接、提交、上传）
//! - [`driver`]: 顶层每日运行驱动

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod events;
pub mod job;
pub mod model_run;

pub use driver::{PipelineDriver, RunRequest, RunSummary};
pub use events::{EventDispatcher, EventListener, FnListener, LoggingListener, PipelineEvent};
pub use job::{StageId, StageJob, StageKind, StageStatus};
pub use model_run::{ModelRunner, RunSettings};
