// crates/nb_tools/src/lib.rs

//! NEMO Baltic 外部工具层
//!
//! 流水线把 CDO、Copernicus Marine Toolbox、Slurm 和 rsync 当作黑盒，
//! 以固定的参数模板同步调用。本 crate 为每个工具提供窄接口。
//!
//! # 模块
//!
//! - [`process`]: ToolCommand / CommandRunner / ToolOutcome（成功判据）
//! - [`remap`]: Remapper trait 与 CDO 实现
//! - [`fetch`]: MarineCatalog trait 与 copernicusmarine 实现
//! - [`batch`]: sbatch 作业提交
//! - [`sync`]: rsync 归档上传

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod fetch;
pub mod process;
pub mod remap;
pub mod sync;

pub use batch::{BatchJob, BatchScheduler};
pub use fetch::{call_sites, BoundingBox, CopernicusMarineCli, MarineCatalog, Range, SubsetRequest};
pub use process::{
    clear_stale_output, CommandRunner, OutcomeStatus, RecordingRunner, SystemRunner, ToolCommand,
    ToolOutcome,
};
pub use remap::{CdoRemapper, MissingPolicy, RemapRequest, Remapper};
pub use sync::{RemoteSync, RemoteTarget};
