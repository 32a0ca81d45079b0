// crates/nb_forcing/src/lib.rs

//! NEMO Baltic 强迫场构建
//!
//! 每个构建器只负责自己写出的带日期文件，重复运行同一日期时确定性地覆盖。
//!
//! # 模块
//!
//! - [`context`]: 共享上下文（配置、布局、存储、外部委托）
//! - [`fill`]: 二维最近邻缺测填补（精确欧氏距离变换）
//! - [`increment`]: 同化增量与 DI 背景场
//! - [`boundary`]: 开边界日文件
//! - [`vertical`]: 固定垂向层与线性插值
//! - [`teos10`]: 实用盐度/位温 → 绝对盐度/保守温度
//! - [`runoff`]: 径流温度
//! - [`initial`]: 冷启动初始温盐场
//!
//! # 流程
//!
//! ```text
//! fetch ─► remap ─┬─► increment (SLA | EOF - model) ─► assim/*.nc
//!                 ├─► boundary 2D/3D ─► split ─► TEOS-10
//!                 └─► initial (vertical)
//! meteo t2 ─► mean ─► remap ─► rotemp
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod context;
pub mod fill;
pub mod increment;
pub mod initial;
pub mod runoff;
pub mod teos10;
pub mod vertical;

pub use boundary::{BoundaryComposer, BoundaryProducts};
pub use context::ForcingContext;
pub use fill::{fill_nearest, fill_variable};
pub use increment::{
    DirectInitState, IncrementBuilder, IncrementFile, IncrementMode, IncrementTags, NavCoordinates,
};
pub use initial::InitialStateBuilder;
pub use runoff::RunoffBuilder;
pub use teos10::Teos10Options;
pub use vertical::{BOUNDARY_LEVELS, INITIAL_LEVELS};
