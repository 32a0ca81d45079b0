// crates/nb_foundation/src/lib.rs

//! NEMO Baltic Foundation Layer
//!
//! 基础层，提供整个流水线共用的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型与错误分类
//! - [`date`]: 预报日期、日期窗口以及日期标签约定
//!
//! # 示例
//!
//! ```
//! use nb_foundation::{
//!     date::{DateWindow, ForecastDate},
//!     error::NbResult,
//! };
//!
//! fn window() -> NbResult<DateWindow> {
//!     let start = ForecastDate::parse("20250701")?;
//!     DateWindow::new(start, 5)
//! }
//!
//! assert_eq!(window().unwrap().end().compact(), "20250706");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod date;
pub mod error;

// 重导出常用类型
pub use date::{DateWindow, ForecastDate, ANALYSIS_TIME_SUFFIX, INCREMENT_DATEF, NEXT_DATE_SUFFIX};
pub use error::{ErrorCategory, NbError, NbResult};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::date::{DateWindow, ForecastDate};
    pub use crate::ensure;
    pub use crate::error::{ErrorCategory, NbError, NbResult};
}
