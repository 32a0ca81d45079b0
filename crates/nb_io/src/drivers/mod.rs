// crates/nb_io/src/drivers/mod.rs

//! 数据驱动模块
//!
//! 提供读写网格文件格式的驱动程序。

pub mod netcdf;

// 重导出
pub use self::netcdf::{NetCdfError, NetCdfStore};
