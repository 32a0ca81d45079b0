// crates/nb_io/src/drivers/netcdf/mod.rs

//! NetCDF 驱动模块
//!
//! 读写 NEMO/CMEMS 网格文件。
//!
//! # 功能
//!
//! - 读取维度、变量和属性
//! - CF 约定解码：`_FillValue` / `missing_value` 转 NaN，`scale_factor` / `add_offset`
//! - NetCDF4-classic 写出，可选 zlib 压缩，临时名写完后改名
//!
//! # 依赖
//!
//! 需要启用 `netcdf` feature 并安装 NetCDF 库。未启用时所有操作返回
//! [`NetCdfError::NotAvailable`]。

mod driver;
mod error;

pub use driver::*;
pub use error::*;
