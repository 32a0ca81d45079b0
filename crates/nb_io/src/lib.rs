// crates/nb_io/src/lib.rs

//! NEMO Baltic IO 模块
//!
//! 网格数据集模型与文件读写。
//!
//! # 模块
//!
//! - [`dataset`]: Dataset / Variable / AttrValue（ndarray 存储）
//! - [`axes`]: 坐标轴别名表
//! - [`time`]: CF 时间解码与按日分组
//! - [`store`]: DatasetStore trait、MemoryStore
//! - [`drivers`]: NetCDF 驱动 (NetCdfStore)
//!
//! # 可选依赖
//!
//! - `netcdf`: 启用 NetCDF 驱动
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use nb_io::{DatasetStore, NetCdfStore, WriteOptions};
//!
//! let store = NetCdfStore::new();
//! let ds = store.read(Path::new("bc_est_20250701_remap.nc"))?;
//! store.write(Path::new("out.nc"), &ds, &WriteOptions::compressed(1, true))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod axes;
pub mod dataset;
pub mod drivers;
pub mod store;
pub mod time;

// 重导出常用类型
pub use dataset::{
    AttrValue, Attributes, DataType, Dataset, Dimension, Variable, FILL_VALUE_ATTR,
    MISSING_VALUE_ATTR,
};
pub use drivers::{NetCdfError, NetCdfStore};
pub use store::{DatasetStore, MemoryStore, WriteOptions};
pub use time::{decode_time_variable, indices_for_day, CfTimeUnits, TimeUnit};
