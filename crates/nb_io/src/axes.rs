// crates/nb_io/src/axes.rs

//! 坐标轴别名
//!
//! 不同产品对同一坐标使用不同名称（CMEMS: `latitude`，NEMO: `nav_lat`，
//! CDO 输出: `lat`）。这里集中别名表和按名称解析轴的函数。

use crate::dataset::{Dataset, Variable};

/// 纬度变量别名
pub const LAT_NAMES: &[&str] = &["lat", "latitude", "nav_lat", "y"];
/// 经度变量别名
pub const LON_NAMES: &[&str] = &["lon", "longitude", "nav_lon", "x"];
/// 深度变量/维度别名
pub const DEPTH_NAMES: &[&str] = &["depth", "deptht", "z", "lev"];
/// 时间维度别名
pub const TIME_NAMES: &[&str] = &["time", "time_counter", "t"];
/// 经度轴（维度名）别名
pub const LON_DIM_NAMES: &[&str] = &["lon", "longitude", "x"];

/// 第一个在变量维度中出现的别名
pub fn find_dim<'a>(var: &Variable, aliases: &[&'a str]) -> Option<&'a str> {
    aliases.iter().copied().find(|a| var.axis_of(a).is_some())
}

/// 第一个在变量维度中出现的别名所在轴
pub fn find_axis(var: &Variable, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|a| var.axis_of(a))
}

/// 数据集中第一个存在的纬度变量
pub fn latitude(ds: &Dataset) -> Option<&Variable> {
    ds.find_variable(LAT_NAMES)
}

/// 数据集中第一个存在的经度变量
pub fn longitude(ds: &Dataset) -> Option<&Variable> {
    ds.find_variable(LON_NAMES)
}

/// 数据集中第一个存在的时间维度名
pub fn time_dim(ds: &Dataset) -> Option<&'static str> {
    TIME_NAMES
        .iter()
        .copied()
        .find(|n| ds.dimension(n).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_find_axis() {
        let v = Variable::new(
            "thetao",
            &["time", "deptht", "y", "x"],
            ArrayD::zeros(IxDyn(&[1, 2, 3, 4])),
        )
        .unwrap();
        assert_eq!(find_axis(&v, DEPTH_NAMES), Some(1));
        assert_eq!(find_dim(&v, LON_DIM_NAMES), Some("x"));
        assert_eq!(find_axis(&v, &["lev"]), None);
    }

    #[test]
    fn test_dataset_lookup() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::from_vec("nav_lat", "y", vec![57.0, 58.0]))
            .unwrap();
        ds.add_variable(Variable::from_vec("time_counter", "time_counter", vec![0.0]))
            .unwrap();
        assert_eq!(latitude(&ds).map(|v| v.name()), Some("nav_lat"));
        assert!(longitude(&ds).is_none());
        assert_eq!(time_dim(&ds), Some("time_counter"));
    }
}
