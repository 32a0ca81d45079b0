// crates/nb_forcing/src/vertical.rs

//! 垂向插值
//!
//! 把剖面变量从源深度层线性插值到模式的固定层。
//! 源深度范围以外取最近的端层值（不外推）。
//! 相邻两层中一层缺测时取另一层；两层都缺测时结果为 NaN。
//!
//! 注意：这两条规则与 CDO `intlevel` 的缺省行为不同。`intlevel` 对源范围以外的
//! 目标层以及相邻层有缺测的目标层都给缺测值。此处的做法让浅水边界点的深层
//! 取最底有效层的值，而不是 NaN。

use ndarray::{ArrayD, Axis, IxDyn};

use nb_foundation::{NbError, NbResult};
use nb_io::Variable;

// ============================================================
// 固定垂向层
// ============================================================

/// 开边界 3D 文件的 110 层深度轴 [m]
///
/// 最后 8 层在模式最大深度 114 m 处重复。
pub const BOUNDARY_LEVELS: [f64; 110] = [
    1.51, 1.52, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5, 10.5, 11.5, 12.5, 13.5, 14.5, 15.5,
    16.5, 17.5, 18.5, 19.5, 20.5, 21.5, 22.5, 23.5, 24.5, 25.5, 26.5, 27.5, 28.5, 29.5, 30.5,
    31.5, 32.5, 33.5, 34.5, 35.5, 36.5, 37.5, 38.5, 39.5, 40.5, 41.5, 42.5, 43.5, 44.5, 45.5,
    46.5, 47.5, 48.5, 49.5, 50.5, 51.5, 52.5, 53.5, 54.5, 55.5, 56.5, 57.5, 58.5, 59.5, 60.5,
    61.5, 62.5, 63.5, 64.5, 65.5, 66.5, 67.5, 68.5, 69.5, 70.5, 71.5, 72.5, 73.5, 74.5, 75.5,
    76.5, 77.5, 78.5, 79.5, 80.5, 81.5, 82.5, 83.5, 84.5, 85.5, 86.5, 87.5, 88.5, 89.50001,
    90.50003, 91.50011, 92.5004, 93.50152, 94.50575, 95.52176, 96.5815, 97.7951, 99.46341,
    102.0134, 105.4451, 109.3315, 114.0, 114.0, 114.0, 114.0, 114.0, 114.0, 114.0, 114.0,
];

/// 冷启动初始场的 110 层深度轴 [m]
pub const INITIAL_LEVELS: [f64; 110] = [
    1.51, 1.52, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5, 10.5, 11.5, 12.5, 13.5, 14.5, 15.5,
    16.5, 17.5, 18.5, 19.5, 20.5, 21.5, 22.5, 23.5, 24.5, 25.5, 26.5, 27.5, 28.5, 29.5, 30.5,
    31.5, 32.5, 33.5, 34.5, 35.5, 36.5, 37.5, 38.5, 39.5, 40.5, 41.5, 42.5, 43.5, 44.5, 45.5,
    46.5, 47.5, 48.5, 49.5, 50.5, 51.5, 52.5, 53.5, 54.5, 55.5, 56.5, 57.5, 58.5, 59.5, 60.5,
    61.5, 62.5, 63.5, 64.5, 65.5, 66.5, 67.5, 68.5, 69.5, 70.5, 71.5, 72.5, 73.5, 74.5, 75.5,
    76.5, 77.5, 78.5, 79.5, 80.5, 81.5, 82.5, 83.5, 84.5, 85.5, 86.5, 87.5, 88.5, 89.5, 90.5,
    91.5, 92.5, 93.5, 94.5, 95.5, 96.6, 97.8, 99.5, 102.0, 105.4, 109.3, 113.4, 117.5, 121.1,
    121.2, 121.2, 121.3, 121.4, 121.5,
];

// ============================================================
// 插值权重
// ============================================================

/// 单个目标层的插值权重：`value = (1-w)·src[lower] + w·src[upper]`
#[derive(Debug, Clone, Copy, PartialEq)]
struct LevelWeight {
    lower: usize,
    upper: usize,
    w: f64,
}

/// 计算目标层在源层上的权重，源层必须严格递增
fn level_weights(source: &[f64], target: &[f64]) -> NbResult<Vec<LevelWeight>> {
    if source.is_empty() {
        return Err(NbError::schema("源深度轴为空"));
    }
    if source.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(NbError::schema(format!(
            "源深度轴必须严格递增: {:?}",
            source
        )));
    }

    let last = source.len() - 1;
    let weights = target
        .iter()
        .map(|&z| {
            if z <= source[0] {
                return LevelWeight { lower: 0, upper: 0, w: 0.0 };
            }
            if z >= source[last] {
                return LevelWeight { lower: last, upper: last, w: 0.0 };
            }
            // source[k] < z <= source[k+1]
            let k = source.partition_point(|&s| s < z) - 1;
            let (z0, z1) = (source[k], source[k + 1]);
            LevelWeight {
                lower: k,
                upper: k + 1,
                w: (z - z0) / (z1 - z0),
            }
        })
        .collect();
    Ok(weights)
}

fn blend(a: f64, b: f64, w: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a + w * (b - a),
        (true, false) => b,
        (false, true) => a,
        (true, true) => f64::NAN,
    }
}

// ============================================================
// 对外接口
// ============================================================

/// 沿 `depth_dim` 把变量插值到 `target` 层
///
/// 变量的其余维度和属性不变，深度维长度变为 `target.len()`。
pub fn interpolate_levels(
    var: &Variable,
    depth_dim: &str,
    source_levels: &[f64],
    target: &[f64],
) -> NbResult<Variable> {
    let axis = var.axis_of(depth_dim).ok_or_else(|| {
        NbError::schema(format!(
            "变量 {} 没有深度维 {} (维度: {:?})",
            var.name(),
            depth_dim,
            var.dims()
        ))
    })?;
    let nz = var.shape()[axis];
    if nz != source_levels.len() {
        return Err(NbError::shape_mismatch(
            format!("{}.{}", var.name(), depth_dim),
            &[source_levels.len()],
            &[nz],
        ));
    }

    let weights = level_weights(source_levels, target)?;

    let mut shape = var.shape().to_vec();
    shape[axis] = target.len();
    let mut out = ArrayD::<f64>::from_elem(IxDyn(&shape), f64::NAN);

    let data = var.data();
    for (k, lw) in weights.iter().enumerate() {
        let lower = data.index_axis(Axis(axis), lw.lower);
        let upper = data.index_axis(Axis(axis), lw.upper);
        let mut dst = out.index_axis_mut(Axis(axis), k);
        ndarray::Zip::from(&mut dst)
            .and(&lower)
            .and(&upper)
            .for_each(|d, &a, &b| *d = blend(a, b, lw.w));
    }

    let mut result = Variable::from_owned_dims(var.name(), var.dims().to_vec(), out)?
        .with_dtype(var.dtype());
    for (k, v) in var.attrs() {
        result.set_attr(k.clone(), v.clone());
    }
    Ok(result)
}

/// 目标层坐标变量
pub fn level_coordinate(name: &str, levels: &[f64]) -> Variable {
    Variable::from_vec(name, name, levels.to_vec())
        .with_attr("units", "m")
        .with_attr("positive", "down")
        .with_attr("axis", "Z")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(values: Vec<f64>) -> Variable {
        let n = values.len();
        let data = ArrayD::from_shape_vec(IxDyn(&[1, n, 1]), values).unwrap();
        Variable::new("thetao", &["time", "depth", "x"], data)
            .unwrap()
            .with_attr("units", "degC")
    }

    #[test]
    fn test_level_tables() {
        assert_eq!(BOUNDARY_LEVELS.len(), 110);
        assert_eq!(INITIAL_LEVELS.len(), 110);
        assert!(BOUNDARY_LEVELS.windows(2).all(|w| w[1] >= w[0]));
        assert!(INITIAL_LEVELS.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(BOUNDARY_LEVELS[109], 114.0);
        assert_eq!(INITIAL_LEVELS[109], 121.5);
    }

    #[test]
    fn test_linear_interpolation() {
        let v = profile(vec![10.0, 20.0, 40.0]);
        let out = interpolate_levels(&v, "depth", &[0.0, 10.0, 20.0], &[5.0, 10.0, 15.0]).unwrap();
        assert_eq!(out.shape(), &[1, 3, 1]);
        let vals = out.to_vec();
        assert!((vals[0] - 15.0).abs() < 1e-12);
        assert!((vals[1] - 20.0).abs() < 1e-12);
        assert!((vals[2] - 30.0).abs() < 1e-12);
        assert_eq!(out.attr_text("units"), Some("degC"));
    }

    #[test]
    fn test_outside_range_uses_nearest_level() {
        let v = profile(vec![10.0, 20.0]);
        let out = interpolate_levels(&v, "depth", &[2.0, 8.0], &[0.5, 100.0]).unwrap();
        assert_eq!(out.to_vec(), vec![10.0, 20.0]);
    }

    #[test]
    fn test_missing_neighbour() {
        let v = profile(vec![10.0, f64::NAN, f64::NAN]);
        let out = interpolate_levels(&v, "depth", &[0.0, 10.0, 20.0], &[5.0, 15.0]).unwrap();
        let vals = out.to_vec();
        assert_eq!(vals[0], 10.0);
        assert!(vals[1].is_nan());
    }

    #[test]
    fn test_rejects_bad_axis() {
        let v = profile(vec![1.0, 2.0]);
        assert!(interpolate_levels(&v, "depth", &[5.0, 1.0], &[2.0]).is_err());
        assert!(interpolate_levels(&v, "depth", &[1.0, 2.0, 3.0], &[2.0]).is_err());
        assert!(interpolate_levels(&v, "deptht", &[1.0, 2.0], &[2.0]).is_err());
    }

    #[test]
    fn test_weights_exact_hit() {
        let w = level_weights(&[1.0, 2.0, 3.0], &[2.0]).unwrap();
        let value = blend(5.0, 7.0, w[0].w);
        assert_eq!(w[0].lower, 0);
        assert_eq!(value, 7.0);
    }
}
