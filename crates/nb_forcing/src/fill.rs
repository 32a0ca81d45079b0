// crates/nb_forcing/src/fill.rs

//! 最近邻缺测填补
//!
//! 对单个二维切片，每个缺测格点取欧氏距离最近的有效格点的值。
//! 最近点由精确的可分离特征变换求出：先沿列方向求每行内的最近有效列，
//! 再沿行方向对抛物线下包络求最小值。
//!
//! # 平局规则
//!
//! 距离相同时取行号最小者，行号相同再取列号最小者。结果完全确定。
//!
//! # 边界情形
//!
//! - 没有缺测：原样返回
//! - 全部缺测：原样返回（定义为空操作）

use ndarray::{Array2, ArrayView2};

use nb_foundation::{NbError, NbResult};
use nb_io::Variable;

/// 一维平方距离变换，返回每个位置的最近站点索引
///
/// `cost[c]` 为站点 c 的附加代价（None 表示无站点）。
/// 最小化 `(x - c)^2 + cost[c]`，平局取较小的 c。
fn lower_envelope(cost: &[Option<f64>], out: &mut [Option<usize>]) {
    let n = cost.len();
    let mut v: Vec<usize> = Vec::with_capacity(n);
    let mut z: Vec<f64> = Vec::with_capacity(n + 1);

    let parabola = |c: usize| cost[c].map(|f| f + (c * c) as f64);

    for q in 0..n {
        let Some(fq) = parabola(q) else { continue };
        if v.is_empty() {
            v.push(q);
            z.push(f64::NEG_INFINITY);
            continue;
        }
        loop {
            let p = v[v.len() - 1];
            let fp = parabola(p).unwrap_or(f64::INFINITY);
            let s = (fq - fp) / (2.0 * (q as f64 - p as f64));
            if s <= z[z.len() - 1] && v.len() > 1 {
                v.pop();
                z.pop();
            } else {
                v.push(q);
                z.push(s);
                break;
            }
        }
    }

    if v.is_empty() {
        out.iter_mut().for_each(|o| *o = None);
        return;
    }

    let mut k = 0;
    for (x, o) in out.iter_mut().enumerate() {
        while k + 1 < v.len() && z[k + 1] < x as f64 {
            k += 1;
        }
        *o = Some(v[k]);
    }
}

/// 每个格点最近有效格点的 (行, 列)；没有任何有效格点时返回 None
pub fn nearest_valid_indices(valid: ArrayView2<'_, bool>) -> Option<Array2<(usize, usize)>> {
    let (ny, nx) = valid.dim();
    if !valid.iter().any(|&v| v) {
        return None;
    }

    // 第一遍：每行内最近有效列
    let mut nearest_col: Array2<Option<usize>> = Array2::from_elem((ny, nx), None);
    let mut cost = vec![None; nx];
    let mut out = vec![None; nx];
    for i in 0..ny {
        for j in 0..nx {
            cost[j] = if valid[[i, j]] { Some(0.0) } else { None };
        }
        lower_envelope(&cost, &mut out);
        for j in 0..nx {
            nearest_col[[i, j]] = out[j];
        }
    }

    // 第二遍：沿行方向，代价为该行内到最近有效列的平方距离
    let mut result = Array2::from_elem((ny, nx), (0usize, 0usize));
    let mut cost = vec![None; ny];
    let mut out = vec![None; ny];
    for j in 0..nx {
        for i in 0..ny {
            cost[i] = nearest_col[[i, j]].map(|c| {
                let d = c as f64 - j as f64;
                d * d
            });
        }
        lower_envelope(&cost, &mut out);
        for i in 0..ny {
            if let Some(r) = out[i] {
                if let Some(c) = nearest_col[[r, j]] {
                    result[[i, j]] = (r, c);
                }
            }
        }
    }
    Some(result)
}

/// 填补二维场中的 NaN
pub fn fill_nearest(field: ArrayView2<'_, f64>) -> Array2<f64> {
    if !field.iter().any(|v| v.is_nan()) {
        return field.to_owned();
    }
    let valid = field.mapv(|v| !v.is_nan());
    match nearest_valid_indices(valid.view()) {
        Some(idx) => idx.mapv(|(r, c)| field[[r, c]]),
        None => field.to_owned(),
    }
}

/// 填补变量：先去掉长度为 1 的维，结果必须是二维
pub fn fill_variable(var: &Variable) -> NbResult<Variable> {
    let squeezed = var.squeeze();
    NbError::check_rank(var.name(), 2, squeezed.ndim())?;
    let field = squeezed
        .data()
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|e| NbError::schema(format!("{}: {}", var.name(), e)))?
        .to_owned();
    let filled = fill_nearest(field.view());
    squeezed.with_data(filled.into_dyn())
}
