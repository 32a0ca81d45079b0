// crates/nb_forcing/src/runoff.rs

//! 径流温度强迫
//!
//! 河流入海水温取前几日 2 m 气温的平均：
//!
//! 1. 对 `d = 1..=lookback` 的每个前序日，存在的 ECMWF 气象文件取 `t2` 时间平均；
//!    缺失的日期记录后跳过
//! 2. 一个都没有时退回当日文件，当日也缺失则 `FileNotFound`
//! 3. 各日平均再做时间平均，双线性重映射到模式网格
//! 4. `rotemp = t2 - 274.15`（`t2 >= 274.15`），否则 0.10 °C
//!
//! 中间文件放在按日期区分的工作目录中，阶段结束后删除。

use ndarray::{ArrayD, Axis, IxDyn};
use std::path::{Path, PathBuf};

use crate::context::ForcingContext;
use nb_foundation::{ForecastDate, NbError, NbResult};
use nb_io::axes::{time_dim, LAT_NAMES, LON_NAMES};
use nb_io::{Dataset, Variable, WriteOptions};
use nb_tools::{MissingPolicy, RemapRequest};

/// 气象文件中的气温变量
pub const T2_VAR: &str = "t2";
/// 输出变量
pub const ROTEMP_VAR: &str = "rotemp";
/// 阈值温度 (K)
pub const FREEZING_K: f64 = 274.15;
/// 低于阈值时的径流温度 (°C)
pub const COLD_RIVER_TEMP: f64 = 0.10;

/// 径流文件写出选项（zlib 1 级）
pub fn runoff_write_options() -> WriteOptions {
    WriteOptions::compressed(1, false)
}

/// 单个格点的径流温度；缺测保持缺测
pub fn river_temperature(t2: f64) -> f64 {
    if t2.is_nan() {
        f64::NAN
    } else if t2 >= FREEZING_K {
        t2 - FREEZING_K
    } else {
        COLD_RIVER_TEMP
    }
}

/// 沿某轴的 NaN 忽略平均；整条全缺测时为 NaN
fn nan_mean_axis(data: &ArrayD<f64>, axis: usize) -> ArrayD<f64> {
    data.map_axis(Axis(axis), |lane| {
        let (sum, n) = lane
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    })
}

/// 一个气象文件的 `t2` 时间平均，时间维被移除
pub fn daily_mean(ds: &Dataset) -> NbResult<Variable> {
    let t2 = ds.require(T2_VAR)?;
    let Some(tdim) = time_dim(ds).filter(|d| t2.axis_of(d).is_some()) else {
        return Ok(t2.clone());
    };
    let axis = t2.axis_of(tdim).unwrap_or(0);
    let mut dims = t2.dims().to_vec();
    dims.remove(axis);
    let mean = nan_mean_axis(&t2.data().to_owned(), axis);
    let mut out = Variable::from_owned_dims(T2_VAR, dims, mean)?;
    if let Some(units) = t2.attr_text("units") {
        out.set_attr("units", units);
    }
    Ok(out)
}

/// 多个日平均再平均，形状必须一致
pub fn mean_of_means(means: &[Variable]) -> NbResult<Variable> {
    let first = means
        .first()
        .ok_or_else(|| NbError::internal("没有可平均的 t2 场"))?;
    let mut views = Vec::with_capacity(means.len());
    for m in means {
        NbError::check_shape(T2_VAR, first.shape(), m.shape())?;
        views.push(m.data().insert_axis(Axis(0)));
    }
    let stacked = ndarray::concatenate(Axis(0), &views)
        .map_err(|e| NbError::internal(format!("合并 t2 日平均失败: {}", e)))?;
    first.clone().with_data(nan_mean_axis(&stacked, 0))
}

/// 径流温度构建器
#[derive(Debug)]
pub struct RunoffBuilder<'a> {
    ctx: &'a ForcingContext,
}

impl<'a> RunoffBuilder<'a> {
    /// 创建
    pub fn new(ctx: &'a ForcingContext) -> Self {
        Self { ctx }
    }

    /// 使用配置中的回溯天数构建
    pub fn build(&self, date: &ForecastDate) -> NbResult<PathBuf> {
        self.build_with_lookback(date, self.ctx.config().runoff.lookback_days)
    }

    /// 参与平均的气象文件：前序存在的日期，全缺时退回当日
    pub fn select_inputs(&self, date: &ForecastDate, lookback: u32) -> NbResult<Vec<PathBuf>> {
        let layout = self.ctx.layout();
        let store = self.ctx.store();
        let mut inputs = Vec::new();
        for d in 1..=lookback as i64 {
            let path = layout.meteo_file(&date.offset_days(-d));
            if store.exists(&path) {
                tracing::info!("使用气象文件: {}", path.display());
                inputs.push(path);
            } else {
                tracing::warn!("气象文件缺失: {}", path.display());
            }
        }
        if inputs.is_empty() {
            let fallback = layout.meteo_file(date);
            if !store.exists(&fallback) {
                return Err(NbError::file_not_found(fallback));
            }
            tracing::warn!("回溯期内无气象文件，退回当日: {}", fallback.display());
            inputs.push(fallback);
        }
        Ok(inputs)
    }

    /// 构建 `river_data_t_y<Y>m<M>d<D>.nc`
    pub fn build_with_lookback(&self, date: &ForecastDate, lookback: u32) -> NbResult<PathBuf> {
        tracing::info!("==== 径流温度 {} (回溯 {} 天) ====", date, lookback);
        let layout = self.ctx.layout();
        let store = self.ctx.store();
        let bathy = layout.bathy();
        if !store.exists(&bathy) {
            return Err(NbError::file_not_found(bathy));
        }

        let inputs = self.select_inputs(date, lookback)?;
        let mut means = Vec::with_capacity(inputs.len());
        let mut template: Option<Dataset> = None;
        for path in &inputs {
            let ds = store.read(path)?;
            means.push(daily_mean(&ds)?);
            template.get_or_insert(ds);
        }
        let mean = mean_of_means(&means)?;

        let mut merged = Dataset::new();
        if let Some(src) = &template {
            for coord in src.variables() {
                let is_coord = LAT_NAMES.contains(&coord.name()) || LON_NAMES.contains(&coord.name());
                if is_coord && coord.dims().iter().all(|d| mean.dims().contains(d)) && !coord.dims().is_empty() {
                    merged.add_variable(coord.clone())?;
                }
            }
        }
        merged.add_variable(
            Variable::from_vec("time", "time", vec![0.0])
                .with_attr("units", format!("hours since {} 00:00:00", date.iso())),
        )?;
        merged.add_variable(with_unit_time(&mean)?)?;

        let work = layout.runoff_work_dir(date);
        let merged_path = work.join("t2_mean.nc");
        let remapped_path = work.join("t2_remap.nc");
        store.write(&merged_path, &merged, &runoff_write_options())?;
        self.ctx.remapper().remap(&RemapRequest::new(
            &merged_path,
            &bathy,
            &remapped_path,
            MissingPolicy::None,
        ))?;
        let remapped = store.require(&remapped_path)?;

        let output = layout.runoff_temperature(date);
        store.write(&output, &to_rotemp(&remapped)?, &runoff_write_options())?;
        self.cleanup(&work, &[&merged_path, &remapped_path]);
        tracing::info!("写出径流温度: {}", output.display());
        Ok(output)
    }

    fn cleanup(&self, work: &Path, files: &[&Path]) {
        for f in files {
            if let Err(e) = self.ctx.store().remove(f) {
                tracing::debug!("删除中间文件 {} 失败: {}", f.display(), e);
            }
        }
        if work.is_dir() {
            if let Err(e) = std::fs::remove_dir(work) {
                tracing::debug!("删除工作目录 {} 失败: {}", work.display(), e);
            }
        }
    }
}

/// 重映射后的 `t2` 转为 `rotemp`，坐标变量原样保留
pub fn to_rotemp(remapped: &Dataset) -> NbResult<Dataset> {
    let t2 = remapped.require(T2_VAR)?;
    let rotemp = t2
        .clone()
        .renamed(ROTEMP_VAR)
        .with_data(t2.data().mapv(river_temperature))?
        .with_attr("units", "degC")
        .with_attr("long_name", "river runoff temperature");

    let mut out = Dataset::new();
    for v in remapped.variables() {
        if v.name() != T2_VAR && v.dims().iter().all(|d| rotemp.dims().contains(d)) && !v.dims().is_empty() {
            out.add_variable(v.clone())?;
        }
    }
    out.add_variable(rotemp)?;
    Ok(out)
}

/// 空间场在首轴加长度为 1 的时间维
pub fn with_unit_time(var: &Variable) -> NbResult<Variable> {
    let mut dims = vec!["time".to_string()];
    dims.extend(var.dims().iter().cloned());
    let mut shape = vec![1];
    shape.extend_from_slice(var.shape());
    let data = var
        .data()
        .to_owned()
        .into_shape_with_order(IxDyn(&shape))
        .map_err(|e| NbError::internal(format!("{}: {}", var.name(), e)))?;
    let mut out = Variable::from_owned_dims(var.name(), dims, data)?;
    for (k, v) in var.attrs() {
        out.set_attr(k.clone(), v.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    const N: f64 = f64::NAN;

    fn meteo(values: Vec<f64>, nt: usize) -> Dataset {
        let data = ArrayD::from_shape_vec(IxDyn(&[nt, 1, 2]), values).unwrap();
        let mut ds = Dataset::new();
        ds.add_variable(Variable::from_vec("time", "time", (0..nt).map(|i| i as f64).collect()))
            .unwrap();
        ds.add_variable(
            Variable::new("t2", &["time", "lat", "lon"], data)
                .unwrap()
                .with_attr("units", "K"),
        )
        .unwrap();
        ds
    }

    #[test]
    fn test_river_temperature_threshold() {
        assert!((river_temperature(280.15) - 6.0).abs() < 1e-12);
        assert_eq!(river_temperature(FREEZING_K), 0.0);
        assert_eq!(river_temperature(270.0), COLD_RIVER_TEMP);
        assert!(river_temperature(N).is_nan());
    }

    #[test]
    fn test_daily_mean_ignores_missing() {
        let ds = meteo(vec![270.0, 280.0, 274.0, N], 2);
        let mean = daily_mean(&ds).unwrap();
        assert_eq!(mean.dims(), &["lat", "lon"]);
        assert_eq!(mean.data()[[0, 0]], 272.0);
        assert_eq!(mean.data()[[0, 1]], 280.0);
        assert_eq!(mean.attr_text("units"), Some("K"));
    }

    #[test]
    fn test_mean_of_means() {
        let a = daily_mean(&meteo(vec![270.0, 280.0], 1)).unwrap();
        let b = daily_mean(&meteo(vec![280.0, 290.0], 1)).unwrap();
        let m = mean_of_means(&[a.clone(), b]).unwrap();
        assert_eq!(m.to_vec(), vec![275.0, 285.0]);

        let other = Variable::new("t2", &["lat", "lon"], ArrayD::zeros(IxDyn(&[2, 2]))).unwrap();
        assert!(mean_of_means(&[a, other]).is_err());
        assert!(mean_of_means(&[]).is_err());
    }

    #[test]
    fn test_to_rotemp() {
        let mut ds = Dataset::new();
        ds.add_variable(Variable::from_vec("lat", "lat", vec![58.0])).unwrap();
        let t2 = Variable::new("t2", &["lat", "lon"], ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![284.15, 260.0]).unwrap())
            .unwrap();
        ds.add_variable(t2).unwrap();
        let out = to_rotemp(&ds).unwrap();
        let r = out.require("rotemp").unwrap();
        assert_eq!(r.attr_text("units"), Some("degC"));
        assert!((r.data()[[0, 0]] - 10.0).abs() < 1e-12);
        assert_eq!(r.data()[[0, 1]], COLD_RIVER_TEMP);
        assert!(out.contains("lat"));
        assert!(!out.contains("t2"));
    }

    #[test]
    fn test_with_unit_time() {
        let v = Variable::new("t2", &["lat", "lon"], ArrayD::zeros(IxDyn(&[2, 3])))
            .unwrap()
            .with_attr("units", "K");
        let t = with_unit_time(&v).unwrap();
        assert_eq!(t.dims(), &["time", "lat", "lon"]);
        assert_eq!(t.shape(), &[1, 2, 3]);
        assert_eq!(t.attr_text("units"), Some("K"));
    }
}
