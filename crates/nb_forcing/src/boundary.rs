// crates/nb_forcing/src/boundary.rs

//! 开边界文件组装
//!
//! 流程：
//!
//! ```text
//! fetch(sla thetao so siconc sithick, start..start+ndays+1)
//!   └─ remap (-setmisstonn -remapbil,gridfile_bdy_est05)
//!        ├─ 2D: sla + uos/vos 零占位 → (time, lon, lat)
//!        └─ 3D: thetao/so 插值到 110 层 + uo/vo 零占位 → (time, depth, lon, lat)
//!             └─ 按日拆分 → bdy_hourly_{2d,3d}_yYYYYmMMdDD.nc
//!                  └─ TEOS-10 → bdy_hourly_3d_TEOS10_yYYYYmMMdDD.nc
//! ```
//!
//! 多日合并的 2D/3D 数据集只在内存中存在，不落盘。

use std::path::{Path, PathBuf};

use crate::context::ForcingContext;
use crate::teos10::{self, Teos10Options};
use crate::vertical::{interpolate_levels, level_coordinate, BOUNDARY_LEVELS};
use nb_config::BoundaryKind;
use nb_foundation::{DateWindow, ForecastDate, NbError, NbResult};
use nb_io::axes::{find_dim, time_dim, DEPTH_NAMES, LAT_NAMES, LON_NAMES};
use nb_io::{decode_time_variable, indices_for_day, Dataset, Variable, WriteOptions};
use nb_tools::{call_sites, MissingPolicy, RemapRequest, SubsetRequest};

/// 2D 文件维度顺序
const SURFACE_ORDER: &[&str] = &["time", "lon", "lat"];
/// 3D 文件维度顺序
const PROFILE_ORDER: &[&str] = &["time", "depth", "lon", "lat"];
/// 3D 文件深度维名
const DEPTH_DIM: &str = "depth";

/// 日文件写出选项（zlib 2 级）
pub fn daily_write_options() -> WriteOptions {
    WriteOptions::compressed(2, false)
}

/// 一次边界运行的产物
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundaryProducts {
    /// 日 2D 文件
    pub surface: Vec<PathBuf>,
    /// 日 3D 文件
    pub profile: Vec<PathBuf>,
    /// 日 TEOS-10 3D 文件
    pub teos10: Vec<PathBuf>,
}

// ============================================================
// 组装
// ============================================================

/// 坐标变量：一维同名坐标或经纬度别名
fn is_coordinate(var: &Variable) -> bool {
    let own_axis = var.ndim() == 1 && var.dims()[0] == var.name();
    own_axis || LAT_NAMES.contains(&var.name()) || LON_NAMES.contains(&var.name())
}

/// 数据集中维度都属于 `dims` 的坐标变量（排除 `exclude`）
fn coordinates_within(ds: &Dataset, dims: &[String], exclude: &[&str]) -> Vec<Variable> {
    ds.variables()
        .iter()
        .filter(|v| is_coordinate(v) && !exclude.contains(&v.name()))
        .filter(|v| v.dims().iter().all(|d| dims.contains(d)))
        .cloned()
        .collect()
}

/// 与输入同形状、缺测位置相同的零场（等价于 `x*0`）
fn zero_placeholder(var: &Variable, name: &str, units: &str) -> NbResult<Variable> {
    let zeros = var.data().mapv(|v| v * 0.0);
    Ok(var
        .zeros_like(name)
        .with_data(zeros)?
        .with_attr("units", units))
}

/// 2D 边界数据集：sla + uos/vos
pub fn compose_surface(remapped: &Dataset) -> NbResult<Dataset> {
    let sla = remapped.require("sla")?;
    let mut ds = Dataset::new();
    for coord in coordinates_within(remapped, sla.dims(), &["sla"]) {
        ds.add_variable(coord.transposed(SURFACE_ORDER))?;
    }
    let uos = zero_placeholder(sla, "uos", "m s-1")?;
    let vos = zero_placeholder(sla, "vos", "m s-1")?;
    for v in [sla.clone(), uos, vos] {
        ds.add_variable(v.transposed(SURFACE_ORDER))?;
    }
    Ok(ds)
}

/// 3D 边界数据集：thetao/so 插值到固定层 + uo/vo
pub fn compose_profile(remapped: &Dataset) -> NbResult<Dataset> {
    let thetao = remapped.require("thetao")?;
    let so = remapped.require("so")?;
    NbError::check_shape("thetao", so.shape(), thetao.shape())?;

    let depth_dim = find_dim(so, DEPTH_NAMES).ok_or_else(|| {
        NbError::schema(format!("so 没有深度维 (维度: {:?})", so.dims()))
    })?;
    let source_levels = remapped.require(depth_dim)?.to_vec();

    let interpolate = |var: &Variable| -> NbResult<Variable> {
        let mut out = interpolate_levels(var, depth_dim, &source_levels, &BOUNDARY_LEVELS)?;
        out.rename_dim(depth_dim, DEPTH_DIM);
        Ok(out)
    };
    let thetao = interpolate(thetao)?;
    let so_i = interpolate(so)?;
    let vo = zero_placeholder(&so_i, "vo", "m s-1")?;
    let uo = zero_placeholder(&so_i, "uo", "m s-1")?;

    let mut ds = Dataset::new();
    ds.add_variable(level_coordinate(DEPTH_DIM, &BOUNDARY_LEVELS))?;
    for coord in coordinates_within(remapped, so.dims(), &[depth_dim]) {
        ds.add_variable(coord.transposed(PROFILE_ORDER))?;
    }
    for v in [thetao, so_i, vo, uo] {
        ds.add_variable(v.transposed(PROFILE_ORDER))?;
    }
    Ok(ds)
}

/// 按 CF 解码后的日历日期拆分，每个窗口日一个数据集
///
/// 窗口中某天没有任何时间步时返回结构错误。
pub fn split_by_day(ds: &Dataset, window: &DateWindow) -> NbResult<Vec<(ForecastDate, Dataset)>> {
    let tdim = time_dim(ds).ok_or_else(|| NbError::schema("数据集没有时间维"))?;
    let times = decode_time_variable(ds.require(tdim)?)?;
    window
        .days()
        .map(|day| {
            let idx = indices_for_day(&times, &day)?;
            Ok((day, ds.select_indices(tdim, &idx)?))
        })
        .collect()
}

// ============================================================
// 构建器
// ============================================================

/// 开边界组装器
#[derive(Debug)]
pub struct BoundaryComposer<'a> {
    ctx: &'a ForcingContext,
    teos: Teos10Options,
}

impl<'a> BoundaryComposer<'a> {
    /// 创建
    pub fn new(ctx: &'a ForcingContext) -> Self {
        Self {
            ctx,
            teos: Teos10Options::default(),
        }
    }

    /// 覆盖 TEOS-10 参数
    pub fn with_teos10(mut self, options: Teos10Options) -> Self {
        self.teos = options;
        self
    }

    /// 完整流程：抓取、重映射、组装、拆分、TEOS-10
    pub fn run(&self, window: &DateWindow) -> NbResult<BoundaryProducts> {
        tracing::info!("==== 开边界 {} ====", window);
        let remapped = self.fetch_and_remap(window)?;
        self.process_remapped(window, &remapped)
    }

    /// 抓取西边界条带并重映射到边界网格，返回重映射文件
    pub fn fetch_and_remap(&self, window: &DateWindow) -> NbResult<PathBuf> {
        let layout = self.ctx.layout();
        let raw = layout.boundary_raw(&window.start);
        let request = SubsetRequest::new(
            call_sites::HOURLY_DATASET,
            call_sites::BOUNDARY_VARIABLES,
            window.start_datetime(),
            window.fetch_end_datetime(1),
            call_sites::BOUNDARY_BBOX,
        )?;
        self.ctx.catalog().fetch(&request, &raw)?;

        let remapped = layout.boundary_remap(&window.start);
        self.ctx.remapper().remap(&RemapRequest::new(
            &raw,
            layout.boundary_grid(),
            &remapped,
            MissingPolicy::NearestNeighbour,
        ))?;
        Ok(remapped)
    }

    /// 由重映射后的多日文件生成日文件
    pub fn process_remapped(&self, window: &DateWindow, remapped: &Path) -> NbResult<BoundaryProducts> {
        let layout = self.ctx.layout();
        let store = self.ctx.store();
        let source = store.require(remapped)?;

        let surface = compose_surface(&source)?;
        let profile = compose_profile(&source)?;
        // 两组都拆分成功后才写出
        let surface_days = split_by_day(&surface, window)?;
        let profile_days = split_by_day(&profile, window)?;

        let mut products = BoundaryProducts::default();
        for (day, ds) in &surface_days {
            let path = layout.boundary_daily(&window.start, BoundaryKind::Surface2d, day);
            store.write(&path, ds, &daily_write_options())?;
            products.surface.push(path);
        }
        for (day, ds) in &profile_days {
            let path = layout.boundary_daily(&window.start, BoundaryKind::Profile3d, day);
            store.write(&path, ds, &daily_write_options())?;
            products.profile.push(path);
        }
        tracing::info!(
            "边界日文件: {} 个 2D, {} 个 3D",
            products.surface.len(),
            products.profile.len()
        );

        for (day, _) in &profile_days {
            let input = layout.boundary_daily(&window.start, BoundaryKind::Profile3d, day);
            let output = layout.boundary_teos10(&window.start, day);
            teos10::convert_file(store, &input, &output, &self.teos)?;
            products.teos10.push(output);
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    /// 2 天、每 12 小时一步、3 个源深度层
    fn remapped_dataset() -> Dataset {
        let (nt, nz, ny, nx) = (4, 3, 2, 1);
        let mut ds = Dataset::new();
        ds.add_variable(
            Variable::from_vec("time", "time", vec![0.0, 12.0, 24.0, 36.0])
                .with_attr("units", "hours since 2025-07-01 00:00:00"),
        )
        .unwrap();
        ds.add_variable(Variable::from_vec("depth", "depth", vec![0.5, 50.0, 120.0])).unwrap();
        ds.add_variable(Variable::from_vec("lat", "lat", vec![57.0, 58.0])).unwrap();
        ds.add_variable(Variable::from_vec("lon", "lon", vec![21.55])).unwrap();

        let sla = ArrayD::from_shape_fn(IxDyn(&[nt, ny, nx]), |ix| ix[0] as f64 * 0.01 + ix[1] as f64);
        ds.add_variable(Variable::new("sla", &["time", "lat", "lon"], sla).unwrap()).unwrap();
        let dims = ["time", "depth", "lat", "lon"];
        let so = ArrayD::from_shape_fn(IxDyn(&[nt, nz, ny, nx]), |ix| 6.0 + ix[1] as f64);
        let th = ArrayD::from_shape_fn(IxDyn(&[nt, nz, ny, nx]), |ix| 10.0 - ix[1] as f64);
        ds.add_variable(Variable::new("so", &dims, so).unwrap()).unwrap();
        ds.add_variable(Variable::new("thetao", &dims, th).unwrap()).unwrap();
        ds.add_variable(Variable::new("siconc", &["time", "lat", "lon"], ArrayD::zeros(IxDyn(&[nt, ny, nx]))).unwrap())
            .unwrap();
        ds
    }

    #[test]
    fn test_compose_surface() {
        let ds = compose_surface(&remapped_dataset()).unwrap();
        let sla = ds.require("sla").unwrap();
        assert_eq!(sla.dims(), &["time", "lon", "lat"]);
        assert_eq!(sla.shape(), &[4, 1, 2]);
        assert!(ds.require("uos").unwrap().data().iter().all(|&v| v == 0.0));
        assert!(ds.contains("vos"));
        assert!(!ds.contains("siconc"));
        assert!(ds.contains("time"));
    }

    #[test]
    fn test_compose_profile() {
        let ds = compose_profile(&remapped_dataset()).unwrap();
        let so = ds.require("so").unwrap();
        assert_eq!(so.dims(), &["time", "depth", "lon", "lat"]);
        assert_eq!(so.shape(), &[4, 110, 1, 2]);
        assert_eq!(ds.require("depth").unwrap().len(), 110);
        // 源层 0.5/50/120 m：1.51 m 在 0.5 与 50 之间
        let first = so.data()[[0, 0, 0, 0]];
        assert!((first - (6.0 + (1.51 - 0.5) / 49.5)).abs() < 1e-12);
        for name in ["uo", "vo", "thetao"] {
            assert_eq!(ds.require(name).unwrap().shape(), &[4, 110, 1, 2]);
        }
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn test_split_by_day() {
        let surface = compose_surface(&remapped_dataset()).unwrap();
        let window = DateWindow::new(ForecastDate::parse("20250701").unwrap(), 2).unwrap();
        let days = split_by_day(&surface, &window).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[1].0.compact(), "20250702");
        assert_eq!(days[1].1.require("sla").unwrap().shape(), &[2, 1, 2]);
        assert_eq!(days[1].1.require("time").unwrap().to_vec(), vec![24.0, 36.0]);

        let too_long = DateWindow::new(window.start, 3).unwrap();
        assert!(split_by_day(&surface, &too_long).is_err());
    }

    #[test]
    fn test_profile_requires_depth() {
        let mut ds = remapped_dataset();
        ds.remove_variable("depth");
        assert!(compose_profile(&ds).is_err());
    }
}
