// crates/nb_forcing/src/initial.rs

//! 冷启动初始温盐场
//!
//! 抓取起始日的 CMEMS 日均 `so`/`thetao`，最近邻补缺后双线性重映射到模式网格，
//! 再插值到模式的 110 个垂向层，写出 `initial_run_t<date>.nc`。
//! 时间维长度为 1，输出中去掉。

use std::path::PathBuf;

use crate::context::ForcingContext;
use crate::vertical::{interpolate_levels, level_coordinate, INITIAL_LEVELS};
use nb_foundation::{ForecastDate, NbError, NbResult};
use nb_io::axes::{find_dim, time_dim, DEPTH_NAMES};
use nb_io::{Dataset, Variable, WriteOptions};
use nb_tools::{call_sites, MissingPolicy, RemapRequest, SubsetRequest};

/// 初始场中插值的变量
pub const INITIAL_FIELDS: &[&str] = &["so", "thetao"];

/// 去掉长度为 1 的时间维，其余维度不变
fn drop_time(var: &Variable, tdim: Option<&str>) -> NbResult<Variable> {
    match tdim {
        Some(t) if var.axis_of(t).is_some() => var.select(t, 0),
        _ => Ok(var.clone()),
    }
}

/// 由水平重映射后的数据集生成初始场：取首个时间步、插值到 [`INITIAL_LEVELS`]
pub fn compose_initial(remapped: &Dataset) -> NbResult<Dataset> {
    let tdim = time_dim(remapped);
    let so = remapped.require("so")?;
    let depth_dim = find_dim(so, DEPTH_NAMES)
        .ok_or_else(|| NbError::schema(format!("so 没有深度维 (维度: {:?})", so.dims())))?;
    let source_levels = remapped.require(depth_dim)?.to_vec();

    let mut out = Dataset::new();
    out.add_variable(level_coordinate(depth_dim, &INITIAL_LEVELS))?;
    for v in remapped.variables() {
        let name = v.name();
        if INITIAL_FIELDS.contains(&name) || name == depth_dim || Some(name) == tdim {
            continue;
        }
        // 经纬度等不含深度的坐标
        if v.axis_of(depth_dim).is_none() && !v.dims().is_empty() {
            out.add_variable(drop_time(v, tdim)?)?;
        }
    }
    for name in INITIAL_FIELDS {
        let field = drop_time(remapped.require(name)?, tdim)?;
        out.add_variable(interpolate_levels(&field, depth_dim, &source_levels, &INITIAL_LEVELS)?)?;
    }
    out.prune_dimensions();
    Ok(out)
}

/// 初始场构建器
#[derive(Debug)]
pub struct InitialStateBuilder<'a> {
    ctx: &'a ForcingContext,
}

impl<'a> InitialStateBuilder<'a> {
    /// 创建
    pub fn new(ctx: &'a ForcingContext) -> Self {
        Self { ctx }
    }

    /// 构建 `initial_run_t<date>.nc`
    pub fn build(&self, date: &ForecastDate) -> NbResult<PathBuf> {
        tracing::info!("==== 冷启动初始场 {} ====", date);
        let layout = self.ctx.layout();
        let store = self.ctx.store();
        let bathy = layout.bathy();
        if !store.exists(&bathy) {
            return Err(NbError::file_not_found(bathy));
        }

        let raw = layout.initial_raw(date);
        let request = SubsetRequest::new(
            call_sites::DAILY_DATASET,
            call_sites::INITIAL_VARIABLES,
            date.start_of_day(),
            date.start_of_day(),
            call_sites::INITIAL_BBOX,
        )?;
        self.ctx.catalog().fetch(&request, &raw)?;

        let remapped_path = layout.initial_remap(date);
        self.ctx.remapper().remap(&RemapRequest::new(
            &raw,
            &bathy,
            &remapped_path,
            MissingPolicy::NearestNeighbour,
        ))?;
        let initial = compose_initial(&store.require(&remapped_path)?)?;

        let output = layout.initial_run(date);
        store.write(&output, &initial, &WriteOptions::uncompressed())?;
        if let Err(e) = store.remove(&remapped_path) {
            tracing::debug!("删除中间文件 {} 失败: {}", remapped_path.display(), e);
        }
        tracing::info!("写出初始场: {}", output.display());
        Ok(output)
    }
}
