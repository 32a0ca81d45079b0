// crates/nb_forcing/src/teos10.rs

//! TEOS-10 温盐转换
//!
//! 把开边界 3D 文件中的实用盐度 (SP) 转为绝对盐度 (SA, g/kg)，
//! 位温 (pt) 转为保守温度 (CT, °C)。
//!
//! # 公式
//!
//! - `SA = u_PS · SP · (1 + SAAR)`，波罗的海多边形内使用专用线性关系
//! - `CT = h0(SA, pt) / c_p0`，h0 为 GSW 位焓多项式
//!
//! SAAR 取 0。波罗的海以外的开边界不在本流水线的模式区域内；
//! 对多边形以外的点，SA 只是忽略 SAAR 的近似值，转换时记录警告。
//!
//! # 轴识别
//!
//! | 角色 | 名称 | 缺省轴 |
//! |------|------|--------|
//! | 时间 | `time` | 0 |
//! | 深度 | 深度变量名 | 1 |
//! | 经度 | `lon`/`longitude`/`x` | 3 |
//! | 纬度 | 其余轴 | - |

use ndarray::{ArrayD, IxDyn, Zip};
use std::path::Path;

use nb_foundation::{NbError, NbResult};
use nb_io::axes::{DEPTH_NAMES, LAT_NAMES, LON_DIM_NAMES, LON_NAMES};
use nb_io::{Dataset, DatasetStore, Variable, WriteOptions};

// ============================================================
// GSW 常数
// ============================================================

/// 参考盐度 [g/kg]
pub const SSO: f64 = 35.16504;
/// SP → 参考盐度换算因子 u_PS
pub const UPS: f64 = SSO / 35.0;
/// 位焓比热 c_p0 [J/(kg K)]
pub const CP0: f64 = 3991.867_957_119_63;
/// 盐度归一化因子 1/(40·u_PS)
const SFAC: f64 = 0.024_882_667_558_461_5;

/// 压强换算：每米深度 0.1 dbar
pub const DBAR_PER_METRE: f64 = 0.1;

/// 经度缺省值 [°E]
pub const DEFAULT_LON: f64 = 24.0;
/// 纬度缺省值 [°N]
pub const DEFAULT_LAT: f64 = 60.0;

/// 波罗的海多边形左边界（经度）
const BALTIC_XB_LEFT: [f64; 3] = [12.6, 7.0, 26.0];
/// 波罗的海多边形左边界（纬度）
const BALTIC_YB_LEFT: [f64; 3] = [50.0, 59.0, 69.0];
/// 波罗的海多边形右边界（经度）
const BALTIC_XB_RIGHT: [f64; 2] = [45.0, 26.0];
/// 波罗的海多边形右边界（纬度）
const BALTIC_YB_RIGHT: [f64; 2] = [50.0, 69.0];

/// 温度变量别名
pub const THETA_NAMES: &[&str] = &["thetao", "theta", "pt", "potemp"];
/// 盐度变量别名
pub const SALINITY_NAMES: &[&str] = &["so", "SP", "salinity", "practical_salinity"];

// ============================================================
// 点函数
// ============================================================

/// 分段线性插值，`x` 递增
fn xinterp1(x: &[f64], y: &[f64], x0: f64) -> f64 {
    let k = x.partition_point(|&v| v <= x0).clamp(1, x.len() - 1);
    let r = (x0 - x[k - 1]) / (x[k] - x[k - 1]);
    y[k - 1] + r * (y[k] - y[k - 1])
}

/// 波罗的海内的绝对盐度；点不在多边形内时返回 None
pub fn sa_from_sp_baltic(sp: f64, lon: f64, lat: f64) -> Option<f64> {
    let inside_box = BALTIC_XB_LEFT[1] < lon
        && lon < BALTIC_XB_RIGHT[0]
        && BALTIC_YB_LEFT[0] < lat
        && lat < BALTIC_YB_LEFT[2];
    if !inside_box {
        return None;
    }
    let xx_left = xinterp1(&BALTIC_YB_LEFT, &BALTIC_XB_LEFT, lat);
    let xx_right = xinterp1(&BALTIC_YB_RIGHT, &BALTIC_XB_RIGHT, lat);
    if xx_left <= lon && lon <= xx_right {
        Some(((SSO - 0.087) / 35.0) * sp + 0.087)
    } else {
        None
    }
}

/// 绝对盐度异常比 SAAR
///
/// 不携带全球查找表，恒为 0。
pub fn saar(_p: f64, _lon: f64, _lat: f64) -> f64 {
    0.0
}

/// 经度序列中落在波罗的海多边形以外的点数
pub fn points_outside_baltic(lons: &[f64], lat: f64) -> usize {
    lons.iter()
        .filter(|&&lon| sa_from_sp_baltic(SSO, lon, lat).is_none())
        .count()
}

/// 实用盐度 → 绝对盐度 [g/kg]
pub fn sa_from_sp(sp: f64, p: f64, lon: f64, lat: f64) -> f64 {
    if let Some(sa) = sa_from_sp_baltic(sp, lon, lat) {
        return sa;
    }
    UPS * sp * (1.0 + saar(p, lon, lat))
}

/// 位温 → 保守温度 [°C]
pub fn ct_from_pt(sa: f64, pt: f64) -> f64 {
    let x2 = SFAC * sa;
    let x = x2.sqrt();
    let y = pt * 0.025;

    let pot_enthalpy = 61.013_624_206_810_71
        + y * (168_776.461_380_480_15
            + y * (-2735.278_560_511_962_5
                + y * (2574.216_445_382_143_3
                    + y * (-1536.664_443_497_754_3
                        + y * (545.734_049_793_162_9
                            + (-50.910_917_284_743_31 - 18.304_898_789_278_02 * y) * y)))))
        + x2 * (268.552_026_584_507_1
            + y * (-12_019.028_203_559_312
                + y * (3734.858_026_725_145
                    + y * (-2046.767_114_505_761_8
                        + y * (465.286_556_238_262_34
                            + (-0.637_082_030_237_635_9 - 10.650_848_542_359_153 * y) * y))))
            + x * (937.209_911_062_070_7
                + y * (588.180_281_217_010_8
                    + y * (248.394_765_229_712_85
                        + (-3.871_557_904_936_333 - 2.626_801_985_426_835_6 * y) * y))
                + x * (-1687.914_374_187_449
                    + x * (246.959_888_878_137_7
                        + x * (123.595_765_824_579_64 - 48.589_106_902_540_9 * x))
                    + y * (936.320_654_446_033_6
                        + y * (-942.782_730_454_443_9
                            + y * (369.438_943_750_900_2
                                + (-33.836_649_478_952_48 - 9.987_880_382_780_322 * y) * y))))));

    pot_enthalpy / CP0
}

// ============================================================
// 数据集转换
// ============================================================

/// 转换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Teos10Options {
    /// 文件中没有可用经度时使用 [°E]
    pub lon_fallback: f64,
    /// 文件中没有可用纬度时使用 [°N]
    pub lat_fallback: f64,
}

impl Default for Teos10Options {
    fn default() -> Self {
        Self {
            lon_fallback: DEFAULT_LON,
            lat_fallback: DEFAULT_LAT,
        }
    }
}

impl Teos10Options {
    /// 覆盖缺省经纬度
    pub fn with_fallback(lon: Option<f64>, lat: Option<f64>) -> Self {
        let d = Self::default();
        Self {
            lon_fallback: lon.unwrap_or(d.lon_fallback),
            lat_fallback: lat.unwrap_or(d.lat_fallback),
        }
    }

    /// 输出文件写出选项（zlib 1 级 + shuffle）
    pub fn write_options() -> WriteOptions {
        WriteOptions::compressed(1, true)
    }
}

/// 四维数组中各角色所在的轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisRoles {
    time: usize,
    depth: usize,
    lat: usize,
    lon: usize,
}

fn resolve_axes(var: &Variable, depth_name: &str) -> NbResult<AxisRoles> {
    let time = var.axis_of("time").unwrap_or(0);
    let depth = var.axis_of(depth_name).unwrap_or(1);
    let lon = LON_DIM_NAMES
        .iter()
        .find_map(|n| var.axis_of(n))
        .unwrap_or(3);

    if time == depth || time == lon || depth == lon {
        return Err(NbError::schema(format!(
            "无法区分 {} 的时间/深度/经度轴 (维度: {:?})",
            var.name(),
            var.dims()
        )));
    }
    let lat = (0..4)
        .find(|a| ![time, depth, lon].contains(a))
        .ok_or_else(|| NbError::schema("无法确定纬度轴"))?;
    Ok(AxisRoles { time, depth, lat, lon })
}

/// 沿经度轴的经度序列，长度 `nx`
fn longitude_line(ds: &Dataset, nx: usize, fallback: f64) -> Vec<f64> {
    let Some(var) = ds.find_variable(LON_NAMES) else {
        return vec![fallback; nx];
    };
    let data = var.data();
    match var.ndim() {
        1 if var.shape()[0] >= nx => data.iter().take(nx).copied().collect(),
        2 if var.shape()[1] >= nx => data
            .index_axis(ndarray::Axis(0), 0)
            .iter()
            .take(nx)
            .copied()
            .collect(),
        _ => vec![fallback; nx],
    }
}

/// 代表纬度：0 维取值，1 维取首元素，2 维取 [0, 0]
fn representative_latitude(ds: &Dataset, fallback: f64) -> f64 {
    ds.find_variable(LAT_NAMES)
        .filter(|v| v.ndim() <= 2 && !v.is_empty())
        .and_then(|v| v.data().iter().next().copied())
        .unwrap_or(fallback)
}

/// 把数据集中的 SP/pt 转为 SA/CT，形状与其余变量不变
pub fn convert_dataset(ds: &Dataset, options: &Teos10Options) -> NbResult<Dataset> {
    let theta = ds.find_variable(THETA_NAMES);
    let so = ds.find_variable(SALINITY_NAMES);
    let depth = ds.find_variable(DEPTH_NAMES);
    let (theta, so, depth) = match (theta, so, depth) {
        (Some(t), Some(s), Some(d)) => (t, s, d),
        (t, s, d) => {
            return Err(NbError::schema(format!(
                "缺少必需变量: theta={:?}, so={:?}, depth={:?}",
                t.map(Variable::name),
                s.map(Variable::name),
                d.map(Variable::name)
            )))
        }
    };

    NbError::check_rank(theta.name(), 4, theta.ndim())?;
    NbError::check_rank(so.name(), 4, so.ndim())?;
    NbError::check_shape(theta.name(), so.shape(), theta.shape())?;

    let axes = resolve_axes(so, depth.name())?;
    let shape = so.shape().to_vec();
    let nz = shape[axes.depth];
    let nx = shape[axes.lon];
    tracing::debug!(
        "TEOS-10 轴: time={} depth={} lat={} lon={}",
        axes.time,
        axes.depth,
        axes.lat,
        axes.lon
    );

    if depth.len() != nz {
        return Err(NbError::shape_mismatch(depth.name(), &[nz], depth.shape()));
    }
    let pressure: Vec<f64> = depth.data().iter().map(|z| z * DBAR_PER_METRE).collect();
    let lon_line = longitude_line(ds, nx, options.lon_fallback);
    let lat0 = representative_latitude(ds, options.lat_fallback);
    let outside = points_outside_baltic(&lon_line, lat0);
    if outside > 0 {
        tracing::warn!(
            "TEOS-10: {}/{} 个经度点在波罗的海多边形以外 (纬度 {})，SA 按 SAAR=0 近似",
            outside,
            nx,
            lat0
        );
    }

    let sa_values: Vec<f64> = so
        .data()
        .indexed_iter()
        .map(|(idx, &sp)| sa_from_sp(sp, pressure[idx[axes.depth]], lon_line[idx[axes.lon]], lat0))
        .collect();
    let sa = ArrayD::from_shape_vec(IxDyn(&shape), sa_values)
        .map_err(|e| NbError::internal(format!("SA 形状: {}", e)))?;
    let ct = Zip::from(&sa)
        .and(&theta.data())
        .map_collect(|&a, &t| ct_from_pt(a, t));

    NbError::check_shape("SA", so.shape(), sa.shape())?;
    NbError::check_shape("CT", theta.shape(), ct.shape())?;

    let sa_var = so
        .clone()
        .with_data(sa)?
        .with_attr("long_name", "Absolute Salinity")
        .with_attr("standard_name", "sea_water_absolute_salinity")
        .with_attr("units", "g kg-1")
        .with_attr("comment", "Computed from practical salinity via TEOS-10 (GSW).");
    let ct_var = theta
        .clone()
        .with_data(ct)?
        .with_attr("long_name", "Conservative Temperature")
        .with_attr("standard_name", "sea_water_conservative_temperature")
        .with_attr("units", "degC")
        .with_attr("comment", "Computed from potential temperature via TEOS-10 (GSW).");

    let mut out = ds.clone();
    out.add_variable(sa_var)?;
    out.add_variable(ct_var)?;
    Ok(out)
}

/// 读取、转换并写出单个文件
pub fn convert_file(
    store: &dyn DatasetStore,
    input: &Path,
    output: &Path,
    options: &Teos10Options,
) -> NbResult<()> {
    let ds = store.require(input)?;
    let converted = convert_dataset(&ds, options)?;
    store.write(output, &converted, &Teos10Options::write_options())?;
    tracing::info!("TEOS-10: {} -> {}", input.display(), output.display());
    Ok(())
}
