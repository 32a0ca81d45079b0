// crates/nb_io/src/time.rs

//! CF 时间格式解析
//!
//! 解析 NetCDF 文件中的 CF 约定时间格式：
//! - `seconds since 1970-01-01 00:00:00`
//! - `hours since 1950-01-01`
//! - `days since 1900-01-01T00:00:00Z`
//!
//! # 支持的日历
//!
//! 只支持与 chrono 一致的格里高利历（`standard`、`gregorian`、
//! `proleptic_gregorian`）。CMEMS 与 ECMWF 产品均使用这些日历；
//! 其他日历返回结构错误而不是给出错误的日期。

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

use crate::dataset::Variable;
use nb_foundation::{ForecastDate, NbError, NbResult};

// ============================================================
// 时间单位
// ============================================================

/// 时间单位类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// 秒
    Seconds,
    /// 分钟
    Minutes,
    /// 小时
    Hours,
    /// 天
    Days,
}

impl TimeUnit {
    /// 从字符串解析
    pub fn parse(s: &str) -> NbResult<Self> {
        match s.to_lowercase().as_str() {
            "second" | "seconds" | "s" | "sec" | "secs" => Ok(Self::Seconds),
            "minute" | "minutes" | "min" | "mins" => Ok(Self::Minutes),
            "hour" | "hours" | "h" | "hr" | "hrs" => Ok(Self::Hours),
            "day" | "days" | "d" => Ok(Self::Days),
            _ => Err(NbError::schema(format!("未知时间单位: {}", s))),
        }
    }

    /// 每单位秒数
    pub fn seconds(&self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3600.0,
            Self::Days => 86400.0,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds => write!(f, "seconds"),
            Self::Minutes => write!(f, "minutes"),
            Self::Hours => write!(f, "hours"),
            Self::Days => write!(f, "days"),
        }
    }
}

// ============================================================
// CF 时间单位
// ============================================================

/// CF 时间单位，"units since reference_time"
#[derive(Debug, Clone, PartialEq)]
pub struct CfTimeUnits {
    /// 时间单位类型
    pub unit: TimeUnit,
    /// 参考时间
    pub reference: NaiveDateTime,
}

impl CfTimeUnits {
    /// 从 units 属性解析
    pub fn parse(units: &str) -> NbResult<Self> {
        let lower = units.to_lowercase();
        let pos = lower
            .find(" since ")
            .ok_or_else(|| NbError::schema(format!("时间单位缺少 'since': {}", units)))?;

        let unit = TimeUnit::parse(units[..pos].trim())?;
        let reference = parse_reference(units[pos + 7..].trim())?;
        Ok(Self { unit, reference })
    }

    /// 同时检查日历
    pub fn parse_with_calendar(units: &str, calendar: Option<&str>) -> NbResult<Self> {
        if let Some(cal) = calendar {
            match cal.to_lowercase().as_str() {
                "standard" | "gregorian" | "proleptic_gregorian" => {}
                other => return Err(NbError::schema(format!("不支持的日历类型: {}", other))),
            }
        }
        Self::parse(units)
    }

    /// CF 时间值转为日期时间（精确到毫秒）
    pub fn to_datetime(&self, value: f64) -> NbResult<NaiveDateTime> {
        if !value.is_finite() {
            return Err(NbError::schema(format!("无效时间值: {}", value)));
        }
        let millis = (value * self.unit.seconds() * 1000.0).round() as i64;
        self.reference
            .checked_add_signed(Duration::milliseconds(millis))
            .ok_or_else(|| NbError::schema(format!("时间值溢出: {} {}", value, self.unit)))
    }

    /// 日期时间转为 CF 时间值
    pub fn from_datetime(&self, dt: &NaiveDateTime) -> f64 {
        let millis = (*dt - self.reference).num_milliseconds() as f64;
        millis / 1000.0 / self.unit.seconds()
    }

    /// 批量转换
    pub fn decode(&self, values: &[f64]) -> NbResult<Vec<NaiveDateTime>> {
        values.iter().map(|&v| self.to_datetime(v)).collect()
    }
}

impl fmt::Display for CfTimeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit,
            self.reference.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// 解析参考时间：`YYYY-MM-DD[( |T)HH:MM[:SS[.fff]]][Z]`
fn parse_reference(s: &str) -> NbResult<NaiveDateTime> {
    let cleaned = s.trim_end_matches('Z').replace('T', " ");
    let mut parts = cleaned.split_whitespace();
    let date_part = parts
        .next()
        .ok_or_else(|| NbError::schema("空参考时间"))?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| NbError::schema(format!("无效参考日期 {}: {}", date_part, e)))?;

    let time = match parts.next() {
        None => NaiveTime::MIN,
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
            .map_err(|e| NbError::schema(format!("无效参考时间 {}: {}", t, e)))?,
    };
    Ok(date.and_time(time))
}

/// 解码一个时间坐标变量
pub fn decode_time_variable(var: &Variable) -> NbResult<Vec<NaiveDateTime>> {
    let units = var
        .attr_text("units")
        .ok_or_else(|| NbError::schema(format!("时间变量 {} 缺少 units 属性", var.name())))?;
    let cf = CfTimeUnits::parse_with_calendar(units, var.attr_text("calendar"))?;
    cf.decode(&var.to_vec())
}

/// 按日期分组时间索引，返回每个目标日期对应的索引
///
/// 日期没有任何时间步时返回结构错误。
pub fn indices_for_day(times: &[NaiveDateTime], day: &ForecastDate) -> NbResult<Vec<usize>> {
    let indices: Vec<usize> = times
        .iter()
        .enumerate()
        .filter(|(_, t)| t.date() == day.naive())
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return Err(NbError::schema(format!("时间轴中没有日期 {} 的时间步", day)));
    }
    Ok(indices)
}
