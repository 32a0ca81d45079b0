// crates/nb_foundation/src/date.rs

//! 预报日期与日期窗口
//!
//! 流水线中所有带日期的文件名、子窗口和增量文件日期标签都由
//! ([`ForecastDate`], 预报天数) 这一对值确定性地导出。
//!
//! # 磁盘编码
//!
//! | 编码 | 示例 | 用途 |
//! |------|------|------|
//! | `YYYYMMDD` | `20250701` | 大部分文件名 |
//! | `yYYYYmMMdDD` | `y2025m07d01` | 边界与径流日文件 |
//! | `YYYY/MM/DD` | `2025/07/01` | 按日目录 |
//! | `YYYYMMDD.000001` | `20250701.000001` | 增量文件 `time` 标签 |
//! | `YYYYMMDD.000002` | `20250701.000002` | 增量文件 `z_inc_daten` 标签 |

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{NbError, NbResult};

// ============================================================
// 日期标签约定
// ============================================================

/// 分析时刻后缀，拼接在日期后构成增量文件的 `time` 标签
///
/// 下游模式的日期解析器按此约定识别分析时刻。
pub const ANALYSIS_TIME_SUFFIX: &str = ".000001";

/// 下一时刻后缀，拼接在日期后构成 `z_inc_daten` 标签
pub const NEXT_DATE_SUFFIX: &str = ".000002";

/// 增量文件 `z_inc_datef` 固定值
///
/// 历次业务运行均未改变，下游模式读取器要求此值。
pub const INCREMENT_DATEF: f64 = 20191203.5;

// ============================================================
// 预报日期
// ============================================================

/// 预报日期（按日精度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForecastDate(NaiveDate);

impl ForecastDate {
    /// 从 `YYYYMMDD` 字符串解析
    pub fn parse(s: &str) -> NbResult<Self> {
        let s = s.trim();
        if s.len() != 8 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(NbError::invalid_input(format!(
                "日期格式应为 YYYYMMDD: '{}'",
                s
            )));
        }
        let date = NaiveDate::parse_from_str(s, "%Y%m%d")?;
        Ok(Self(date))
    }

    /// 从年月日创建
    pub fn from_ymd(year: i32, month: u32, day: u32) -> NbResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| {
                NbError::invalid_input(format!("无效日期: {}-{}-{}", year, month, day))
            })
    }

    /// 本地时区的今天
    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    /// 内部 chrono 日期
    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    /// 当天零时
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.0.and_time(NaiveTime::MIN)
    }

    /// 偏移若干天
    pub fn offset_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// 前一天
    pub fn previous(&self) -> Self {
        self.offset_days(-1)
    }

    /// 后一天
    pub fn next(&self) -> Self {
        self.offset_days(1)
    }

    /// 年份
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 四位年份字符串
    pub fn yyyy(&self) -> String {
        format!("{:04}", self.0.year())
    }

    /// 两位月份字符串
    pub fn mm(&self) -> String {
        format!("{:02}", self.0.month())
    }

    /// 两位日期字符串
    pub fn dd(&self) -> String {
        format!("{:02}", self.0.day())
    }

    /// `YYYYMMDD` 编码
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// `yYYYYmMMdDD` 编码
    pub fn ymd_label(&self) -> String {
        format!("y{}m{}d{}", self.yyyy(), self.mm(), self.dd())
    }

    /// `YYYY/MM/DD` 相对目录
    pub fn dir_components(&self) -> PathBuf {
        PathBuf::from(self.yyyy()).join(self.mm()).join(self.dd())
    }

    /// `YYYY-MM-DD` 编码
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// 日期本身作为浮点标签，例如 `20250701.0`
    pub fn tag(&self) -> f64 {
        let packed = self.0.year() as i64 * 10_000 + self.0.month() as i64 * 100 + self.0.day() as i64;
        packed as f64
    }

    /// 日期拼接后缀后的浮点标签
    ///
    /// 按十进制字符串解析，保证与 `float("YYYYMMDD.xxxxxx")` 逐位一致。
    pub fn suffixed_tag(&self, suffix: &str) -> NbResult<f64> {
        let text = format!("{}{}", self.compact(), suffix);
        text.parse::<f64>()
            .map_err(|e| NbError::internal(format!("无法解析日期标签 '{}': {}", text, e)))
    }

    /// 分析时刻标签 (`YYYYMMDD.000001`)
    pub fn analysis_time_tag(&self) -> NbResult<f64> {
        self.suffixed_tag(ANALYSIS_TIME_SUFFIX)
    }

    /// 下一时刻标签 (`YYYYMMDD.000002`)
    pub fn next_date_tag(&self) -> NbResult<f64> {
        self.suffixed_tag(NEXT_DATE_SUFFIX)
    }

    /// 两日期相差的天数 (`self - other`)
    pub fn days_since(&self, other: &ForecastDate) -> i64 {
        (self.0 - other.0).num_days()
    }
}

impl fmt::Display for ForecastDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compact())
    }
}

impl FromStr for ForecastDate {
    type Err = NbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ForecastDate {
    type Error = NbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ForecastDate> for String {
    fn from(date: ForecastDate) -> Self {
        date.compact()
    }
}

impl From<NaiveDate> for ForecastDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

// ============================================================
// 日期窗口
// ============================================================

/// 日期窗口：起始日期 + 预报天数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    /// 起始日期
    pub start: ForecastDate,
    /// 预报天数
    pub ndays: u32,
}

impl DateWindow {
    /// 创建窗口，预报天数必须至少为 1
    pub fn new(start: ForecastDate, ndays: u32) -> NbResult<Self> {
        if ndays == 0 {
            return Err(NbError::invalid_input("预报天数必须至少为 1"));
        }
        Ok(Self { start, ndays })
    }

    /// 窗口内每一天
    pub fn days(&self) -> impl Iterator<Item = ForecastDate> + '_ {
        (0..self.ndays as i64).map(move |i| self.start.offset_days(i))
    }

    /// 窗口结束日（不含）
    pub fn end(&self) -> ForecastDate {
        self.start.offset_days(self.ndays as i64)
    }

    /// 窗口起点零时
    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start.start_of_day()
    }

    /// 多取 `extra_days` 天后的终点时刻，用于远程抓取
    pub fn fetch_end_datetime(&self, extra_days: u32) -> NaiveDateTime {
        self.start
            .offset_days(self.ndays as i64 + extra_days as i64)
            .start_of_day()
    }

    /// 窗口长度（小时）
    pub fn hours(&self) -> u64 {
        self.ndays as u64 * 24
    }

    /// 日期是否在窗口内
    pub fn contains(&self, date: &ForecastDate) -> bool {
        *date >= self.start && *date < self.end()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}d", self.start, self.ndays)
    }
}
