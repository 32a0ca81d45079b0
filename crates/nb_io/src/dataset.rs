// crates/nb_io/src/dataset.rs

//! 网格数据集模型
//!
//! 一个 [`Dataset`] 对应一个 NetCDF 文件：有序维度、变量（含坐标变量）
//! 和全局属性。变量数据统一以 `f64` 存放在 `ndarray::ArrayD` 中，
//! 写出时按 [`DataType`] 转换存储类型。
//!
//! # 不变量
//!
//! - 变量数组的维数等于其维度名个数
//! - 加入数据集的变量，每个轴长度等于同名维度的长度
//!
//! 违反不变量时返回结构错误，从不隐式广播或截断。

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use std::collections::BTreeMap;

use nb_foundation::{NbError, NbResult};

/// 填充值属性名
pub const FILL_VALUE_ATTR: &str = "_FillValue";
/// 缺测值属性名
pub const MISSING_VALUE_ATTR: &str = "missing_value";

// ============================================================
// 属性
// ============================================================

/// 属性值
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// 文本
    Text(String),
    /// 单个数值
    Number(f64),
    /// 数值数组
    Numbers(Vec<f64>),
}

impl AttrValue {
    /// 作为文本
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 作为单个数值（数组取第一个元素）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Numbers(v) => v.first().copied(),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Number(v as f64)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Numbers(v)
    }
}

/// 属性表
pub type Attributes = BTreeMap<String, AttrValue>;

// ============================================================
// 维度与存储类型
// ============================================================

/// 维度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// 名称
    pub name: String,
    /// 长度
    pub len: usize,
    /// 是否无限
    pub is_unlimited: bool,
}

/// 写出时的存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    /// 32 位浮点
    F32,
    /// 64 位浮点
    #[default]
    F64,
    /// 32 位整数
    I32,
}

// ============================================================
// 变量
// ============================================================

/// 网格变量
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    dims: Vec<String>,
    data: ArrayD<f64>,
    attrs: Attributes,
    dtype: DataType,
}

impl Variable {
    /// 创建变量，维数必须与维度名个数一致
    pub fn new(name: impl Into<String>, dims: &[&str], data: ArrayD<f64>) -> NbResult<Self> {
        let name = name.into();
        NbError::check_rank(&name, dims.len(), data.ndim())?;
        Ok(Self {
            name,
            dims: dims.iter().map(|d| d.to_string()).collect(),
            data,
            attrs: Attributes::new(),
            dtype: DataType::F64,
        })
    }

    /// 从维度名（String）创建
    pub fn from_owned_dims(
        name: impl Into<String>,
        dims: Vec<String>,
        data: ArrayD<f64>,
    ) -> NbResult<Self> {
        let name = name.into();
        NbError::check_rank(&name, dims.len(), data.ndim())?;
        Ok(Self {
            name,
            dims,
            data,
            attrs: Attributes::new(),
            dtype: DataType::F64,
        })
    }

    /// 标量变量
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            dims: Vec::new(),
            data: ArrayD::from_elem(IxDyn(&[]), value),
            attrs: Attributes::new(),
            dtype: DataType::F64,
        }
    }

    /// 一维变量
    pub fn from_vec(name: impl Into<String>, dim: &str, values: Vec<f64>) -> Self {
        let n = values.len();
        Self {
            name: name.into(),
            dims: vec![dim.to_string()],
            data: ArrayD::from_shape_vec(IxDyn(&[n]), values)
                .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0]))),
            attrs: Attributes::new(),
            dtype: DataType::F64,
        }
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 维度名
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// 形状
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 维数
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// 元素数
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 数据视图
    pub fn data(&self) -> ArrayViewD<'_, f64> {
        self.data.view()
    }

    /// 可变数据视图（形状不可变）
    pub fn data_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    /// 取出数据
    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }

    /// 标量值（0 维或单元素）
    pub fn scalar_value(&self) -> Option<f64> {
        if self.data.len() == 1 {
            self.data.iter().next().copied()
        } else {
            None
        }
    }

    /// 数据拷贝为 Vec（行优先）
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// 属性表
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// 读取属性
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// 读取文本属性
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }

    /// 设置属性
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// 移除属性
    pub fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.remove(name)
    }

    /// 链式设置属性
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// 存储类型
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// 链式设置存储类型
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    /// 填充值
    pub fn fill_value(&self) -> Option<f64> {
        self.attr(FILL_VALUE_ATTR).and_then(AttrValue::as_number)
    }

    /// 是否含缺测 (NaN)
    pub fn has_missing(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }

    /// 维度名所在轴
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    fn require_axis(&self, dim: &str) -> NbResult<usize> {
        self.axis_of(dim).ok_or_else(|| {
            NbError::schema(format!(
                "变量 {} 没有维度 {} (维度: {:?})",
                self.name, dim, self.dims
            ))
        })
    }

    /// 沿某维取单个索引，该维被移除
    pub fn select(&self, dim: &str, index: usize) -> NbResult<Variable> {
        let axis = self.require_axis(dim)?;
        let len = self.data.shape()[axis];
        if index >= len {
            return Err(NbError::schema(format!(
                "变量 {} 维度 {} 索引 {} 越界 (长度 {})",
                self.name, dim, index, len
            )));
        }
        let data = self.data.index_axis(Axis(axis), index).to_owned();
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Ok(Self {
            name: self.name.clone(),
            dims,
            data,
            attrs: self.attrs.clone(),
            dtype: self.dtype,
        })
    }

    /// 沿某维取多个索引，该维保留
    pub fn select_indices(&self, dim: &str, indices: &[usize]) -> NbResult<Variable> {
        let axis = self.require_axis(dim)?;
        let len = self.data.shape()[axis];
        if let Some(bad) = indices.iter().find(|&&i| i >= len) {
            return Err(NbError::schema(format!(
                "变量 {} 维度 {} 索引 {} 越界 (长度 {})",
                self.name, dim, bad, len
            )));
        }
        Ok(Self {
            name: self.name.clone(),
            dims: self.dims.clone(),
            data: self.data.select(Axis(axis), indices),
            attrs: self.attrs.clone(),
            dtype: self.dtype,
        })
    }

    /// 去掉所有长度为 1 的维
    pub fn squeeze(&self) -> Variable {
        let mut data = self.data.clone();
        let mut dims = self.dims.clone();
        for axis in (0..data.ndim()).rev() {
            if data.shape()[axis] == 1 {
                data = data.index_axis_move(Axis(axis), 0);
                dims.remove(axis);
            }
        }
        Self {
            name: self.name.clone(),
            dims,
            data,
            attrs: self.attrs.clone(),
            dtype: self.dtype,
        }
    }

    /// 按给定维度顺序重排
    ///
    /// `order` 中不存在于本变量的维度名被忽略；本变量中未出现在 `order` 的维度
    /// 保持相对顺序并排在最后。
    pub fn transposed(&self, order: &[&str]) -> Variable {
        let mut perm: Vec<usize> = order.iter().filter_map(|d| self.axis_of(d)).collect();
        for axis in 0..self.dims.len() {
            if !perm.contains(&axis) {
                perm.push(axis);
            }
        }
        let data = self
            .data
            .clone()
            .permuted_axes(IxDyn(&perm))
            .as_standard_layout()
            .to_owned();
        let dims = perm.iter().map(|&a| self.dims[a].clone()).collect();
        Self {
            name: self.name.clone(),
            dims,
            data,
            attrs: self.attrs.clone(),
            dtype: self.dtype,
        }
    }

    /// 同形状全零变量
    pub fn zeros_like(&self, name: impl Into<String>) -> Variable {
        Self {
            name: name.into(),
            dims: self.dims.clone(),
            data: ArrayD::zeros(self.data.raw_dim()),
            attrs: Attributes::new(),
            dtype: self.dtype,
        }
    }

    /// 替换数据，形状必须不变
    pub fn with_data(mut self, data: ArrayD<f64>) -> NbResult<Self> {
        NbError::check_shape(&self.name, self.data.shape(), data.shape())?;
        self.data = data;
        Ok(self)
    }

    /// 重命名变量
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 重命名维度
    pub fn rename_dim(&mut self, old: &str, new: &str) {
        for d in self.dims.iter_mut() {
            if d == old {
                *d = new.to_string();
            }
        }
    }
}

// ============================================================
// 数据集
// ============================================================

/// 数据集
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    dims: Vec<Dimension>,
    vars: Vec<Variable>,
    attrs: Attributes,
}

impl Dataset {
    /// 创建空数据集
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有维度
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// 查找维度
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    /// 维度长度
    pub fn dim_len(&self, name: &str) -> Option<usize> {
        self.dimension(name).map(|d| d.len)
    }

    /// 添加维度；同名维度已存在时长度必须一致
    pub fn add_dimension(&mut self, name: &str, len: usize) -> NbResult<()> {
        match self.dimension(name) {
            Some(d) if d.len == len => Ok(()),
            Some(d) => Err(NbError::shape_mismatch(
                format!("维度 {}", name),
                &[d.len],
                &[len],
            )),
            None => {
                self.dims.push(Dimension {
                    name: name.to_string(),
                    len,
                    is_unlimited: false,
                });
                Ok(())
            }
        }
    }

    /// 标记无限维
    pub fn set_unlimited(&mut self, name: &str) {
        if let Some(d) = self.dims.iter_mut().find(|d| d.name == name) {
            d.is_unlimited = true;
        }
    }

    /// 添加或替换变量，自动登记缺失的维度
    pub fn add_variable(&mut self, var: Variable) -> NbResult<()> {
        for (dim, &len) in var.dims.iter().zip(var.shape()) {
            if let Some(existing) = self.dimension(dim) {
                if existing.len != len {
                    return Err(NbError::shape_mismatch(
                        format!("{} 的维度 {}", var.name, dim),
                        &[existing.len],
                        &[len],
                    ));
                }
            }
        }
        for (dim, &len) in var.dims.iter().zip(var.shape()) {
            self.add_dimension(dim, len)?;
        }
        match self.vars.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var,
            None => self.vars.push(var),
        }
        Ok(())
    }

    /// 所有变量
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// 变量名列表
    pub fn variable_names(&self) -> Vec<String> {
        self.vars.iter().map(|v| v.name.clone()).collect()
    }

    /// 是否包含变量
    pub fn contains(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name == name)
    }

    /// 查找变量
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// 查找变量（可变）
    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.iter_mut().find(|v| v.name == name)
    }

    /// 必需变量
    pub fn require(&self, name: &str) -> NbResult<&Variable> {
        self.variable(name)
            .ok_or_else(|| NbError::variable_not_found(name, self.variable_names()))
    }

    /// 按别名顺序查找第一个存在的变量
    pub fn find_variable(&self, aliases: &[&str]) -> Option<&Variable> {
        aliases.iter().find_map(|a| self.variable(a))
    }

    /// 移除变量
    pub fn remove_variable(&mut self, name: &str) -> Option<Variable> {
        let pos = self.vars.iter().position(|v| v.name == name)?;
        Some(self.vars.remove(pos))
    }

    /// 全局属性
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// 读取全局文本属性
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(AttrValue::as_text)
    }

    /// 设置全局属性
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// 同时重命名维度和同名变量（例如 `latitude` -> `lat`）
    pub fn rename(&mut self, old: &str, new: &str) {
        if let Some(d) = self.dims.iter_mut().find(|d| d.name == old) {
            d.name = new.to_string();
        }
        for v in self.vars.iter_mut() {
            if v.name == old {
                v.name = new.to_string();
            }
            v.rename_dim(old, new);
        }
    }

    /// 删除没有变量使用的维度
    pub fn prune_dimensions(&mut self) {
        let vars = &self.vars;
        self.dims
            .retain(|d| vars.iter().any(|v| v.dims.iter().any(|n| *n == d.name)));
    }

    /// 沿某维取子集，所有使用该维的变量同步裁剪
    pub fn select_indices(&self, dim: &str, indices: &[usize]) -> NbResult<Dataset> {
        let mut out = Dataset {
            dims: Vec::new(),
            vars: Vec::new(),
            attrs: self.attrs.clone(),
        };
        for d in &self.dims {
            let len = if d.name == dim { indices.len() } else { d.len };
            out.dims.push(Dimension {
                name: d.name.clone(),
                len,
                is_unlimited: d.is_unlimited,
            });
        }
        for v in &self.vars {
            let v = if v.axis_of(dim).is_some() {
                v.select_indices(dim, indices)?
            } else {
                v.clone()
            };
            out.vars.push(v);
        }
        Ok(out)
    }

    /// 检查所有变量与维度表一致
    pub fn validate(&self) -> NbResult<()> {
        for v in &self.vars {
            for (dim, &len) in v.dims.iter().zip(v.shape()) {
                match self.dim_len(dim) {
                    Some(expected) if expected == len => {}
                    Some(expected) => {
                        return Err(NbError::shape_mismatch(
                            format!("{} 的维度 {}", v.name, dim),
                            &[expected],
                            &[len],
                        ))
                    }
                    None => {
                        return Err(NbError::schema(format!(
                            "变量 {} 引用了未定义的维度 {}",
                            v.name, dim
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}
