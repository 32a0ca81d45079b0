// crates/nb_io/src/drivers/netcdf/driver.rs

//! NetCDF 驱动实现

use std::path::Path;

use super::error::NetCdfError;
use crate::dataset::Dataset;
use crate::store::{DatasetStore, WriteOptions};
use nb_foundation::NbResult;

/// NetCDF 文件存储
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCdfStore;

impl NetCdfStore {
    /// 创建存储
    pub fn new() -> Self {
        Self
    }

    /// 是否编译了 NetCDF 支持
    pub fn is_available() -> bool {
        cfg!(feature = "netcdf")
    }
}

impl DatasetStore for NetCdfStore {
    fn read(&self, path: &Path) -> NbResult<Dataset> {
        if !path.exists() {
            return Err(NetCdfError::FileNotFound(path.to_path_buf()).into());
        }
        imp::read(path)
    }

    fn write(&self, path: &Path, dataset: &Dataset, options: &WriteOptions) -> NbResult<()> {
        dataset.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = crate::store::temp_path(path);
        if let Err(e) = imp::write(&tmp, dataset, options) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!("已写出 {}", path.display());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove(&self, path: &Path) -> NbResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "netcdf"
    }
}

// ============================================================
// netcdf 实现
// ============================================================

#[cfg(feature = "netcdf")]
mod imp {
    use ndarray::{ArrayD, IxDyn};
    use std::path::Path;

    use super::NetCdfError;
    use crate::dataset::{
        AttrValue, DataType, Dataset, Variable, FILL_VALUE_ATTR, MISSING_VALUE_ATTR,
    };
    use crate::store::WriteOptions;
    use nb_foundation::NbResult;

    const SCALE_FACTOR_ATTR: &str = "scale_factor";
    const ADD_OFFSET_ATTR: &str = "add_offset";

    fn convert_attr(value: netcdf::AttributeValue) -> Option<AttrValue> {
        use netcdf::AttributeValue as A;
        let v = match value {
            A::Str(s) => AttrValue::Text(s),
            A::Strs(s) => AttrValue::Text(s.join(",")),
            A::Double(x) => AttrValue::Number(x),
            A::Float(x) => AttrValue::Number(x as f64),
            A::Int(x) => AttrValue::Number(x as f64),
            A::Short(x) => AttrValue::Number(x as f64),
            A::Longlong(x) => AttrValue::Number(x as f64),
            A::Schar(x) => AttrValue::Number(x as f64),
            A::Doubles(v) => AttrValue::Numbers(v),
            A::Floats(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            A::Ints(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            A::Shorts(v) => AttrValue::Numbers(v.into_iter().map(f64::from).collect()),
            _ => return None,
        };
        Some(v)
    }

    /// CF 解码：填充值/缺测值转 NaN，再应用 scale_factor / add_offset
    fn decode_cf(var: &mut Variable) {
        let sentinels: Vec<f64> = [FILL_VALUE_ATTR, MISSING_VALUE_ATTR]
            .iter()
            .filter_map(|a| var.attr(a).and_then(AttrValue::as_number))
            .collect();
        let scale = var
            .remove_attr(SCALE_FACTOR_ATTR)
            .and_then(|a| a.as_number())
            .unwrap_or(1.0);
        let offset = var
            .remove_attr(ADD_OFFSET_ATTR)
            .and_then(|a| a.as_number())
            .unwrap_or(0.0);

        let mut data = var.data_mut();
        data.mapv_inplace(|v| {
            if sentinels.iter().any(|s| *s == v) {
                f64::NAN
            } else {
                v * scale + offset
            }
        });
    }

    pub(super) fn read(path: &Path) -> NbResult<Dataset> {
        let file = netcdf::open(path).map_err(|e| NetCdfError::OpenFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut ds = Dataset::new();
        for dim in file.dimensions() {
            ds.add_dimension(&dim.name(), dim.len())?;
            if dim.is_unlimited() {
                ds.set_unlimited(&dim.name());
            }
        }

        for var in file.variables() {
            let name = var.name();
            let values = match var.get_values::<f64, _>(..) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("跳过非数值变量 {}: {}", name, e);
                    continue;
                }
            };
            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
                .map_err(|e| NetCdfError::read(&name, e))?;

            let mut variable = Variable::from_owned_dims(name.clone(), dims, data)?;
            for attr in var.attributes() {
                let value = attr.value().map_err(|e| NetCdfError::read(&name, e))?;
                if let Some(v) = convert_attr(value) {
                    variable.set_attr(attr.name(), v);
                }
            }
            decode_cf(&mut variable);
            ds.add_variable(variable)?;
        }

        for attr in file.attributes() {
            if let Ok(value) = attr.value() {
                if let Some(v) = convert_attr(value) {
                    ds.set_attr(attr.name(), v);
                }
            }
        }
        Ok(ds)
    }

    fn put_number(
        var: &mut netcdf::VariableMut<'_>,
        dtype: DataType,
        name: &str,
        value: f64,
    ) -> Result<(), netcdf::Error> {
        match dtype {
            DataType::F32 => var.put_attribute(name, value as f32).map(|_| ()),
            DataType::F64 => var.put_attribute(name, value).map(|_| ()),
            DataType::I32 => var.put_attribute(name, value as i32).map(|_| ()),
        }
    }

    fn write_variable(
        file: &mut netcdf::FileMut,
        var: &Variable,
        options: &WriteOptions,
    ) -> Result<(), NetCdfError> {
        let name = var.name();
        let dims: Vec<&str> = var.dims().iter().map(String::as_str).collect();
        let fill = var.fill_value();
        let dtype = var.dtype();

        // NaN 编码为填充值；没有填充值时保留 NaN
        let encoded: Vec<f64> = var
            .data()
            .iter()
            .map(|&v| match (v.is_nan(), fill) {
                (true, Some(f)) => f,
                _ => v,
            })
            .collect();

        let mut nc_var = match dtype {
            DataType::F32 => file.add_variable::<f32>(name, &dims),
            DataType::F64 => file.add_variable::<f64>(name, &dims),
            DataType::I32 => file.add_variable::<i32>(name, &dims),
        }
        .map_err(|e| NetCdfError::write(name, e))?;

        if let Some(level) = options.compression {
            if !dims.is_empty() {
                nc_var
                    .set_compression(level, options.shuffle)
                    .map_err(|e| NetCdfError::write(name, e))?;
            }
        }

        if let Some(f) = fill {
            match dtype {
                DataType::F32 => nc_var.set_fill_value(f as f32),
                DataType::F64 => nc_var.set_fill_value(f),
                DataType::I32 => nc_var.set_fill_value(f as i32),
            }
            .map_err(|e| NetCdfError::write(format!("{}:{}", name, FILL_VALUE_ATTR), e))?;
        }

        for (attr_name, value) in var.attrs() {
            if attr_name == FILL_VALUE_ATTR {
                continue;
            }
            let result = match value {
                AttrValue::Text(s) => nc_var.put_attribute(attr_name, s.as_str()).map(|_| ()),
                AttrValue::Number(x) if attr_name == MISSING_VALUE_ATTR => {
                    put_number(&mut nc_var, dtype, attr_name, *x)
                }
                AttrValue::Number(x) => nc_var.put_attribute(attr_name, *x).map(|_| ()),
                AttrValue::Numbers(v) => nc_var.put_attribute(attr_name, v.clone()).map(|_| ()),
            };
            result.map_err(|e| NetCdfError::write(format!("{}:{}", name, attr_name), e))?;
        }

        let written = match dtype {
            DataType::F32 => {
                let data: Vec<f32> = encoded.iter().map(|&v| v as f32).collect();
                nc_var.put_values(&data, ..)
            }
            DataType::F64 => nc_var.put_values(&encoded, ..),
            DataType::I32 => {
                let data: Vec<i32> = encoded.iter().map(|&v| v.round() as i32).collect();
                nc_var.put_values(&data, ..)
            }
        };
        written.map_err(|e| NetCdfError::write(name, e))?;
        Ok(())
    }

    pub(super) fn write(path: &Path, ds: &Dataset, options: &WriteOptions) -> NbResult<()> {
        let mut file = netcdf::create_with(
            path,
            netcdf::Options::NETCDF4 | netcdf::Options::CLASSIC,
        )
        .map_err(|e| NetCdfError::write(path.display().to_string(), e))?;

        for dim in ds.dimensions() {
            file.add_dimension(&dim.name, dim.len)
                .map_err(|e| NetCdfError::write(format!("维度 {}", dim.name), e))?;
        }
        for var in ds.variables() {
            write_variable(&mut file, var, options)?;
        }
        for (name, value) in ds.attrs() {
            let result = match value {
                AttrValue::Text(s) => file.add_attribute(name, s.as_str()).map(|_| ()),
                AttrValue::Number(x) => file.add_attribute(name, *x).map(|_| ()),
                AttrValue::Numbers(v) => file.add_attribute(name, v.clone()).map(|_| ()),
            };
            result.map_err(|e| NetCdfError::write(format!("全局属性 {}", name), e))?;
        }
        Ok(())
    }
}

#[cfg(not(feature = "netcdf"))]
mod imp {
    use std::path::Path;

    use super::NetCdfError;
    use crate::dataset::Dataset;
    use crate::store::WriteOptions;
    use nb_foundation::NbResult;

    pub(super) fn read(_path: &Path) -> NbResult<Dataset> {
        Err(NetCdfError::NotAvailable.into())
    }

    pub(super) fn write(_path: &Path, _ds: &Dataset, _options: &WriteOptions) -> NbResult<()> {
        Err(NetCdfError::NotAvailable.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = NetCdfStore::new();
        let err = store.read(&dir.path().join("absent.nc")).unwrap_err();
        assert!(err.is_missing_input());
        assert!(!store.exists(&dir.path().join("absent.nc")));
        assert!(store.remove(&dir.path().join("absent.nc")).is_ok());
    }

    #[cfg(not(feature = "netcdf"))]
    #[test]
    fn test_not_available_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.nc");
        let err = NetCdfStore::new()
            .write(&path, &Dataset::new(), &WriteOptions::default())
            .unwrap_err();
        assert_eq!(err.category(), nb_foundation::ErrorCategory::Configuration);
        assert!(!path.exists());
        assert!(!crate::store::temp_path(&path).exists());
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn test_round_trip_with_fill() {
        use crate::dataset::{DataType, Variable};
        use ndarray::{ArrayD, IxDyn};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("rt.nc");

        let data = ArrayD::from_shape_vec(IxDyn(&[1, 2, 2]), vec![1.0, f64::NAN, 3.0, 4.0]).unwrap();
        let var = Variable::new("sla", &["time", "y", "x"], data)
            .unwrap()
            .with_attr("units", "m")
            .with_attr("_FillValue", -999.0)
            .with_dtype(DataType::F32);
        let mut ds = Dataset::new();
        ds.add_variable(var).unwrap();
        ds.add_variable(Variable::scalar("z_inc_dateb", 20250701.0)).unwrap();
        ds.set_attr("description", "round trip");

        let store = NetCdfStore::new();
        store
            .write(&path, &ds, &WriteOptions::compressed(1, true))
            .unwrap();
        assert!(!crate::store::temp_path(&path).exists());

        let back = store.read(&path).unwrap();
        let sla = back.require("sla").unwrap();
        assert_eq!(sla.shape(), &[1, 2, 2]);
        assert!(sla.data()[[0, 0, 1]].is_nan());
        assert_eq!(sla.data()[[0, 1, 1]], 4.0);
        assert_eq!(sla.attr_text("units"), Some("m"));
        assert_eq!(
            back.require("z_inc_dateb").unwrap().scalar_value(),
            Some(20250701.0)
        );
        assert_eq!(back.attr_text("description"), Some("round trip"));
    }
}
