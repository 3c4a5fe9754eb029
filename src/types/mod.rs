//! Basic tensor type definitions.
//!
//! # Example
//! ```
//! use mind_loops::types::{DType, ShapeDim, TensorType};
//! let ty = TensorType::new(DType::F32, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
//! assert_eq!(ty.shape.len(), 2);
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    I32,
    F32,
}

impl DType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, DType::Bool)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::I32 => "i32",
            DType::F32 => "f32",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeDim {
    Known(usize),
    Sym(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Vec<ShapeDim>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: Vec<ShapeDim>) -> Self {
        Self { dtype, shape }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self { dtype, shape: Vec::new() }
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match dim {
                ShapeDim::Known(n) => write!(f, "{n}")?,
                ShapeDim::Sym(sym) => f.write_str(sym)?,
            }
        }
        f.write_str("]")
    }
}

/// A single element value. Constants and interpreter values are uniform
/// fills of one scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn dtype(self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int(_) => DType::I32,
            Scalar::Float(_) => DType::F32,
        }
    }

    /// Scalar of the given dtype holding `value`; integers truncate.
    pub fn from_f64(dtype: DType, value: f64) -> Self {
        match dtype {
            DType::Bool => Scalar::Bool(value != 0.0),
            DType::I32 => Scalar::Int(value as i64),
            DType::F32 => Scalar::Float(value),
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(v as f64),
            Scalar::Float(v) => Some(v),
            Scalar::Bool(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => {
                let s = format!("{v:.6}");
                f.write_str(s.trim_end_matches('0').trim_end_matches('.'))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DType, Scalar, ShapeDim, TensorType};

    #[test]
    fn tensor_type_new_covers_constructor() {
        let t = TensorType::new(DType::F32, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
        assert_eq!(t.dtype, DType::F32);
        assert_eq!(t.shape, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
        assert_eq!(t.to_string(), "f32[2,3]");
    }

    #[test]
    fn tensor_type_with_symbolic_dim() {
        let t = TensorType::new(DType::I32, vec![ShapeDim::Sym("B"), ShapeDim::Known(128)]);
        assert!(matches!(t.shape[0], ShapeDim::Sym("B")));
        assert_eq!(t.to_string(), "i32[B,128]");
    }

    #[test]
    fn scalar_display_trims_floats() {
        assert_eq!(Scalar::Float(2.5).to_string(), "2.5");
        assert_eq!(Scalar::Float(8.0).to_string(), "8");
        assert_eq!(Scalar::from_f64(DType::I32, 3.9), Scalar::Int(3));
    }
}
