use crate::types::{DType, Scalar, ShapeDim, TensorType};

/// A tensor whose elements all hold `fill`.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorVal {
    pub dtype: DType,
    pub shape: Vec<ShapeDim>,
    pub fill: Scalar,
}

impl TensorVal {
    pub fn from_type(t: &TensorType, fill: Scalar) -> Self {
        Self {
            dtype: t.dtype,
            shape: t.shape.clone(),
            fill,
        }
    }

    pub fn new(dtype: DType, shape: Vec<ShapeDim>, fill: Scalar) -> Self {
        Self { dtype, shape, fill }
    }

    pub fn scalar(fill: Scalar) -> Self {
        Self {
            dtype: fill.dtype(),
            shape: Vec::new(),
            fill,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.fill.as_bool()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.fill.as_i64()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.fill.as_f64()
    }
}

pub fn format_value_human(v: &TensorVal) -> String {
    if v.shape.is_empty() {
        return format!("{}", v.fill);
    }
    let mut shape = String::from("(");
    for (i, d) in v.shape.iter().enumerate() {
        if i > 0 {
            shape.push(',');
        }
        match d {
            ShapeDim::Known(n) => shape.push_str(&n.to_string()),
            ShapeDim::Sym(sym) => shape.push_str(sym),
        }
    }
    shape.push(')');
    format!("Tensor[{},{shape}] fill={}", v.dtype, v.fill)
}
