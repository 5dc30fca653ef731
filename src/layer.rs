use std::fmt;

use crate::{
    dtype::{DType, DTypeValue},
    hash,
};

/// Elementwise binary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Min,
    Max,
}

impl BinaryOp {
    pub fn evaluate(self, lhs: DTypeValue, rhs: DTypeValue) -> Option<DTypeValue> {
        match (lhs, rhs) {
            (DTypeValue::F32(x), DTypeValue::F32(y)) => Some(DTypeValue::F32(self.evaluate_f32(x, y))),
            (DTypeValue::I32(x), DTypeValue::I32(y)) => Some(DTypeValue::I32(self.evaluate_i32(x, y))),
            _ => None,
        }
    }

    pub fn evaluate_f32(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Min => lhs.min(rhs),
            Self::Max => lhs.max(rhs),
        }
    }

    pub fn evaluate_i32(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Min => lhs.min(rhs),
            Self::Max => lhs.max(rhs),
        }
    }
}

/// Elementwise unary operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Relu,
    Sqrt,
}

impl UnaryOp {
    pub fn evaluate(self, value: DTypeValue) -> Option<DTypeValue> {
        match value {
            DTypeValue::F32(x) => Some(DTypeValue::F32(match self {
                Self::Neg => -x,
                Self::Abs => x.abs(),
                Self::Relu => x.max(0.0),
                Self::Sqrt => x.sqrt(),
            })),
            DTypeValue::I32(x) => match self {
                Self::Neg => Some(DTypeValue::I32(-x)),
                Self::Abs => Some(DTypeValue::I32(x.abs())),
                Self::Relu => Some(DTypeValue::I32(x.max(0))),
                Self::Sqrt => None,
            },
        }
    }
}

/// One operator kind together with its kind-specific attributes.
///
/// Attribute equality is the derived `PartialEq`: exhaustive over the typed
/// fields of each variant, with sequence attributes compared element-wise.
/// A layer's identity (its output names) lives on [`Layer`], outside this
/// enum, so two ops compare equal iff they would compute the same function
/// of their inputs.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerOp {
    Identity,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Cast { to: DType },
    Concat { axis: usize },
    Split { axis: usize, parts: usize },
    Shape,
    Reshape,
    RandomUniform { shape: Vec<usize>, low: f32, high: f32, seed: u64 },
    RandomNormal { shape: Vec<usize>, mean: f32, stddev: f32, seed: u64 },
}

impl LayerOp {
    pub fn opname(&self) -> String {
        match self {
            Self::Identity => "identity".to_string(),
            Self::Binary(op) => format!("binary.{op:?}").to_lowercase(),
            Self::Unary(op) => format!("unary.{op:?}").to_lowercase(),
            Self::Cast { to } => format!("cast<{to:?}>"),
            Self::Concat { axis } => format!("concat<{axis}>"),
            Self::Split { axis, parts } => format!("split<{axis}, {parts}>"),
            Self::Shape => "shape".to_string(),
            Self::Reshape => "reshape".to_string(),
            Self::RandomUniform { .. } => "random.uniform".to_string(),
            Self::RandomNormal { .. } => "random.normal".to_string(),
        }
    }

    /// Whether the output is a pure function of the inputs. Folding must
    /// never touch kinds that answer false: their output depends on sampler
    /// state and has to remain dynamic even when every input is constant.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Self::RandomUniform { .. } | Self::RandomNormal { .. })
    }

    /// Valid input slot counts, `(min, max)` inclusive.
    pub fn input_arity(&self) -> (usize, usize) {
        match self {
            Self::Identity | Self::Unary(_) | Self::Cast { .. } | Self::Split { .. } | Self::Shape => (1, 1),
            Self::Binary(_) | Self::Reshape => (2, 2),
            Self::Concat { .. } => (1, usize::MAX),
            Self::RandomUniform { .. } | Self::RandomNormal { .. } => (0, 0),
        }
    }

    pub fn output_arity(&self) -> usize {
        match self {
            Self::Split { parts, .. } => *parts,
            _ => 1,
        }
    }
}

/// One operator instance in the model graph.
///
/// `inputs` are ordered identifier references; an empty string denotes an
/// unused optional slot. `outputs` are the identifiers this layer defines,
/// with `outputs[0]` the primary output naming the layer itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub op: LayerOp,
}

impl Layer {
    pub fn new(
        op: LayerOp,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            op,
        }
    }

    /// Pass-through layer binding `output` to the value of `input`.
    pub fn identity(output: impl Into<String>, input: impl Into<String>) -> Self {
        Self::new(LayerOp::Identity, [input.into()], [output.into()])
    }

    pub fn primary_output(&self) -> &str {
        &self.outputs[0]
    }

    pub fn used_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str).filter(|id| !id.is_empty())
    }

    pub fn used_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str).filter(|id| !id.is_empty())
    }

    pub fn arity_ok(&self) -> bool {
        let (min, max) = self.op.input_arity();
        (min..=max).contains(&self.inputs.len()) && self.outputs.len() == self.op.output_arity()
    }

    /// Cheap structural hash over kind and input identifiers, used to bucket
    /// merge candidates. Equal layers hash equal; the converse is settled by
    /// full attribute comparison.
    pub fn structural_hash(&self) -> u64 {
        let mut seed = hash::hash_one(&self.op.opname());
        for input in &self.inputs {
            hash::combine(&mut seed, input.as_str());
        }
        seed
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, output) in self.outputs.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{output}")?;
        }

        write!(f, " = {}(", self.op.opname())?;

        for (i, input) in self.inputs.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{input}")?;
        }

        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_equality() {
        assert_eq!(LayerOp::Binary(BinaryOp::Add), LayerOp::Binary(BinaryOp::Add));
        assert_ne!(LayerOp::Binary(BinaryOp::Add), LayerOp::Binary(BinaryOp::Mul));
        assert_ne!(LayerOp::Concat { axis: 0 }, LayerOp::Concat { axis: 1 });
        assert_ne!(
            LayerOp::RandomUniform { shape: vec![2], low: 0.0, high: 1.0, seed: 0 },
            LayerOp::RandomUniform { shape: vec![3], low: 0.0, high: 1.0, seed: 0 },
        );
    }

    #[test]
    fn determinism_capability() {
        assert!(LayerOp::Binary(BinaryOp::Add).is_deterministic());
        assert!(LayerOp::Shape.is_deterministic());
        assert!(!LayerOp::RandomUniform { shape: vec![1], low: 0.0, high: 1.0, seed: 0 }.is_deterministic());
        assert!(!LayerOp::RandomNormal { shape: vec![1], mean: 0.0, stddev: 1.0, seed: 0 }.is_deterministic());
    }

    #[test]
    fn structural_hash_buckets() {
        let a = Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", "y"], ["a"]);
        let b = Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", "y"], ["b"]);
        let c = Layer::new(LayerOp::Binary(BinaryOp::Add), ["y", "x"], ["c"]);

        // output names do not contribute
        assert_eq!(a.structural_hash(), b.structural_hash());
        // input order does
        assert_ne!(a.structural_hash(), c.structural_hash());
    }

    #[test]
    fn arity() {
        assert!(Layer::new(LayerOp::Binary(BinaryOp::Sub), ["x", "y"], ["z"]).arity_ok());
        assert!(!Layer::new(LayerOp::Binary(BinaryOp::Sub), ["x"], ["z"]).arity_ok());
        assert!(Layer::new(LayerOp::Concat { axis: 0 }, ["x", "y", "z"], ["w"]).arity_ok());
        assert!(Layer::new(LayerOp::Split { axis: 0, parts: 2 }, ["x"], ["a", "b"]).arity_ok());
        assert!(!Layer::new(LayerOp::Split { axis: 0, parts: 2 }, ["x"], ["a"]).arity_ok());
    }
}
