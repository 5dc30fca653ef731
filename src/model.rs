use std::{collections::HashSet, fmt};

use crate::{
    dtype::DType,
    layer::Layer,
    shape::SymbolicShape,
    tensor::Tensor,
};

/// A named literal tensor owned by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub id: String,
    pub tensor: Tensor,
}

impl Constant {
    pub fn new(id: impl Into<String>, tensor: Tensor) -> Self {
        Self { id: id.into(), tensor }
    }
}

/// A declared graph input: dtype and (possibly symbolic) shape, no value.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphInput {
    pub id: String,
    pub dtype: DType,
    pub shape: SymbolicShape,
}

impl GraphInput {
    pub fn new(id: impl Into<String>, dtype: DType, shape: impl Into<SymbolicShape>) -> Self {
        Self { id: id.into(), dtype, shape: shape.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelError {
    UnknownIdentifier(String),
    DuplicateIdentifier(String),
    InputArity { layer: String, op: String, got: usize },
    OutputArity { layer: String, op: String, got: usize },
    NotTopologicallyOrdered { layer: String, input: String },
    MissingDeclaredOutput(String),
    TypeMismatch { id: String, expected: DType, got: DType },
}

/// The operator graph: an ordered, topologically sorted layer list plus
/// constants, declared inputs and declared outputs.
///
/// Passes mutate the model in place and must uphold three invariants on
/// exit: every referenced identifier resolves, the layer order remains
/// topological, and the declared output set is unchanged (with each output
/// still produced by some constant or layer).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub layers: Vec<Layer>,
    pub constants: Vec<Constant>,
    pub inputs: Vec<GraphInput>,
    pub outputs: Vec<String>,
}

impl Model {
    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn add_constant(&mut self, constant: Constant) {
        self.constants.push(constant);
    }

    pub fn add_input(&mut self, input: GraphInput) {
        self.inputs.push(input);
    }

    pub fn register_output(&mut self, id: impl Into<String>) {
        self.outputs.push(id.into());
    }

    pub fn constant(&self, id: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.id == id)
    }

    pub fn is_input(&self, id: &str) -> bool {
        self.inputs.iter().any(|i| i.id == id)
    }

    /// The layer defining `id` as one of its outputs, if any.
    pub fn producer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.used_outputs().any(|o| o == id))
    }

    /// Structural validation: unique definitions, per-kind arities,
    /// topological ordering and satisfiability of the declared outputs.
    pub fn check_valid(&self) -> Result<(), ModelError> {
        let mut defined = HashSet::new();

        for constant in &self.constants {
            if !defined.insert(constant.id.as_str()) {
                return Err(ModelError::DuplicateIdentifier(constant.id.clone()));
            }
        }

        for input in &self.inputs {
            if !defined.insert(input.id.as_str()) {
                return Err(ModelError::DuplicateIdentifier(input.id.clone()));
            }
        }

        for layer in &self.layers {
            let id = layer.primary_output().to_string();

            if !layer.arity_ok() {
                let (min, max) = layer.op.input_arity();
                return Err(if (min..=max).contains(&layer.inputs.len()) {
                    ModelError::OutputArity { layer: id, op: layer.op.opname(), got: layer.outputs.len() }
                } else {
                    ModelError::InputArity { layer: id, op: layer.op.opname(), got: layer.inputs.len() }
                });
            }

            for input in layer.used_inputs() {
                if !defined.contains(input) {
                    return Err(ModelError::NotTopologicallyOrdered {
                        layer: id,
                        input: input.to_string(),
                    });
                }
            }

            for output in layer.used_outputs() {
                if !defined.insert(output) {
                    return Err(ModelError::DuplicateIdentifier(output.to_string()));
                }
            }
        }

        for output in &self.outputs {
            if !defined.contains(output.as_str()) {
                return Err(ModelError::MissingDeclaredOutput(output.clone()));
            }
        }

        Ok(())
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model(")?;

        for (i, input) in self.inputs.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}: {:?}{:?}", input.id, input.dtype, input.shape)?;
        }

        writeln!(f, ") {{")?;

        for constant in &self.constants {
            writeln!(f, "    %{}: constant<{:?}>", constant.id, constant.tensor)?;
        }

        for layer in &self.layers {
            writeln!(f, "    {layer}")?;
        }

        write!(f, "    return ")?;
        for (i, output) in self.outputs.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{output}")?;
        }

        writeln!(f)?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{BinaryOp, LayerOp};

    fn int_const(id: &str, values: Vec<i32>) -> Constant {
        let len = values.len();
        Constant::new(id, Tensor::from_ints([len], values))
    }

    #[test]
    fn valid_model() -> Result<(), ModelError> {
        let mut model = Model::default();
        model.add_constant(int_const("c", vec![1, 2, 3]));
        model.add_input(GraphInput::new("x", DType::I32, SymbolicShape::unknown(1)));
        model.add_layer(Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", "c"], ["y"]));
        model.register_output("y");

        model.check_valid()
    }

    #[test]
    fn out_of_order_layers() {
        let mut model = Model::default();
        model.add_input(GraphInput::new("x", DType::I32, SymbolicShape::unknown(1)));
        model.add_layer(Layer::new(LayerOp::Binary(BinaryOp::Add), ["x", "y"], ["z"]));
        model.add_layer(Layer::identity("y", "x"));
        model.register_output("z");

        assert_eq!(
            model.check_valid(),
            Err(ModelError::NotTopologicallyOrdered { layer: "z".to_string(), input: "y".to_string() })
        );
    }

    #[test]
    fn arity_violation_is_fatal() {
        let mut model = Model::default();
        model.add_input(GraphInput::new("x", DType::I32, SymbolicShape::unknown(1)));
        model.add_layer(Layer::new(LayerOp::Binary(BinaryOp::Add), ["x"], ["z"]));
        model.register_output("z");

        assert_eq!(
            model.check_valid(),
            Err(ModelError::InputArity { layer: "z".to_string(), op: "binary.add".to_string(), got: 1 })
        );
    }

    #[test]
    fn unsatisfied_output() {
        let mut model = Model::default();
        model.register_output("nope");

        assert_eq!(model.check_valid(), Err(ModelError::MissingDeclaredOutput("nope".to_string())));
    }
}
