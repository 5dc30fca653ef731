pub mod fold_constants;
pub mod remove_duplicates;
pub mod remove_unused;

pub use fold_constants::FoldConstants;
pub use remove_duplicates::{RemoveDuplicateConstants, RemoveDuplicateLayers};
pub use remove_unused::RemoveUnused;

use crate::{
    backend::BackendError,
    model::{Model, ModelError},
};

#[derive(Clone, Debug, PartialEq)]
pub enum PassError {
    Model(ModelError),
    Backend(BackendError),
}

impl From<ModelError> for PassError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<BackendError> for PassError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// A unit of graph rewriting: consume a model, produce a rewritten model in
/// place. Deterministic for a fixed input model, no other side effects. On
/// error the pass aborts; the model must not be treated as valid output.
pub trait ModelPass {
    fn run(&self, model: &mut Model) -> Result<(), PassError>;
}

/// The full optimisation pipeline, in its fixed order.
pub fn optimise(model: &mut Model) -> Result<(), PassError> {
    // Replaces every subgraph computable at compile time with a literal
    // constant (re-runs unused-elimination internally).
    FoldConstants.run(model)?;

    // Merges integer constants with identical shape and contents.
    RemoveDuplicateConstants.run(model)?;

    // Merges structurally identical layers.
    RemoveDuplicateLayers.run(model)?;

    // Drops everything unreachable from a declared output.
    RemoveUnused.run(model)?;

    Ok(())
}
