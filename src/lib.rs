//! Compile-time optimiser for inference model graphs.
//!
//! A [`Model`](model::Model) is an ordered list of layers over named
//! tensors, plus constants, declared inputs and declared outputs. The
//! [`optimise`](passes::optimise) pipeline rewrites it in place: constant
//! subgraphs are folded into literals, duplicated constants and layers are
//! merged, and everything no declared output depends on is dropped. The
//! rewritten model computes the same outputs as the original for every
//! assignment of the graph inputs.

/// Contains the `Backend` trait and the CPU kernels used for folding.
pub mod backend;
/// Contains the supported scalar types.
pub mod dtype;
/// Hash combining for structural and content hashes.
pub mod hash;
/// Contains the `Layer` struct and the operator set.
pub mod layer;
/// Contains the `Model` graph representation and its validity checks.
pub mod model;
/// Contains symbolic tensor descriptions and partial inference.
pub mod partial;
/// Contains the optimisation passes and the `optimise` pipeline.
pub mod passes;
/// Contains concrete and symbolic shapes.
pub mod shape;
/// Contains the owned tensor type.
pub mod tensor;
