//! Validation module: document validators and the layer that applies them.
//!
//! Reads are forgiving (invalid documents are dropped and logged); writes are
//! strict (invalid documents are rejected before they reach the backend).

pub mod layer;
pub mod validators;

pub use layer::ValidationLayer;
pub use validators::{
    is_valid_id, run_validators, FnValidator, IdValidator, RevisionValidator, SchemaValidator,
    Validator, ValidatorSet, Violation,
};
