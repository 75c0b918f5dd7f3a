//! Change detection: converts mutation descriptors from the binding wrapper
//! into a minimal stream of remote operations.

mod descriptor;
mod engine;
mod error;


pub use descriptor::{ChangeDescriptor, Mutation, DATA_FIELD};
pub use engine::ChangeDiffEngine;
pub use error::DiffError;
