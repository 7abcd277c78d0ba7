//! Stages of the refinement loop. Each stage is one backend request and
//! holds no state between calls.

mod categorizer;
mod evaluator;
mod generator;
mod improver;
pub mod prompts;

pub use categorizer::*;
pub use evaluator::*;
pub use generator::*;
pub use improver::*;
