//! Pipeline module - the refinement loop.

mod refine;

pub use refine::*;
