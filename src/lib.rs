//! ideaforge - iterative idea generation with LLM self-review.
//!
//! ## Architecture
//!
//! A single refinement loop drives four stages against one model gateway:
//! - **Generator**: produces the initial batch of ideas
//! - **Evaluator**: rates every pending idea in one request
//! - **Improver**: rewrites the failing ideas, using accepted ones as exemplars
//! - **Categorizer**: groups the final ideas into themes
//!
//! ## Failure policy
//!
//! Malformed model replies are contained inside the loop: a bad evaluation
//! fails the batch, a bad generation or improvement costs one attempt.
//! Only backend failures (no usable reply, transport, auth) abort a run.

pub mod client;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod sink;
pub mod stages;

// Re-exports for convenience
pub use client::{LLMClient, ModelGateway};
pub use models::{BackendError, Config, IdeaforgeError, Item, Rating, Result, ThemeMap};
pub use pipeline::{RefineEvent, RefinementLoop, RefinementOutcome};
pub use sink::{ContentSink, build_sink, publish_or_warn};
pub use stages::{Categorizer, Evaluator, Generator, Improver};
