//! Core data models for ideaforge.

mod config;
mod error;
mod item;

pub use config::*;
pub use error::*;
pub use item::*;
