//! Parsing of model replies: fence stripping and the item wire format.

pub mod codec;
mod sanitize;

pub use codec::{ItemRecord, parse_items, parse_reply};
pub use sanitize::strip_code_fence;
