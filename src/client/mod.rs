//! Generative backend: the gateway contract and its HTTP implementation.

mod gateway;
mod llm_client;
#[cfg(test)]
pub mod testing;

pub use gateway::*;
pub use llm_client::*;
