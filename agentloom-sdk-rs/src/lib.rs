pub mod agent;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod logger;
pub mod runner;
pub mod session;

pub use agent::tools;
pub use error::{AgentError, Result};

#[cfg(test)]
pub(crate) mod testing;
