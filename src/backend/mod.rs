//! Reasoning backends and the connection pool that shares them.

pub mod connection;
pub mod fact_backend;
pub mod knowledge_base;
pub mod pool;
pub mod types;

#[cfg(test)]
mod tests;

pub use connection::{BackendFactory, ReasoningBackend};
pub use fact_backend::{FactBackend, FactBackendFactory, FaultProfile};
pub use knowledge_base::{KnowledgeBase, KnowledgeBaseError, load_knowledge_base, parse_expressions};
pub use pool::{ConnectionPool, PooledConnection};
pub use types::*;
