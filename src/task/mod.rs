pub mod graph;
pub mod scoring;
pub mod types;


pub use graph::*;
pub use scoring::*;
pub use types::*;
