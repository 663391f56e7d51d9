//! Backend-free reasoning over a task snapshot.
//!
//! [`FallbackReasoner`] answers every scheduling query with the dependency
//! resolver and the urgency scorer alone. It is the availability guarantee of
//! last resort, so none of its methods can fail.

pub mod fallback;
pub mod types;


pub use fallback::FallbackReasoner;
pub use types::*;
