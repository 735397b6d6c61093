//! Kickscope Core
//!
//! Analysis submission, status polling, results rendering and client settings.

pub mod analysis;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
