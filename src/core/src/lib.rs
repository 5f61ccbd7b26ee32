//! dfdeps core - shared error and configuration types.
//!
//! Used by the resolver crate and by build tools embedding it.

pub mod config;
pub mod error;

pub use config::{RegistryConfig, ResolverConfig, DEFAULT_IGNORE_FILE};
pub use error::{DepsError, Result};

/// dfdeps version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
