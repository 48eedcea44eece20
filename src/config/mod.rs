//! Configuration model for nslock.
//!
//! A `Config` is read from a YAML file named on the command line or by the
//! `NSLOCK_CONFIG` environment variable. Unknown fields are ignored, every
//! field has a default, and values are validated after parsing.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::CONFIG_ENV_VAR;
