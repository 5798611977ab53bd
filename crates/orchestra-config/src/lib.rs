// orchestra-config - Layered configuration for the orchestration control plane
// TOML file + environment variable overrides, env wins.

#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod env;
pub mod schema;

pub use config::load_config;
pub use env::apply_env_overrides;
pub use env::load_env_config;
pub use schema::{ConfigError, OrchestraConfig};
