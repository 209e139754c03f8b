//! Shared domain types for dataspy: rules, servers, schedules, the TOML
//! configuration that carries them, and the error taxonomy every other crate
//! reports against.

pub mod config;
pub mod error;
pub mod model;

pub use config::{load_dotenv, Config, ExecutionConfig, OverlapPolicy, StorageConfig};
pub use error::*;
pub use model::*;
