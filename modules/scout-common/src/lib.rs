pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LlmConfig};
pub use error::ScoutError;
pub use types::*;
