pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{
    CapabilityConfig, ChatConfig, CompletionConfig, GeneralConfig, MemoryConfig, SousConfig,
};
pub use error::{Result, SousError};
pub use types::*;
