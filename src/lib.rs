pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::TomlConfig;

pub use crate::adapters::channel::{mpsc_channel, ChannelHandle, LineChannel, MpscChannel};
pub use crate::adapters::servo::{PwmServoDriver, PwmTiming, RecordingServoDriver};
pub use crate::adapters::storage::{FileStore, MemoryStore};
pub use crate::core::engine::{EngineSettings, ServoMaskEngine};
pub use crate::core::protocol::{Command, CommandError, CommandProtocol, NumericPolicy};
pub use crate::domain::model::{ConfigSnapshot, Configuration};
pub use crate::utils::error::{Result, ServoMaskError};
