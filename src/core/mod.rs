pub mod actuator;
pub mod config_store;
pub mod engine;
pub mod link;
pub mod protocol;
pub mod scheduler;

pub use crate::core::actuator::ActuatorBank;
pub use crate::domain::model::{ConfigSnapshot, Configuration, Pose, ServoConfig, NUM_POSES, NUM_SERVOS};
pub use crate::domain::ports::{KeyValueSession, KeyValueStore, ServoDriver};
pub use crate::utils::error::Result;
