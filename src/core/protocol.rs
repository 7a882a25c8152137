//! Text command protocol spoken over the control characteristic.
//!
//! ```text
//! GET_CONFIG
//! POSE:<pose>:<angle0>[:<angle1>...:<angle7>]
//! SERVO:<servo>:<angle>
//! ```
//!
//! Index fields must be in range or the whole command is dropped. Angle
//! fields are clamped into `[0, 180]`; under the lenient policy anything that
//! does not start with an integer reads as 0.

use crate::core::scheduler::PersistenceScheduler;
use crate::core::{ActuatorBank, ConfigSnapshot, Configuration, ServoDriver, NUM_POSES, NUM_SERVOS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GET_CONFIG: &str = "GET_CONFIG";
const POSE_PREFIX: &str = "POSE:";
const SERVO_PREFIX: &str = "SERVO:";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericPolicy {
    /// Leading-integer parse, 0 when nothing parses.
    #[default]
    Lenient,
    /// Every numeric field must be a complete integer.
    Strict,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Invalid {command} command format")]
    MalformedHeader { command: &'static str },

    #[error("Invalid pose index: {0}")]
    PoseIndexOutOfRange(i64),

    #[error("Invalid servo index: {0}")]
    ServoIndexOutOfRange(i64),

    #[error("Invalid numeric field '{0}'")]
    InvalidNumber(String),

    #[error("Unknown command: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetConfig,
    Pose {
        pose_index: usize,
        /// At most [`NUM_SERVOS`] raw angles for channels `0..positions.len()`.
        positions: Vec<i64>,
    },
    Servo {
        servo_index: usize,
        position: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Config(ConfigSnapshot),
    PoseApplied(usize),
    ServoMoved { servo_index: usize, position: u8 },
}

/// Mirrors C `atol`: optional leading whitespace and sign, then digits.
/// Anything else ends the number; no digits at all gives 0. Saturates.
pub fn parse_leading_int(field: &str) -> i64 {
    let mut chars = field.trim_start().chars().peekable();
    let negative = match chars.peek() {
        Some('-') => {
            chars.next();
            true
        }
        Some('+') => {
            chars.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for digit in chars.map_while(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(digit as i64);
    }

    if negative {
        value.saturating_neg()
    } else {
        value
    }
}

impl NumericPolicy {
    pub fn parse(self, field: &str) -> Result<i64, CommandError> {
        match self {
            NumericPolicy::Lenient => Ok(parse_leading_int(field)),
            NumericPolicy::Strict => field
                .trim()
                .parse::<i64>()
                .map_err(|_| CommandError::InvalidNumber(field.to_string())),
        }
    }
}

fn checked_index(raw: i64, limit: usize) -> Option<usize> {
    usize::try_from(raw).ok().filter(|index| *index < limit)
}

impl Command {
    pub fn parse(line: &str, policy: NumericPolicy) -> Result<Command, CommandError> {
        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        if line == GET_CONFIG {
            return Ok(Command::GetConfig);
        }

        if let Some(rest) = line.strip_prefix(POSE_PREFIX) {
            let (index_field, positions_field) = rest
                .split_once(':')
                .ok_or(CommandError::MalformedHeader { command: "pose" })?;

            let raw_index = policy.parse(index_field)?;
            let pose_index = checked_index(raw_index, NUM_POSES)
                .ok_or(CommandError::PoseIndexOutOfRange(raw_index))?;

            let positions = positions_field
                .split(':')
                .take(NUM_SERVOS)
                .map(|field| policy.parse(field))
                .collect::<Result<Vec<_>, _>>()?;

            return Ok(Command::Pose {
                pose_index,
                positions,
            });
        }

        if let Some(rest) = line.strip_prefix(SERVO_PREFIX) {
            let (index_field, position_field) = rest
                .split_once(':')
                .ok_or(CommandError::MalformedHeader { command: "servo" })?;

            let raw_index = policy.parse(index_field)?;
            let position = policy.parse(position_field)?;
            let servo_index = checked_index(raw_index, NUM_SERVOS)
                .ok_or(CommandError::ServoIndexOutOfRange(raw_index))?;

            return Ok(Command::Servo {
                servo_index,
                position,
            });
        }

        Err(CommandError::Unknown(line.to_string()))
    }
}

/// Parses and applies one command at a time. Holds no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProtocol {
    policy: NumericPolicy,
}

impl CommandProtocol {
    pub fn new(policy: NumericPolicy) -> Self {
        Self { policy }
    }

    pub fn handle<D: ServoDriver>(
        &self,
        line: &str,
        config: &mut Configuration,
        actuators: &mut ActuatorBank<D>,
        scheduler: &mut PersistenceScheduler,
    ) -> Result<Outcome, CommandError> {
        let command = Command::parse(line, self.policy)?;
        self.execute(command, config, actuators, scheduler)
    }

    /// Applies an already parsed command. Indices are re-checked so that
    /// hand-built commands cannot bypass validation.
    pub fn execute<D: ServoDriver>(
        &self,
        command: Command,
        config: &mut Configuration,
        actuators: &mut ActuatorBank<D>,
        scheduler: &mut PersistenceScheduler,
    ) -> Result<Outcome, CommandError> {
        match command {
            Command::GetConfig => Ok(Outcome::Config(config.snapshot())),
            Command::Pose {
                pose_index,
                positions,
            } => {
                let out_of_range = CommandError::PoseIndexOutOfRange(pose_index as i64);
                let pose = config.pose_mut(pose_index).ok_or_else(|| out_of_range.clone())?;
                for (servo, position) in pose.servos.iter_mut().zip(positions) {
                    servo.set_position(position);
                }
                config
                    .set_current_pose(pose_index)
                    .map_err(|_| out_of_range)?;
                actuators.apply(config, pose_index);
                scheduler.request_save();
                tracing::info!("Applied pose {}", pose_index);
                Ok(Outcome::PoseApplied(pose_index))
            }
            Command::Servo {
                servo_index,
                position,
            } => {
                let pose_index = config.current_pose();
                let stored = config
                    .set_servo_position(pose_index, servo_index, position)
                    .map_err(|_| CommandError::ServoIndexOutOfRange(servo_index as i64))?;
                actuators.apply_one(servo_index, stored);
                scheduler.request_save();
                tracing::info!("Servo {} set to {}", servo_index, stored);
                Ok(Outcome::ServoMoved {
                    servo_index,
                    position: stored,
                })
            }
        }
    }
}
