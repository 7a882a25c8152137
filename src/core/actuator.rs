use crate::core::{Configuration, ServoDriver, NUM_SERVOS};
use crate::domain::model::{clamp_degrees, DEFAULT_DEGREES};

/// Drives all servo channels from the configuration. Open loop: nothing here
/// waits for the horns to reach their target.
pub struct ActuatorBank<D: ServoDriver> {
    driver: D,
}

impl<D: ServoDriver> ActuatorBank<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// Startup homing: centre every channel before any pose is applied.
    pub fn home(&mut self) {
        for channel in 0..NUM_SERVOS {
            self.write(channel, DEFAULT_DEGREES);
        }
    }

    pub fn apply(&mut self, config: &Configuration, pose_index: usize) {
        let Some(pose) = config.pose(pose_index) else {
            tracing::warn!("Cannot apply pose {}: no such slot", pose_index);
            return;
        };

        for (channel, servo) in pose.servos.iter().enumerate() {
            self.write(channel, clamp_degrees(servo.position() as i64));
        }
    }

    pub fn apply_one(&mut self, servo_index: usize, degrees: u8) {
        if servo_index >= NUM_SERVOS {
            tracing::warn!("Cannot move servo {}: no such channel", servo_index);
            return;
        }
        self.write(servo_index, clamp_degrees(degrees as i64));
    }

    fn write(&mut self, channel: usize, degrees: u8) {
        if let Err(e) = self.driver.write_angle(channel, degrees) {
            tracing::error!("Servo {} write failed: {}", channel, e);
        }
    }
}
