use crate::utils::error::{Result, ServoMaskError};
use serde::{Deserialize, Serialize};

pub const NUM_SERVOS: usize = 8;
pub const NUM_POSES: usize = 8;

pub const MIN_DEGREES: u8 = 0;
pub const MAX_DEGREES: u8 = 180;
pub const DEFAULT_DEGREES: u8 = 90;

/// Clamps any integer angle into the servo range `[0, 180]`.
pub fn clamp_degrees(degrees: i64) -> u8 {
    degrees.clamp(MIN_DEGREES as i64, MAX_DEGREES as i64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoConfig {
    #[serde(deserialize_with = "deserialize_degrees")]
    position: u8,
}

fn deserialize_degrees<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    i64::deserialize(deserializer).map(clamp_degrees)
}

impl ServoConfig {
    pub fn new(degrees: i64) -> Self {
        Self {
            position: clamp_degrees(degrees),
        }
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    pub fn set_position(&mut self, degrees: i64) -> u8 {
        self.position = clamp_degrees(degrees);
        self.position
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            position: DEFAULT_DEGREES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pose {
    pub name: String,
    pub servos: [ServoConfig; NUM_SERVOS],
}

impl Pose {
    pub fn default_name(slot: usize) -> String {
        format!("Pose {}", slot + 1)
    }

    pub fn for_slot(slot: usize) -> Self {
        Self {
            name: Self::default_name(slot),
            servos: [ServoConfig::default(); NUM_SERVOS],
        }
    }

    pub fn positions(&self) -> [u8; NUM_SERVOS] {
        self.servos.map(|servo| servo.position())
    }
}

/// Root aggregate: every pose slot plus the active slot index.
///
/// `current_pose` is private so that it can only move through
/// [`Configuration::set_current_pose`], which keeps it inside `0..NUM_POSES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    poses: [Pose; NUM_POSES],
    current_pose: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            poses: std::array::from_fn(Pose::for_slot),
            current_pose: 0,
        }
    }
}

impl Configuration {
    /// Builds a configuration from explicit slots with pose 0 active.
    pub fn from_poses(poses: [Pose; NUM_POSES]) -> Self {
        Self {
            poses,
            current_pose: 0,
        }
    }

    pub fn poses(&self) -> &[Pose; NUM_POSES] {
        &self.poses
    }

    pub fn pose(&self, pose_index: usize) -> Option<&Pose> {
        self.poses.get(pose_index)
    }

    pub fn pose_mut(&mut self, pose_index: usize) -> Option<&mut Pose> {
        self.poses.get_mut(pose_index)
    }

    pub fn current_pose(&self) -> usize {
        self.current_pose
    }

    /// Writes one channel of one slot, returning the clamped angle actually stored.
    pub fn set_servo_position(
        &mut self,
        pose_index: usize,
        servo_index: usize,
        degrees: i64,
    ) -> Result<u8> {
        check_index("pose", pose_index, NUM_POSES)?;
        check_index("servo", servo_index, NUM_SERVOS)?;
        Ok(self.poses[pose_index].servos[servo_index].set_position(degrees))
    }

    pub fn set_current_pose(&mut self, pose_index: usize) -> Result<()> {
        check_index("pose", pose_index, NUM_POSES)?;
        self.current_pose = pose_index;
        Ok(())
    }

    pub fn set_pose_name(&mut self, pose_index: usize, name: impl Into<String>) -> Result<()> {
        check_index("pose", pose_index, NUM_POSES)?;
        self.poses[pose_index].name = name.into();
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            current_pose: self.current_pose,
            poses: self.poses.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

fn check_index(kind: &'static str, index: usize, limit: usize) -> Result<()> {
    if index >= limit {
        tracing::warn!("Rejected {} index {} (valid range 0..{})", kind, index, limit);
        return Err(ServoMaskError::IndexOutOfRangeError {
            kind,
            index: index as i64,
            limit,
        });
    }
    Ok(())
}

/// Wire form of the configuration returned for `GET_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub current_pose: usize,
    pub poses: Vec<Pose>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_degrees_bounds_and_idempotence() {
        for d in [i64::MIN, -1000, -1, 0, 1, 90, 179, 180, 181, 5000, i64::MAX] {
            let once = clamp_degrees(d);
            assert!(once <= MAX_DEGREES);
            assert_eq!(clamp_degrees(once as i64), once);
        }
        assert_eq!(clamp_degrees(-5), 0);
        assert_eq!(clamp_degrees(200), 180);
        assert_eq!(clamp_degrees(42), 42);
    }

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.current_pose(), 0);
        for (slot, pose) in config.poses().iter().enumerate() {
            assert_eq!(pose.name, format!("Pose {}", slot + 1));
            assert_eq!(pose.positions(), [DEFAULT_DEGREES; NUM_SERVOS]);
        }
    }

    #[test]
    fn test_set_servo_position_clamps() {
        let mut config = Configuration::default();
        assert_eq!(config.set_servo_position(2, 3, 250).unwrap(), 180);
        assert_eq!(config.set_servo_position(2, 4, -20).unwrap(), 0);
        assert_eq!(config.poses()[2].servos[3].position(), 180);
        assert_eq!(config.poses()[2].servos[4].position(), 0);
    }

    #[test]
    fn test_out_of_range_mutations_are_rejected() {
        let mut config = Configuration::default();
        let before = config.clone();

        assert!(config.set_servo_position(8, 0, 10).is_err());
        assert!(config.set_servo_position(0, 8, 10).is_err());
        assert!(config.set_current_pose(8).is_err());
        assert!(config.set_pose_name(9, "nope").is_err());

        assert_eq!(config, before);
    }

    #[test]
    fn test_from_poses_and_pose_mut() {
        let mut config = Configuration::from_poses(std::array::from_fn(|slot| Pose {
            name: format!("Slot {}", slot),
            servos: [ServoConfig::new(slot as i64 * 30); NUM_SERVOS],
        }));
        assert_eq!(config.current_pose(), 0);
        assert_eq!(config.poses()[7].positions(), [180; NUM_SERVOS]);

        config.pose_mut(2).unwrap().servos[1].set_position(-4);
        assert_eq!(config.poses()[2].servos[1].position(), 0);
        assert!(config.pose_mut(NUM_POSES).is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut config = Configuration::default();
        config.set_current_pose(3).unwrap();
        config.set_servo_position(3, 0, 12).unwrap();

        let value: serde_json::Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(value["currentPose"], 3);
        assert_eq!(value["poses"].as_array().unwrap().len(), NUM_POSES);
        assert_eq!(value["poses"][3]["name"], "Pose 4");
        assert_eq!(value["poses"][3]["servos"][0]["position"], 12);
        assert_eq!(
            value["poses"][3]["servos"].as_array().unwrap().len(),
            NUM_SERVOS
        );
    }

    #[test]
    fn test_snapshot_deserialize_clamps_positions() {
        let json = r#"{"name":"x","servos":[{"position":900},{"position":-3},{"position":1},{"position":2},{"position":3},{"position":4},{"position":5},{"position":6}]}"#;
        let pose: Pose = serde_json::from_str(json).unwrap();
        assert_eq!(pose.positions(), [180, 0, 1, 2, 3, 4, 5, 6]);
    }
}
