use crate::core::{Configuration, KeyValueSession, KeyValueStore, NUM_POSES};
use crate::domain::model::{Pose, ServoConfig, DEFAULT_DEGREES};
use crate::utils::error::Result;

pub const DEFAULT_NAMESPACE: &str = "servomask";

const CURRENT_POSE_KEY: &str = "currentPose";

pub fn pose_name_key(pose_index: usize) -> String {
    format!("pose_{}_name", pose_index)
}

pub fn servo_key(pose_index: usize, servo_index: usize) -> String {
    format!("pose_{}_servo_{}", pose_index, servo_index)
}

/// Maps the configuration onto flat per-slot, per-channel keys of a
/// [`KeyValueStore`] namespace.
pub struct ConfigStore<K: KeyValueStore> {
    store: K,
    namespace: String,
}

impl<K: KeyValueStore> ConfigStore<K> {
    pub fn new(store: K, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn backend(&self) -> &K {
        &self.store
    }

    /// Never fails: an unreadable store or any missing key falls back to defaults.
    pub fn load(&self) -> Configuration {
        let session = match self.store.open(&self.namespace, true) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Config store unavailable, using defaults: {}", e);
                return Configuration::default();
            }
        };

        let poses: [Pose; NUM_POSES] = std::array::from_fn(|pose_index| Pose {
            name: read_string(&session, &pose_name_key(pose_index))
                .unwrap_or_else(|| Pose::default_name(pose_index)),
            servos: std::array::from_fn(|servo_index| {
                let position = read_i32(&session, &servo_key(pose_index, servo_index))
                    .unwrap_or(DEFAULT_DEGREES as i32);
                ServoConfig::new(position as i64)
            }),
        });
        let mut config = Configuration::from_poses(poses);

        let current_pose = read_i32(&session, CURRENT_POSE_KEY).unwrap_or(0);
        let index = usize::try_from(current_pose).unwrap_or(NUM_POSES);
        if let Err(e) = config.set_current_pose(index) {
            tracing::warn!("Stored currentPose {} is invalid, using 0: {}", current_pose, e);
        }

        if let Err(e) = session.end() {
            tracing::warn!("Failed to close config store after load: {}", e);
        }
        tracing::info!("Config loaded!");
        config
    }

    /// Writes every key. Not transactional: a failure part-way leaves earlier
    /// keys updated. Yields to the runtime after each slot.
    pub async fn save(&self, config: &Configuration) -> Result<()> {
        let mut session = self.store.open(&self.namespace, false)?;

        session.put_i32(CURRENT_POSE_KEY, config.current_pose() as i32)?;

        for (pose_index, pose) in config.poses().iter().enumerate() {
            session.put_string(&pose_name_key(pose_index), &pose.name)?;
            for (servo_index, servo) in pose.servos.iter().enumerate() {
                session.put_i32(&servo_key(pose_index, servo_index), servo.position() as i32)?;
            }
            tokio::task::yield_now().await;
        }

        session.end()?;
        tracing::info!("Config saved!");
        Ok(())
    }
}

fn read_i32<S: KeyValueSession>(session: &S, key: &str) -> Option<i32> {
    session.get_i32(key).unwrap_or_else(|e| {
        tracing::warn!("Failed to read '{}': {}", key, e);
        None
    })
}

fn read_string<S: KeyValueSession>(session: &S, key: &str) -> Option<String> {
    session.get_string(key).unwrap_or_else(|e| {
        tracing::warn!("Failed to read '{}': {}", key, e);
        None
    })
}
