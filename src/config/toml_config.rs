use crate::adapters::servo::PwmTiming;
use crate::core::config_store::DEFAULT_NAMESPACE;
use crate::core::engine::{EngineSettings, CHARACTERISTIC_UUID, DEVICE_NAME, SERVICE_UUID};
use crate::core::protocol::NumericPolicy;
use crate::core::NUM_SERVOS;
use crate::domain::ports::AdvertisingIdentity;
use crate::utils::error::{Result, ServoMaskError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Flash namespaces on the target are limited to 15 characters.
pub const MAX_NAMESPACE_LEN: usize = 15;

pub const DEFAULT_PINS: [u8; NUM_SERVOS] = [2, 4, 5, 12, 13, 14, 16, 17];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub device: DeviceSection,
    pub servos: ServoSection,
    pub persistence: PersistenceSection,
    pub protocol: ProtocolSection,
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub name: String,
    pub service_uuid: String,
    pub characteristic_uuid: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: DEVICE_NAME.to_string(),
            service_uuid: SERVICE_UUID.to_string(),
            characteristic_uuid: CHARACTERISTIC_UUID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSection {
    pub pins: Vec<u8>,
    pub frequency_hz: u32,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
}

impl Default for ServoSection {
    fn default() -> Self {
        let timing = PwmTiming::default();
        Self {
            pins: DEFAULT_PINS.to_vec(),
            frequency_hz: timing.frequency_hz,
            min_pulse_us: timing.min_pulse_us,
            max_pulse_us: timing.max_pulse_us,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    pub namespace: String,
    pub store_dir: String,
    pub save_interval_ms: u64,
    pub retry_failed_saves: bool,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            store_dir: "./nvs".to_string(),
            save_interval_ms: 5000,
            retry_failed_saves: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    pub numeric_policy: NumericPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub loop_interval_ms: u64,
    pub readvertise_delay_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            loop_interval_ms: 20,
            readvertise_delay_ms: 500,
        }
    }
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ServoMaskError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ServoMaskError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR_NAME}` with the environment value; unknown variables
    /// are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ServoMaskError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn pins(&self) -> Result<[u8; NUM_SERVOS]> {
        self.servos
            .pins
            .as_slice()
            .try_into()
            .map_err(|_| ServoMaskError::InvalidConfigValueError {
                field: "servos.pins".to_string(),
                value: format!("{:?}", self.servos.pins),
                reason: format!("Exactly {} pins are required", NUM_SERVOS),
            })
    }

    pub fn pwm_timing(&self) -> PwmTiming {
        PwmTiming {
            frequency_hz: self.servos.frequency_hz,
            min_pulse_us: self.servos.min_pulse_us,
            max_pulse_us: self.servos.max_pulse_us,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            identity: AdvertisingIdentity {
                device_name: self.device.name.clone(),
                service_uuid: self.device.service_uuid.clone(),
                characteristic_uuid: self.device.characteristic_uuid.clone(),
            },
            namespace: self.persistence.namespace.clone(),
            save_interval: Duration::from_millis(self.persistence.save_interval_ms),
            retry_failed_saves: self.persistence.retry_failed_saves,
            numeric_policy: self.protocol.numeric_policy,
            loop_interval: Duration::from_millis(self.runtime.loop_interval_ms),
            readvertise_delay: Duration::from_millis(self.runtime.readvertise_delay_ms),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("device.name", &self.device.name)?;
        validation::validate_non_empty_string("device.service_uuid", &self.device.service_uuid)?;
        validation::validate_non_empty_string(
            "device.characteristic_uuid",
            &self.device.characteristic_uuid,
        )?;

        self.pins()?;
        validation::validate_range("servos.frequency_hz", self.servos.frequency_hz, 40, 400)?;
        if self.servos.min_pulse_us >= self.servos.max_pulse_us {
            return Err(ServoMaskError::InvalidConfigValueError {
                field: "servos.min_pulse_us".to_string(),
                value: self.servos.min_pulse_us.to_string(),
                reason: format!(
                    "Must be lower than servos.max_pulse_us ({})",
                    self.servos.max_pulse_us
                ),
            });
        }
        let period_us = self.pwm_timing().period_us();
        validation::validate_range("servos.max_pulse_us", self.servos.max_pulse_us, 1, period_us)?;

        validation::validate_non_empty_string("persistence.namespace", &self.persistence.namespace)?;
        validation::validate_max_length(
            "persistence.namespace",
            &self.persistence.namespace,
            MAX_NAMESPACE_LEN,
        )?;
        validation::validate_path("persistence.store_dir", &self.persistence.store_dir)?;
        validation::validate_positive_number(
            "persistence.save_interval_ms",
            self.persistence.save_interval_ms,
            1,
        )?;
        validation::validate_positive_number(
            "runtime.loop_interval_ms",
            self.runtime.loop_interval_ms,
            1,
        )?;

        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_firmware_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert!(config.validate().is_ok());

        let settings = config.engine_settings();
        assert_eq!(settings.identity.device_name, "Servo Mask");
        assert_eq!(settings.namespace, "servomask");
        assert_eq!(settings.save_interval, Duration::from_millis(5000));
        assert_eq!(settings.numeric_policy, NumericPolicy::Lenient);
        assert_eq!(config.pins().unwrap(), DEFAULT_PINS);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[device]
name = "Desk Mask"

[persistence]
save_interval_ms = 250
retry_failed_saves = true

[protocol]
numeric_policy = "strict"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.device.name, "Desk Mask");
        assert_eq!(config.device.service_uuid, SERVICE_UUID);
        assert_eq!(config.persistence.namespace, "servomask");

        let settings = config.engine_settings();
        assert_eq!(settings.save_interval, Duration::from_millis(250));
        assert!(settings.retry_failed_saves);
        assert_eq!(settings.numeric_policy, NumericPolicy::Strict);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SERVO_MASK_TEST_STORE_DIR", "/tmp/servo-nvs");

        let toml_content = r#"
[persistence]
store_dir = "${SERVO_MASK_TEST_STORE_DIR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.persistence.store_dir, "/tmp/servo-nvs");

        std::env::remove_var("SERVO_MASK_TEST_STORE_DIR");
    }

    #[test]
    fn test_config_validation() {
        let wrong_pins = TomlConfig::from_toml_str("[servos]\npins = [1, 2, 3]\n").unwrap();
        assert!(wrong_pins.validate().is_err());

        let long_namespace =
            TomlConfig::from_toml_str("[persistence]\nnamespace = \"servomask-settings\"\n")
                .unwrap();
        assert!(long_namespace.validate().is_err());

        let inverted_pulse =
            TomlConfig::from_toml_str("[servos]\nmin_pulse_us = 2400\nmax_pulse_us = 500\n")
                .unwrap();
        assert!(inverted_pulse.validate().is_err());

        let zero_interval =
            TomlConfig::from_toml_str("[persistence]\nsave_interval_ms = 0\n").unwrap();
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = TomlConfig::from_toml_str("[protocol]\nnumeric_policy = \"fuzzy\"\n");
        assert!(matches!(
            result,
            Err(ServoMaskError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[runtime]\nloop_interval_ms = 10\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.runtime.loop_interval_ms, 10);
        assert_eq!(config.runtime.readvertise_delay_ms, 500);
    }
}
