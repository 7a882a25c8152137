pub mod toml_config;

pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::Validate;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "servo-mask")]
#[command(about = "Pose-based servo controller driven by a text command channel")]
pub struct CliConfig {
    #[arg(long, short = 'c', help = "Device settings file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory holding the persisted configuration")]
    pub store_dir: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Settings file (or defaults) with command line overrides applied.
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut settings = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };

        if let Some(store_dir) = &self.store_dir {
            settings.persistence.store_dir = store_dir.clone();
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = CliConfig::parse_from(["servo-mask"]);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);

        let settings = cli.resolve().unwrap();
        assert_eq!(settings, TomlConfig::default());
    }

    #[test]
    fn test_store_dir_override() {
        let cli = CliConfig::parse_from(["servo-mask", "--store-dir", "/var/lib/servo", "--log-json"]);
        assert!(cli.log_json);
        assert_eq!(cli.resolve().unwrap().persistence.store_dir, "/var/lib/servo");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = CliConfig::parse_from(["servo-mask", "-c", "/nonexistent/servo-mask.toml"]);
        assert!(cli.resolve().is_err());
    }
}
