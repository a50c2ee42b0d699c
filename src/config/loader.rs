//! Configuration loader

use super::FleetConfig;
use crate::ProvisionError;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Load configuration from `path`
///
/// A missing file yields the defaults. An unreadable or malformed file is
/// an error.
pub async fn load_config(path: impl AsRef<Path>) -> Result<FleetConfig, ProvisionError> {
    let path = path.as_ref();

    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(FleetConfig::default());
    }

    let content = fs::read_to_string(path).await.map_err(|e| {
        ProvisionError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;

    let config = FleetConfig::from_yaml(&content).map_err(|e| {
        ProvisionError::Config(format!("failed to parse {}: {}", path.display(), e))
    })?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path().join("absent.yaml")).await.unwrap();
        assert_eq!(config.template.id, 9000);
    }

    #[tokio::test]
    async fn test_load_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fleet.yaml");
        std::fs::write(
            &path,
            "template:\n  name: debian-12\nfleet:\n  snippet_prefix: vlan-\n",
        )
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.template.name, "debian-12");
        assert_eq!(config.fleet.snippet_prefix, "vlan-");
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fleet.yaml");
        std::fs::write(&path, "template: [unterminated\n").unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
        assert!(err.to_string().contains("fleet.yaml"));
    }
}
