//! Cloud-init network snippets
//!
//! Each clone gets its own network-config file, produced from a shared
//! template by literal substitution of [`PLACEHOLDER`]. The files are
//! written into the host's snippets directory and referenced from the
//! clone through `--cicustom`.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::ProvisionError;

/// Token replaced by the per-clone address value
pub const PLACEHOLDER: &str = "<IPADDR>";

/// Network template used when none is configured
pub const DEFAULT_NETWORK_TEMPLATE: &str = "\
version: 2
ethernets:
  eth0:
    match:
      name: e*
    addresses:
      - 10.0.0.<IPADDR>/24
    routes:
      - to: default
        via: 10.0.0.1
    nameservers:
      addresses:
        - 10.0.0.1
";

/// Replace every occurrence of the placeholder with `value`
pub fn render(template: &str, value: u32) -> String {
    template.replace(PLACEHOLDER, &value.to_string())
}

/// File name of the snippet for `vmid`
pub fn file_name(prefix: &str, vmid: u32) -> String {
    format!("{}{}.yaml", prefix, vmid)
}

/// Load the network template, falling back to the built-in one
pub async fn load_template(path: Option<&Path>) -> Result<String, ProvisionError> {
    match path {
        Some(path) => {
            debug!("Loading network template from {}", path.display());
            fs::read_to_string(path).await.map_err(|e| {
                ProvisionError::Config(format!(
                    "failed to read network template {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        None => Ok(DEFAULT_NETWORK_TEMPLATE.to_string()),
    }
}

/// Write a rendered snippet into `dir`, returning its path
pub async fn write(dir: &Path, name: &str, content: &str) -> Result<PathBuf, ProvisionError> {
    fs::create_dir_all(dir).await?;

    let path = dir.join(name);
    fs::write(&path, content).await?;

    info!("Wrote network snippet {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_replaces_placeholder() {
        let rendered = render("address: 192.168.1.<IPADDR>/24\n", 13);
        assert_eq!(rendered, "address: 192.168.1.13/24\n");
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let rendered = render("a=<IPADDR> b=<IPADDR>", 7);
        assert_eq!(rendered, "a=7 b=7");
    }

    #[test]
    fn test_render_leaves_other_content_unchanged() {
        let template = "<IPADDR >\n<ipaddr>\nIPADDR\n  keep   spacing\n<IPADDR>";
        let rendered = render(template, 42);
        assert_eq!(rendered, "<IPADDR >\n<ipaddr>\nIPADDR\n  keep   spacing\n42");
    }

    #[test]
    fn test_render_without_placeholder() {
        let template = "version: 2\n";
        assert_eq!(render(template, 1), template);
    }

    #[test]
    fn test_default_template_has_placeholder() {
        assert!(DEFAULT_NETWORK_TEMPLATE.contains(PLACEHOLDER));
        assert!(render(DEFAULT_NETWORK_TEMPLATE, 11).contains("10.0.0.11/24"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("net-", 101), "net-101.yaml");
    }

    #[tokio::test]
    async fn test_write_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("snippets");

        let path = write(&dir, "net-101.yaml", "version: 2\n").await.unwrap();

        assert_eq!(path, dir.join("net-101.yaml"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "version: 2\n");
    }

    #[tokio::test]
    async fn test_load_template_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("network.yaml");
        std::fs::write(&path, "ip: <IPADDR>\n").unwrap();

        let template = load_template(Some(&path)).await.unwrap();
        assert_eq!(template, "ip: <IPADDR>\n");
    }

    #[tokio::test]
    async fn test_load_template_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_template(Some(&temp.path().join("absent.yaml"))).await;
        assert!(matches!(result, Err(ProvisionError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_template_default() {
        let template = load_template(None).await.unwrap();
        assert_eq!(template, DEFAULT_NETWORK_TEMPLATE);
    }
}
