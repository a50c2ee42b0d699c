//! Provisioning configuration
//!
//! Parsed from a YAML file. Every field has a default, so an empty or
//! missing file yields a working configuration for an Ubuntu cloud image
//! on a stock Proxmox VE host.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::ProvisionError;
use crate::snippet::PLACEHOLDER;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fleet-provision/fleet.yaml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Cloud image source and cache
    pub image: ImageConfig,

    /// Offline image modifications
    pub customize: CustomizeConfig,

    /// Template VM definition
    pub template: TemplateConfig,

    /// Clone fleet settings
    pub fleet: FleetSettings,

    /// External program names
    pub tools: ToolsConfig,

    /// Parent of the temporary working directory (system temp dir if unset)
    pub workdir_parent: Option<PathBuf>,
}

/// Cloud image source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image download URL; the last path segment names the file
    pub url: String,
    /// URL of a SHA256SUMS-style manifest covering the image
    pub checksum_url: String,
    /// Directory holding the last downloaded copy
    pub cache_dir: PathBuf,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            url: "https://cloud-images.ubuntu.com/jammy/current/jammy-server-cloudimg-amd64.img"
                .to_string(),
            checksum_url: "https://cloud-images.ubuntu.com/jammy/current/SHA256SUMS".to_string(),
            cache_dir: PathBuf::from("/var/cache/fleet-provision"),
        }
    }
}

/// Offline image customization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizeConfig {
    /// Size argument for `qemu-img resize` (e.g. "+8G"); empty to skip
    pub disk_grow: String,
    /// Root disk device as seen inside the appliance
    pub root_device: String,
    /// Root partition number
    pub root_partition: u32,
    /// Packages installed into the image
    pub packages: Vec<String>,
    /// Extra commands run inside the image, in order
    pub run_commands: Vec<String>,
    /// Truncate /etc/machine-id so every clone generates its own
    pub reset_machine_id: bool,
}

impl Default for CustomizeConfig {
    fn default() -> Self {
        Self {
            disk_grow: "+8G".to_string(),
            root_device: "/dev/sda".to_string(),
            root_partition: 1,
            packages: vec!["qemu-guest-agent".to_string()],
            run_commands: Vec::new(),
            reset_machine_id: true,
        }
    }
}

/// Template VM definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub id: u32,
    pub name: String,
    /// Memory in MiB
    pub memory: u32,
    pub cores: u32,
    /// Storage receiving the imported disk and the cloud-init drive
    pub storage: String,
    pub bridge: String,
    /// Default cloud-init user
    pub ci_user: String,
    /// Public key file handed to `--sshkeys`
    pub ssh_keys: Option<PathBuf>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            id: 9000,
            name: "cloud-template".to_string(),
            memory: 2048,
            cores: 2,
            storage: "local-lvm".to_string(),
            bridge: "vmbr0".to_string(),
            ci_user: "ubuntu".to_string(),
            ssh_keys: None,
        }
    }
}

/// Clone fleet settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Clone `i` (1-based) gets VM ID `clone_base_id + i`
    pub clone_base_id: u32,
    /// Jinja template for clone names; `vmid`, `index` and `vlan` are in scope
    pub name_template: String,
    /// Network snippet template; a built-in netplan document is used if unset
    pub network_template: Option<PathBuf>,
    /// Host directory served as the snippets content of `snippet_storage`
    pub snippets_dir: PathBuf,
    /// Storage ID exposing `snippets_dir`
    pub snippet_storage: String,
    /// File name prefix for rendered snippets
    pub snippet_prefix: String,
    /// Clone `i` gets address value `address_offset + i`
    pub address_offset: u32,
    /// Bridge for clone NICs; the template bridge if unset
    pub bridge: Option<String>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            clone_base_id: 100,
            name_template: "fleet-{{ vmid }}".to_string(),
            network_template: None,
            snippets_dir: PathBuf::from("/var/lib/vz/snippets"),
            snippet_storage: "local".to_string(),
            snippet_prefix: "net-".to_string(),
            address_offset: 10,
            bridge: None,
        }
    }
}

/// External program names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub qm: String,
    pub pvesh: String,
    pub virt_customize: String,
    pub qemu_img: String,
    pub package_manager: String,
    /// Host packages providing the customization tool
    pub host_packages: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            qm: "qm".to_string(),
            pvesh: "pvesh".to_string(),
            virt_customize: "virt-customize".to_string(),
            qemu_img: "qemu-img".to_string(),
            package_manager: "apt-get".to_string(),
            host_packages: vec!["libguestfs-tools".to_string()],
        }
    }
}

impl FleetConfig {
    /// Parse configuration from a YAML string
    ///
    /// A blank, comment-only or null document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let blank = yaml.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(yaml)?;
        Ok(config.unwrap_or_default())
    }

    /// Bridge used for clone NICs
    pub fn fleet_bridge(&self) -> &str {
        self.fleet.bridge.as_deref().unwrap_or(&self.template.bridge)
    }

    /// Check the configuration against a fleet of `count` clones
    pub fn validate(&self, count: u32) -> Result<(), ProvisionError> {
        if self.image.url.trim().is_empty() {
            return Err(ProvisionError::Config("image.url is empty".into()));
        }
        if self.image.checksum_url.trim().is_empty() {
            return Err(ProvisionError::Config("image.checksum_url is empty".into()));
        }

        let base = u64::from(self.fleet.clone_base_id);
        let last = base + u64::from(count);
        if last > u64::from(u32::MAX) {
            return Err(ProvisionError::Config(format!(
                "fleet of {} clones from base ID {} overflows the VM ID range",
                count, self.fleet.clone_base_id
            )));
        }

        let template_id = u64::from(self.template.id);
        if count > 0 && template_id > base && template_id <= last {
            return Err(ProvisionError::Config(format!(
                "template ID {} collides with clone IDs {}..={}",
                self.template.id,
                base + 1,
                last
            )));
        }

        if self.fleet.name_template.trim().is_empty() {
            return Err(ProvisionError::Config("fleet.name_template is empty".into()));
        }

        Ok(())
    }

    /// Warn about a network template that will render unchanged
    pub fn check_network_template(template: &str) {
        if !template.contains(PLACEHOLDER) {
            warn!(
                "Network template has no {} placeholder; every clone gets the same snippet",
                PLACEHOLDER
            );
        }
    }
}
