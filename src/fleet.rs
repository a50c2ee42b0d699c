//! Clone identifiers and names
//!
//! Clone `i` (1-based) of a fleet built on base ID `b` gets VM ID `b + i`,
//! VLAN tag `i + 1` and address value `offset + i`. Names come from a
//! Jinja template rendered with those values.

use minijinja::{Environment, context};

use crate::ProvisionError;
use crate::config::FleetConfig;

/// Everything derived for one clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSpec {
    /// 1-based position in the fleet
    pub index: u32,
    pub vmid: u32,
    pub vlan: u32,
    /// Value substituted into the network snippet
    pub address: u32,
    pub name: String,
}

/// Derive the numeric identifiers for clone `index`
///
/// Returns `(vmid, vlan, address)`.
pub fn derive(
    base_id: u32,
    address_offset: u32,
    index: u32,
) -> Result<(u32, u32, u32), ProvisionError> {
    let overflow = |what: &str| {
        ProvisionError::InvalidData(format!("{} overflows for clone index {}", what, index))
    };

    let vmid = base_id.checked_add(index).ok_or_else(|| overflow("VM ID"))?;
    let vlan = index.checked_add(1).ok_or_else(|| overflow("VLAN tag"))?;
    let address = address_offset
        .checked_add(index)
        .ok_or_else(|| overflow("address value"))?;

    Ok((vmid, vlan, address))
}

/// Renders clone names from a Jinja template
pub struct NameRenderer {
    template: String,
}

impl NameRenderer {
    /// Check the name template compiles
    pub fn new(template: &str) -> Result<Self, ProvisionError> {
        let mut env = Environment::new();
        env.add_template("name", template)
            .map_err(|e| ProvisionError::Template(format!("name template parse error: {}", e)))?;
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Render the name for one clone
    pub fn render(&self, index: u32, vmid: u32, vlan: u32) -> Result<String, ProvisionError> {
        let mut env = Environment::new();
        env.add_template("name", &self.template)
            .map_err(|e| ProvisionError::Template(format!("name template parse error: {}", e)))?;

        let tmpl = env
            .get_template("name")
            .map_err(|e| ProvisionError::Template(format!("name template error: {}", e)))?;

        let name = tmpl
            .render(context! { index => index, vmid => vmid, vlan => vlan })
            .map_err(|e| ProvisionError::Template(format!("name template render error: {}", e)))?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ProvisionError::Template(format!(
                "name template rendered an empty name for VM {}",
                vmid
            )));
        }
        Ok(name)
    }
}

/// Plan every clone of a fleet of `count`
pub fn plan(config: &FleetConfig, count: u32) -> Result<Vec<CloneSpec>, ProvisionError> {
    let names = NameRenderer::new(&config.fleet.name_template)?;

    (1..=count)
        .map(|index| {
            let (vmid, vlan, address) =
                derive(config.fleet.clone_base_id, config.fleet.address_offset, index)?;
            Ok(CloneSpec {
                index,
                vmid,
                vlan,
                address,
                name: names.render(index, vmid, vlan)?,
            })
        })
        .collect()
}
