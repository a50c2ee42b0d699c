//! Op constructors for the external tools
//!
//! One function per command line the pipeline issues. Program names come
//! from [`ToolsConfig`] so hosts with wrappers or non-standard paths work.

use std::path::Path;

use crate::config::{CustomizeConfig, TemplateConfig, ToolsConfig};
use crate::runner::Op;

// ==================== Host ====================

/// `which <program>`
pub fn which(program: &str) -> Op {
    Op::new("which").arg(program)
}

/// Install host packages non-interactively
pub fn install_host_packages(tools: &ToolsConfig) -> Op {
    Op::new(&tools.package_manager)
        .args(["install", "-y"])
        .args(tools.host_packages.iter().map(String::as_str))
        .env("DEBIAN_FRONTEND", "noninteractive")
}

/// List VM resources of the cluster as JSON
pub fn list_vm_resources(tools: &ToolsConfig) -> Op {
    Op::new(&tools.pvesh).args([
        "get",
        "/cluster/resources",
        "--type",
        "vm",
        "--output-format",
        "json",
    ])
}

// ==================== Image ====================

/// Grow the image file
pub fn resize_image(tools: &ToolsConfig, image: &Path, size: &str) -> Op {
    Op::new(&tools.qemu_img)
        .arg("resize")
        .arg(image.display().to_string())
        .arg(size)
}

fn customize(tools: &ToolsConfig, image: &Path) -> Op {
    Op::new(&tools.virt_customize)
        .arg("-a")
        .arg(image.display().to_string())
}

/// Run a shell command inside the image
pub fn customize_run(tools: &ToolsConfig, image: &Path, command: &str) -> Op {
    customize(tools, image).arg("--run-command").arg(command)
}

/// Grow the root partition to fill the disk
pub fn grow_partition(tools: &ToolsConfig, image: &Path, settings: &CustomizeConfig) -> Op {
    customize_run(
        tools,
        image,
        &format!("growpart {} {}", settings.root_device, settings.root_partition),
    )
}

/// Resize the root filesystem to fill its partition
pub fn resize_filesystem(tools: &ToolsConfig, image: &Path, settings: &CustomizeConfig) -> Op {
    customize_run(
        tools,
        image,
        &format!("resize2fs {}{}", settings.root_device, settings.root_partition),
    )
}

/// Install packages into the image
pub fn install_image_packages(tools: &ToolsConfig, image: &Path, packages: &[String]) -> Op {
    customize(tools, image)
        .arg("--install")
        .arg(packages.join(","))
}

/// Empty /etc/machine-id so it is regenerated on first boot
pub fn reset_machine_id(tools: &ToolsConfig, image: &Path) -> Op {
    customize(tools, image).args(["--truncate", "/etc/machine-id"])
}

// ==================== VMs ====================

fn qm(tools: &ToolsConfig, subcommand: &str, vmid: u32) -> Op {
    Op::new(&tools.qm).arg(subcommand).arg(vmid.to_string())
}

/// Destroy a VM and everything referencing it
pub fn destroy_vm(tools: &ToolsConfig, vmid: u32) -> Op {
    qm(tools, "destroy", vmid).arg("--purge")
}

/// Create the template VM object
pub fn create_vm(tools: &ToolsConfig, template: &TemplateConfig) -> Op {
    qm(tools, "create", template.id)
        .arg("--name")
        .arg(&template.name)
        .arg("--memory")
        .arg(template.memory.to_string())
        .arg("--cores")
        .arg(template.cores.to_string())
        .arg("--net0")
        .arg(format!("virtio,bridge={}", template.bridge))
        .args(["--scsihw", "virtio-scsi-pci"])
        .args(["--ostype", "l26"])
        .args(["--agent", "enabled=1"])
        .args(["--serial0", "socket", "--vga", "serial0"])
}

/// Import the image as the boot disk
pub fn import_disk(tools: &ToolsConfig, template: &TemplateConfig, image: &Path) -> Op {
    qm(tools, "set", template.id)
        .arg("--scsi0")
        .arg(format!("{}:0,import-from={}", template.storage, image.display()))
}

/// Attach the cloud-init drive and boot from the imported disk
pub fn attach_cloudinit(tools: &ToolsConfig, template: &TemplateConfig) -> Op {
    qm(tools, "set", template.id)
        .arg("--ide2")
        .arg(format!("{}:cloudinit", template.storage))
        .args(["--boot", "order=scsi0"])
}

/// Set the cloud-init user and keys
pub fn set_cloudinit_user(tools: &ToolsConfig, template: &TemplateConfig) -> Op {
    let op = qm(tools, "set", template.id)
        .arg("--ciuser")
        .arg(&template.ci_user);
    match &template.ssh_keys {
        Some(keys) => op.arg("--sshkeys").arg(keys.display().to_string()),
        None => op,
    }
}

/// Convert a VM into a template
pub fn convert_to_template(tools: &ToolsConfig, vmid: u32) -> Op {
    qm(tools, "template", vmid)
}

/// Full clone of the template
pub fn clone_vm(tools: &ToolsConfig, template_id: u32, vmid: u32, name: &str) -> Op {
    qm(tools, "clone", template_id)
        .arg(vmid.to_string())
        .args(["--name", name, "--full"])
}

/// Attach the first NIC to `bridge` with a VLAN tag
pub fn set_vlan(tools: &ToolsConfig, vmid: u32, bridge: &str, vlan: u32) -> Op {
    qm(tools, "set", vmid)
        .arg("--net0")
        .arg(format!("virtio,bridge={},tag={}", bridge, vlan))
}

/// Point the clone's cloud-init network config at a snippet
pub fn set_network_snippet(tools: &ToolsConfig, vmid: u32, storage: &str, file: &str) -> Op {
    qm(tools, "set", vmid)
        .arg("--cicustom")
        .arg(format!("network={}:snippets/{}", storage, file))
}

/// Start a VM
pub fn start_vm(tools: &ToolsConfig, vmid: u32) -> Op {
    qm(tools, "start", vmid)
}
