//! Kernel WireGuard driver
//!
//! Manages WireGuard links with the `ip` and `wg` tools. Cryptography and
//! packet handling stay in the kernel module; this only configures it.

use crate::config::{DeviceConfig, DeviceState};
use crate::driver::TunnelDriver;
use crate::dump::{parse_ip_addr_json, parse_wg_dump};
use crate::error::{OverlayError, Result};
use crate::keys::WgKey;
use async_trait::async_trait;
use ipnet::IpNet;
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Kernel limit for interface names (IFNAMSIZ - 1)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Static flag to track whether `ip` and `wg` have been verified.
static TOOLS_CHECKED: OnceLock<bool> = OnceLock::new();

/// Ensure the `ip` and `wg` binaries are on the PATH.
///
/// Checked once per process lifetime.
pub(crate) async fn ensure_tools() -> Result<()> {
    if let Some(&available) = TOOLS_CHECKED.get() {
        return if available {
            Ok(())
        } else {
            Err(OverlayError::ToolsNotAvailable(
                "iproute2 or wireguard-tools missing".to_string(),
            ))
        };
    }

    for tool in ["ip", "wg"] {
        let found = Command::new("which")
            .arg(tool)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !found {
            let _ = TOOLS_CHECKED.set(false);
            return Err(OverlayError::ToolsNotAvailable(format!(
                "'{tool}' not found. Install iproute2 and wireguard-tools in the node image"
            )));
        }
    }

    let _ = TOOLS_CHECKED.set(true);
    Ok(())
}

/// Whether an `ip` failure means the object is already present
fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("File exists")
}

/// Whether an `ip` failure means the link is missing
fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("Cannot find device") || stderr.contains("does not exist")
}

/// Whether a `wg set` failure is about the peer values themselves: a
/// malformed key, endpoint or allowed IP, or one the kernel refuses
fn is_peer_rejection(stderr: &str) -> bool {
    const MARKERS: [&str; 5] = [
        "Key is not the correct length or format",
        "Unable to parse",
        "Unable to find port",
        "Persistent keepalive interval",
        "Invalid argument",
    ];
    MARKERS.iter().any(|marker| stderr.contains(marker))
}

fn command_error(what: &str, output: &Output) -> OverlayError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("Operation not permitted") {
        return OverlayError::PermissionDenied(format!("{what}: {}", stderr.trim()));
    }
    OverlayError::TransportCommand(format!("{what}: {}", stderr.trim()))
}

/// [`TunnelDriver`] backed by the kernel WireGuard module
#[derive(Debug, Default, Clone)]
pub struct KernelWireGuard;

impl KernelWireGuard {
    /// Create a new kernel driver
    pub fn new() -> Self {
        Self
    }

    async fn ip(&self, args: &[&str]) -> Result<Output> {
        ensure_tools().await?;
        debug!(args = ?args, "ip");
        Ok(Command::new("ip").args(args).output().await?)
    }

    /// Run `wg set`, optionally feeding a private key on stdin.
    async fn wg_set(&self, args: &[String], private_key: Option<&WgKey>) -> Result<Output> {
        ensure_tools().await?;
        debug!(
            args = ?args.iter().take(4).collect::<Vec<_>>(),
            private_key = private_key.is_some(),
            "wg set"
        );

        let mut child = Command::new("wg")
            .arg("set")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(key) = private_key {
                stdin.write_all(format!("{key}\n").as_bytes()).await?;
            }
            stdin.shutdown().await?;
        }

        Ok(child.wait_with_output().await?)
    }
}

#[async_trait]
impl TunnelDriver for KernelWireGuard {
    async fn create_interface(&self, name: &str) -> Result<()> {
        if name.len() > MAX_INTERFACE_NAME_LEN {
            return Err(OverlayError::TransportCommand(format!(
                "Interface name '{name}' exceeds {MAX_INTERFACE_NAME_LEN} character limit"
            )));
        }

        let output = self
            .ip(&["link", "add", "dev", name, "type", "wireguard"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_already_exists(&stderr) {
                debug!(interface = %name, "WireGuard interface already exists");
                return Ok(());
            }
            return Err(command_error("Failed to create WireGuard interface", &output));
        }

        info!(interface = %name, "Created WireGuard interface");
        Ok(())
    }

    async fn interface_addresses(&self, name: &str) -> Result<Vec<IpNet>> {
        let output = self.ip(&["-j", "addr", "show", "dev", name]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_device(&stderr) {
                return Err(OverlayError::InterfaceNotFound(name.to_string()));
            }
            return Err(command_error("Failed to list addresses", &output));
        }
        parse_ip_addr_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn assign_address(&self, name: &str, address: IpNet) -> Result<()> {
        let addr = address.to_string();
        let output = self.ip(&["addr", "add", &addr, "dev", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Ignore "already exists" -- idempotent
            if !is_already_exists(&stderr) {
                return Err(command_error("Failed to assign IP", &output));
            }
        }
        Ok(())
    }

    async fn set_up(&self, name: &str) -> Result<()> {
        let output = self.ip(&["link", "set", "dev", name, "up"]).await?;
        if !output.status.success() {
            return Err(command_error("Failed to bring up WireGuard interface", &output));
        }
        Ok(())
    }

    async fn device(&self, name: &str) -> Result<DeviceState> {
        ensure_tools().await?;
        let output = Command::new("wg").args(["show", name, "dump"]).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such device") {
                return Err(OverlayError::InterfaceNotFound(name.to_string()));
            }
            return Err(command_error("Failed to read WireGuard device", &output));
        }
        parse_wg_dump(name, &String::from_utf8_lossy(&output.stdout))
    }

    async fn configure(&self, name: &str, config: &DeviceConfig) -> Result<()> {
        let mut args = vec![name.to_string()];
        if let Some(port) = config.listen_port {
            args.push("listen-port".to_string());
            args.push(port.to_string());
        }
        if config.private_key.is_some() {
            args.push("private-key".to_string());
            args.push("/dev/stdin".to_string());
        }
        for peer in &config.peers {
            args.extend(peer.to_wg_args());
        }

        let output = self.wg_set(&args, config.private_key.as_ref()).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if config.peers.is_empty() || !is_peer_rejection(&stderr) {
                return Err(command_error("Failed to configure WireGuard device", &output));
            }
            let peer = config
                .peers
                .iter()
                .map(|p| p.public_key.to_base64())
                .collect::<Vec<_>>()
                .join(",");
            return Err(OverlayError::ConfigurationRejected {
                peer,
                reason: stderr,
            });
        }
        Ok(())
    }

    async fn remove_peer(&self, name: &str, public_key: &WgKey) -> Result<()> {
        let args = vec![
            name.to_string(),
            "peer".to_string(),
            public_key.to_base64(),
            "remove".to_string(),
        ];
        let output = self.wg_set(&args, None).await?;
        if !output.status.success() {
            return Err(command_error("Failed to remove WireGuard peer", &output));
        }
        Ok(())
    }

    async fn delete_interface(&self, name: &str) -> Result<bool> {
        let output = self.ip(&["link", "delete", "dev", name]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Ignore "not found" errors
            if is_missing_device(&stderr) {
                return Ok(false);
            }
            return Err(command_error("Failed to delete WireGuard interface", &output));
        }
        info!(interface = %name, "Deleted WireGuard interface");
        Ok(true)
    }

    async fn add_route(&self, name: &str, destination: IpNet) -> Result<()> {
        let dst = destination.to_string();
        let output = self
            .ip(&["route", "add", &dst, "dev", name, "scope", "link"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_already_exists(&stderr) {
                debug!(destination = %dst, interface = %name, "Route already present");
                return Ok(());
            }
            return Err(command_error("Failed to add route", &output));
        }
        info!(destination = %dst, interface = %name, "Installed route");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_detection() {
        assert!(is_already_exists("RTNETLINK answers: File exists\n"));
        assert!(!is_already_exists("RTNETLINK answers: Operation not permitted"));
    }

    #[test]
    fn test_missing_device_detection() {
        assert!(is_missing_device("Cannot find device \"wga\""));
        assert!(is_missing_device("Device \"wgg\" does not exist."));
        assert!(!is_missing_device("RTNETLINK answers: File exists"));
    }

    #[test]
    fn test_peer_rejection_detection() {
        assert!(is_peer_rejection("Key is not the correct length or format: `abc'"));
        assert!(is_peer_rejection("Unable to parse IP address: `10.0.0.300'"));
        assert!(is_peer_rejection("Unable to modify interface: Invalid argument"));
        assert!(!is_peer_rejection("Unable to modify interface: No such device"));
        assert!(!is_peer_rejection("Unable to modify interface: Operation not permitted"));
    }

    #[test]
    fn test_permission_failure_is_not_a_rejection() {
        use std::os::unix::process::ExitStatusExt;
        let output = Output {
            status: std::process::ExitStatus::from_raw(1 << 8),
            stdout: Vec::new(),
            stderr: b"Unable to modify interface: Operation not permitted\n".to_vec(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!is_peer_rejection(&stderr));
        assert!(matches!(
            command_error("Failed to configure WireGuard device", &output),
            OverlayError::PermissionDenied(_)
        ));
    }

    #[tokio::test]
    async fn test_interface_name_limit() {
        let driver = KernelWireGuard::new();
        let err = driver
            .create_interface("wgmesh-interface-too-long")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("character limit"));
    }

    #[tokio::test]
    #[ignore = "Requires CAP_NET_ADMIN and the wireguard kernel module"]
    async fn test_create_interface_is_idempotent() {
        let driver = KernelWireGuard::new();
        driver.create_interface("wgm-test0").await.unwrap();
        driver.create_interface("wgm-test0").await.unwrap();
        assert!(driver.delete_interface("wgm-test0").await.unwrap());
        assert!(!driver.delete_interface("wgm-test0").await.unwrap());
    }
}
