//! Link-layer address lookup through sysfs.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Interfaces tried in order when looking for the node's MAC address.
/// Wired first; `end0` is the wired name on newer Raspberry Pi OS images.
pub const INTERFACE_PREFERENCE: [&str; 3] = ["eth0", "end0", "wlan0"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAddress {
    pub interface: String,
    pub mac: String,
}

fn mac_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-f]{2}(:[0-9a-f]{2}){5}$").expect("static MAC regex is valid")
    })
}

/// Whether `mac` is a colon-separated, lowercase-normalizable EUI-48 address.
pub fn is_valid_mac(mac: &str) -> bool {
    mac_pattern().is_match(&mac.trim().to_ascii_lowercase())
}

/// Return the address of the first existing interface in `interfaces`.
pub async fn first_link_address(root: &Path, interfaces: &[&str]) -> Option<LinkAddress> {
    for interface in interfaces {
        let dir = root.join("sys/class/net").join(interface);
        if !dir.exists() {
            debug!("Interface {} not present", interface);
            continue;
        }

        match tokio::fs::read_to_string(dir.join("address")).await {
            Ok(address) => {
                let mac = address.trim().to_ascii_lowercase();
                if mac.is_empty() {
                    continue;
                }
                debug!("Using {} address {}", interface, mac);
                return Some(LinkAddress {
                    interface: interface.to_string(),
                    mac,
                });
            }
            Err(e) => debug!("Cannot read address of {}: {}", interface, e),
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_interface(root: &Path, name: &str, mac: &str) {
        let dir = root.join("sys/class/net").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
    }

    #[tokio::test]
    async fn wired_is_preferred_over_wireless() {
        let root = tempfile::tempdir().unwrap();
        add_interface(root.path(), "wlan0", "dc:a6:32:00:00:02");
        add_interface(root.path(), "eth0", "DC:A6:32:00:00:01");

        let link = first_link_address(root.path(), &INTERFACE_PREFERENCE).await.unwrap();
        assert_eq!(link.interface, "eth0");
        assert_eq!(link.mac, "dc:a6:32:00:00:01");
    }

    #[tokio::test]
    async fn falls_through_to_wireless() {
        let root = tempfile::tempdir().unwrap();
        add_interface(root.path(), "wlan0", "dc:a6:32:00:00:02");

        let link = first_link_address(root.path(), &INTERFACE_PREFERENCE).await.unwrap();
        assert_eq!(link.interface, "wlan0");
    }

    #[tokio::test]
    async fn no_interfaces_yields_none() {
        let root = tempfile::tempdir().unwrap();
        assert!(first_link_address(root.path(), &INTERFACE_PREFERENCE).await.is_none());
    }

    #[test]
    fn mac_validation() {
        assert!(is_valid_mac("b8:27:eb:12:34:56"));
        assert!(is_valid_mac("B8:27:EB:12:34:56"));
        assert!(!is_valid_mac("b8-27-eb-12-34-56"));
        assert!(!is_valid_mac("unknown"));
    }
}
