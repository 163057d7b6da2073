//! Board detection from the device tree model string.

use std::path::Path;

use derive_more::Display;

/// Files that carry the board model, relative to the host root.
pub const MODEL_FILES: [&str; 2] = [
    "proc/device-tree/model",
    "sys/firmware/devicetree/base/model",
];

/// Represents the board the program is running on.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Platform {
    /// A Raspberry Pi board, with its full model string.
    #[display("{}", _0)]
    RaspberryPi(String),
    /// Some other device-tree board.
    #[display("{}", _0)]
    Other(String),

    /// No device tree model available (typical for x86 hosts).
    #[display("unknown")]
    Unknown,
}

impl Platform {
    /// Classify a model string as read from the device tree.
    pub fn from_model(model: &str) -> Self {
        let model = model.trim_end_matches('\0').trim();
        if model.is_empty() {
            Platform::Unknown
        } else if model.contains("Raspberry") {
            Platform::RaspberryPi(model.to_string())
        } else {
            Platform::Other(model.to_string())
        }
    }

    /// Detects the board by reading the device tree model under `root`.
    pub async fn detect(root: &Path) -> Self {
        for relative in MODEL_FILES {
            let path = root.join(relative);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let platform = Platform::from_model(&String::from_utf8_lossy(&bytes));
                    tracing::debug!("Detected platform from {}: {}", path.display(), platform);
                    return platform;
                }
                Err(_) => continue,
            }
        }

        tracing::debug!("No device tree model found under {}", root.display());
        Platform::Unknown
    }

    pub fn is_raspberry_pi(&self) -> bool {
        matches!(self, Platform::RaspberryPi(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_nul() {
        assert_eq!(
            Platform::from_model("Raspberry Pi 4 Model B Rev 1.4\0"),
            Platform::RaspberryPi("Raspberry Pi 4 Model B Rev 1.4".to_string())
        );
        assert_eq!(Platform::from_model("\0"), Platform::Unknown);
    }

    #[tokio::test]
    async fn detect_reads_device_tree_model() {
        let root = tempfile::tempdir().unwrap();
        let dt = root.path().join("proc/device-tree");
        std::fs::create_dir_all(&dt).unwrap();
        std::fs::write(dt.join("model"), b"Raspberry Pi 5 Model B Rev 1.0\0").unwrap();

        let platform = Platform::detect(root.path()).await;
        assert!(platform.is_raspberry_pi());
    }

    #[tokio::test]
    async fn detect_without_device_tree_is_unknown() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(Platform::detect(root.path()).await, Platform::Unknown);
    }
}
