use std::path::{Path, PathBuf};

use tracing::debug;

use crate::network::{first_link_address, LinkAddress, INTERFACE_PREFERENCE};
use crate::{Architecture, CommandRunner, Invocation, Platform};

const HOSTNAME_FILES: [&str; 2] = ["proc/sys/kernel/hostname", "etc/hostname"];

/// Facts about the machine being provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    /// Filesystem root the facts were read from (`/` outside tests).
    pub root: PathBuf,
    pub hostname: String,
    pub architecture: Architecture,
    pub platform: Platform,
    pub link: Option<LinkAddress>,
}

impl HostFacts {
    pub async fn gather(root: &Path, runner: &dyn CommandRunner) -> Self {
        let hostname = read_hostname(root, runner).await;
        let architecture = Architecture::detect(runner).await;
        let platform = Platform::detect(root).await;
        let link = first_link_address(root, &INTERFACE_PREFERENCE).await;

        Self {
            root: root.to_path_buf(),
            hostname,
            architecture,
            platform,
            link,
        }
    }

    /// MAC of the preferred interface, or empty when none was found.
    pub fn mac(&self) -> &str {
        self.link.as_ref().map(|link| link.mac.as_str()).unwrap_or("")
    }
}

async fn read_hostname(root: &Path, runner: &dyn CommandRunner) -> String {
    for relative in HOSTNAME_FILES {
        if let Ok(content) = tokio::fs::read_to_string(root.join(relative)).await {
            let name = content.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    match runner.run(&Invocation::new("hostname", Vec::<String>::new())).await {
        Ok(output) if output.success() && !output.stdout_trimmed().is_empty() => {
            output.stdout_trimmed().to_string()
        }
        _ => {
            debug!("Could not determine hostname, using localhost");
            "localhost".to_string()
        }
    }
}
