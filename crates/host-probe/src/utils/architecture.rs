//! Architecture detection.

use derive_more::Display;

use crate::{CommandRunner, Invocation};

/// Represents the machine hardware name reported by `uname -m`.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Architecture {
    /// The x86_64 architecture.
    #[display("x86_64")]
    X64,
    /// The 32-bit x86 architecture.
    #[display("i686")]
    X86,
    /// The ARMv6l architecture (Pi Zero / Pi 1).
    #[display("armv6l")]
    Armv6l,
    /// The ARMv7l architecture.
    #[display("armv7l")]
    Armv7l,
    /// The Aarch64 (Arm64) architecture.
    #[display("aarch64")]
    Aarch64,

    /// An unknown architecture.
    #[display("{}", _0)]
    Unknown(String),
}

impl Architecture {
    /// Parse a machine name as printed by `uname -m`.
    pub fn from_machine(machine: &str) -> Self {
        match machine.trim() {
            "x86_64" | "amd64" => Architecture::X64,
            "x86" | "i386" | "i686" => Architecture::X86,
            "armv6l" => Architecture::Armv6l,
            "armv7l" | "arm" => Architecture::Armv7l,
            "aarch64" | "arm64" => Architecture::Aarch64,
            other => Architecture::Unknown(other.to_string()),
        }
    }

    /// Detects the architecture of the running kernel.
    ///
    /// Falls back to the compile target when `uname` cannot be run.
    pub async fn detect(runner: &dyn CommandRunner) -> Self {
        let arch = match runner.run(&Invocation::new("uname", ["-m"])).await {
            Ok(output) if output.success() && !output.stdout_trimmed().is_empty() => {
                Architecture::from_machine(output.stdout_trimmed())
            }
            _ => Architecture::from_machine(std::env::consts::ARCH),
        };

        tracing::debug!("Detected architecture: {}", arch);
        arch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn parses_uname_machine_names() {
        assert_eq!(Architecture::from_machine("aarch64\n"), Architecture::Aarch64);
        assert_eq!(Architecture::from_machine("armv7l"), Architecture::Armv7l);
        assert_eq!(Architecture::from_machine("x86_64"), Architecture::X64);
        assert_eq!(
            Architecture::from_machine("riscv64"),
            Architecture::Unknown("riscv64".to_string())
        );
    }

    #[test]
    fn display_matches_uname() {
        assert_eq!(Architecture::Aarch64.to_string(), "aarch64");
        assert_eq!(Architecture::Unknown("riscv64".into()).to_string(), "riscv64");
    }

    #[tokio::test]
    async fn detect_uses_uname_output() {
        let runner = ScriptedRunner::new().respond("uname -m", "armv6l\n");
        assert_eq!(Architecture::detect(&runner).await, Architecture::Armv6l);
    }
}
