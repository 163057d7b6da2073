//! Provisioning of a Virtual Lab "Lab Pi" node.
//!
//! [`Installer`] runs the pipeline: preflight, configuration, system packages,
//! source sync, environment file and unit, hardware groups, the optional UPS
//! driver and a final verification.

pub mod config;
pub mod installer;
pub mod prompt;
pub mod render;
pub mod resolve;
pub mod status;
pub mod summary;
pub mod utils;

pub use config::{AnswerFile, ConfigError, InstallLayout, InstallOptions, LayoutOverrides, NodeConfig};
pub use installer::{InstallError, InstallReport, Installer, Stage};
pub use prompt::{AcceptDefaults, Prompter, TerminalPrompter};
pub use render::Artifacts;
pub use resolve::{EnvSnapshot, Resolver};
pub use status::InstallStatus;
