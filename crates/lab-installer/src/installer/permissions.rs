use anyhow::{Context, Result};
use host_probe::CommandRunner;
use host_probe::account::{add_to_group, group_exists, groups_of};
use strum::Display;
use tracing::{info, warn};

use crate::installer::{InstallerStep, Stage};

/// Groups granting access to GPIO, serial adapters and sound devices.
pub const HARDWARE_GROUPS: [&str; 3] = ["gpio", "dialout", "audio"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GroupChange {
    #[strum(to_string = "added")]
    Added,
    #[strum(to_string = "already a member")]
    AlreadyMember,
    #[strum(to_string = "group missing")]
    MissingGroup,
}

pub struct PermissionsStep<'a> {
    runner: &'a dyn CommandRunner,
    user: &'a str,
}

impl InstallerStep for PermissionsStep<'_> {
    type Output = Vec<(String, GroupChange)>;
    const STAGE: Stage = Stage::Permissions;

    async fn execute(&self) -> Result<Self::Output> {
        info!("Step 5: Granting hardware access to {}...", self.user);

        if self.user == "root" {
            info!("Target user is root, group membership not needed");
            return Ok(Vec::new());
        }

        let current = groups_of(self.runner, self.user)
            .await
            .with_context(|| format!("Failed to list groups of {}", self.user))?;

        let mut changes = Vec::with_capacity(HARDWARE_GROUPS.len());
        for group in HARDWARE_GROUPS {
            let change = self.ensure_member(group, &current).await?;
            changes.push((group.to_string(), change));
        }

        info!("✓ Hardware permissions configured");
        Ok(changes)
    }
}

impl<'a> PermissionsStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, user: &'a str) -> Self {
        Self { runner, user }
    }

    async fn ensure_member(&self, group: &str, current: &[String]) -> Result<GroupChange> {
        if current.iter().any(|g| g == group) {
            info!("{} is already in {} ✓", self.user, group);
            return Ok(GroupChange::AlreadyMember);
        }

        if !group_exists(self.runner, group).await? {
            warn!("Group {} does not exist on this system, skipping", group);
            return Ok(GroupChange::MissingGroup);
        }

        add_to_group(self.runner, self.user, group)
            .await
            .with_context(|| format!("Failed to add {} to {}", self.user, group))?;
        info!("Added {} to {} ✓", self.user, group);
        Ok(GroupChange::Added)
    }
}
