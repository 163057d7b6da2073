use anyhow::{Result, bail};
use host_probe::CommandRunner;
use host_probe::account::user_ids;
use tracing::{debug, info, warn};

use crate::config::{InstallLayout, NodeConfig};
use crate::installer::{InstallerStep, Stage};
use crate::render::Artifacts;
use crate::utils::StagedFile;

/// The env file carries the master API key.
const ENV_FILE_MODE: u32 = 0o600;
const UNIT_FILE_MODE: u32 = 0o644;

pub struct EnvironmentStep<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a NodeConfig,
    layout: &'a InstallLayout,
}

impl InstallerStep for EnvironmentStep<'_> {
    type Output = ();
    const STAGE: Stage = Stage::Environment;

    async fn execute(&self) -> Result<()> {
        info!("Step 4: Writing environment file and service unit...");

        let owner = self.service_owner().await?;
        let artifacts = Artifacts::render(self.config, self.layout);
        let env_path = self.layout.env_file();
        let unit_path = self.layout.unit_path();

        // The service reads its env file as the service user
        let env_file = StagedFile::write(&env_path, &artifacts.env_file, Some(ENV_FILE_MODE)).await?;
        if let Some((uid, gid)) = owner {
            if let Err(e) = env_file.set_owner(uid, gid).await {
                env_file.discard().await;
                return Err(e);
            }
        }
        let unit = match StagedFile::write(&unit_path, &artifacts.unit, Some(UNIT_FILE_MODE)).await {
            Ok(unit) => unit,
            Err(e) => {
                env_file.discard().await;
                return Err(e);
            }
        };

        let previous_env = match env_file.commit_replacing().await {
            Ok(previous) => previous,
            Err(e) => {
                unit.discard().await;
                return Err(e);
            }
        };
        if let Err(e) = unit.commit().await {
            if let Err(restore) = previous_env.restore().await {
                warn!("{:#}", restore);
            }
            return Err(e);
        }
        previous_env.keep().await;

        info!("Environment file written to {}", env_path.display());
        info!("Service unit written to {}", unit_path.display());
        info!("✓ Environment configured");
        Ok(())
    }
}

impl<'a> EnvironmentStep<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a NodeConfig, layout: &'a InstallLayout) -> Self {
        Self { runner, config, layout }
    }

    /// uid and gid the env file is handed to; `None` for root.
    async fn service_owner(&self) -> Result<Option<(u32, u32)>> {
        let user = &self.layout.user;
        if user == "root" {
            return Ok(None);
        }

        match user_ids(self.runner, user).await? {
            Some(ids) => {
                debug!("Service user {} is {}:{}", user, ids.0, ids.1);
                Ok(Some(ids))
            }
            None => bail!("Service user {} does not exist", user),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::path::Path;

    use host_probe::testing::ScriptedRunner;

    use super::*;
    use crate::config::{ExperimentBinding, MasterEndpoint, NodeIdentity, ServerBinding};
    use crate::utils::{backup_path, staging_path};

    fn config() -> NodeConfig {
        NodeConfig {
            identity: NodeIdentity {
                id: "lab-bench".into(),
                name: "Lab Pi bench".into(),
                mac: "dc:a6:32:01:02:03".into(),
                location: "Room 101".into(),
            },
            experiment: ExperimentBinding {
                experiment_id: "7".into(),
            },
            master: MasterEndpoint {
                url: "http://192.168.1.5:5000".into(),
                api_key: "s3cret".into(),
            },
            server: ServerBinding::default(),
        }
    }

    fn layout(root: &Path) -> InstallLayout {
        let mut layout = InstallLayout::for_user("pi", &root.join("home/pi"));
        layout.unit_dir = root.join("units");
        layout
    }

    /// Reports `pi` as the account running the tests, so chown needs no privileges.
    fn runner_for(root: &Path) -> (ScriptedRunner, u32, u32) {
        let meta = std::fs::metadata(root).unwrap();
        let (uid, gid) = (meta.uid(), meta.gid());
        let passwd = format!("pi:x:{}:{}::/home/pi:/bin/bash\n", uid, gid);
        (ScriptedRunner::new().respond("getent passwd pi", &passwd), uid, gid)
    }

    #[tokio::test]
    async fn writes_both_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        let config = config();
        let (runner, _, _) = runner_for(root.path());

        EnvironmentStep::new(&runner, &config, &layout).execute().await.unwrap();

        let expected = Artifacts::render(&config, &layout);
        assert_eq!(std::fs::read_to_string(layout.env_file()).unwrap(), expected.env_file);
        assert_eq!(std::fs::read_to_string(layout.unit_path()).unwrap(), expected.unit);
        assert!(!staging_path(&layout.env_file()).exists());
        assert!(!staging_path(&layout.unit_path()).exists());

        let mode = std::fs::metadata(layout.env_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn env_file_belongs_to_service_user() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        let (runner, uid, gid) = runner_for(root.path());

        EnvironmentStep::new(&runner, &config(), &layout).execute().await.unwrap();

        let meta = std::fs::metadata(layout.env_file()).unwrap();
        assert_eq!((meta.uid(), meta.gid()), (uid, gid));
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert!(runner.ran("getent passwd pi"));
    }

    #[tokio::test]
    async fn unknown_service_user_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        let runner = ScriptedRunner::new().fail("getent passwd pi", 2, "");

        let err = EnvironmentStep::new(&runner, &config(), &layout).execute().await.unwrap_err();

        assert!(err.to_string().contains("does not exist"));
        assert!(!layout.env_file().exists());
        assert!(!layout.unit_path().exists());
    }

    #[tokio::test]
    async fn rerun_produces_identical_files() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        let config = config();
        let (runner, _, _) = runner_for(root.path());

        EnvironmentStep::new(&runner, &config, &layout).execute().await.unwrap();
        let first = std::fs::read(layout.env_file()).unwrap();
        EnvironmentStep::new(&runner, &config, &layout).execute().await.unwrap();

        assert_eq!(std::fs::read(layout.env_file()).unwrap(), first);
        assert!(!backup_path(&layout.env_file()).exists());
    }

    #[tokio::test]
    async fn unit_failure_leaves_env_file_untouched() {
        let root = tempfile::tempdir().unwrap();
        let mut layout = layout(root.path());
        // A regular file where the unit directory should be
        std::fs::write(root.path().join("blocked"), "").unwrap();
        layout.unit_dir = root.path().join("blocked");
        std::fs::create_dir_all(&layout.project_dir).unwrap();
        std::fs::write(layout.env_file(), "OLD=1\n").unwrap();
        let (runner, _, _) = runner_for(root.path());

        assert!(EnvironmentStep::new(&runner, &config(), &layout).execute().await.is_err());

        assert_eq!(std::fs::read_to_string(layout.env_file()).unwrap(), "OLD=1\n");
        assert!(!staging_path(&layout.env_file()).exists());
    }

    #[tokio::test]
    async fn failed_unit_rename_restores_previous_env_file() {
        let root = tempfile::tempdir().unwrap();
        let layout = layout(root.path());
        // A non-empty directory cannot be replaced by the staged unit
        std::fs::create_dir_all(layout.unit_path().join("occupied")).unwrap();
        std::fs::create_dir_all(&layout.project_dir).unwrap();
        std::fs::write(layout.env_file(), "OLD=1\n").unwrap();
        let (runner, _, _) = runner_for(root.path());

        assert!(EnvironmentStep::new(&runner, &config(), &layout).execute().await.is_err());

        assert_eq!(std::fs::read_to_string(layout.env_file()).unwrap(), "OLD=1\n");
        assert!(!backup_path(&layout.env_file()).exists());
        assert!(!staging_path(&layout.env_file()).exists());
        assert!(!staging_path(&layout.unit_path()).exists());
    }
}
