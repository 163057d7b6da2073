//! User and group queries.

use std::path::PathBuf;

use crate::{CommandRunner, ExecutionError, Invocation, ProbeError};

/// The user the node is provisioned for: the sudo caller if there is one.
pub fn invoking_user(sudo_user: Option<&str>, user: Option<&str>) -> String {
    [sudo_user, user]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or("root")
        .to_string()
}

pub async fn effective_uid(runner: &dyn CommandRunner) -> Result<u32, ProbeError> {
    let invocation = Invocation::new("id", ["-u"]);
    let output = runner.run_checked(&invocation).await?;
    output
        .stdout_trimmed()
        .parse()
        .map_err(|_| ProbeError::UnexpectedOutput {
            command: invocation.command_line(),
            output: output.stdout.clone(),
        })
}

/// Home directory of `user` from the passwd database.
pub async fn home_dir(runner: &dyn CommandRunner, user: &str) -> Result<Option<PathBuf>, ProbeError> {
    let output = runner.run(&Invocation::new("getent", ["passwd", user])).await?;
    if !output.success() {
        return Ok(None);
    }

    Ok(output
        .stdout_trimmed()
        .split(':')
        .nth(5)
        .filter(|home| !home.is_empty())
        .map(PathBuf::from))
}

/// Numeric uid and gid of `user` from the passwd database.
pub async fn user_ids(runner: &dyn CommandRunner, user: &str) -> Result<Option<(u32, u32)>, ProbeError> {
    let output = runner.run(&Invocation::new("getent", ["passwd", user])).await?;
    if !output.success() {
        return Ok(None);
    }

    let fields: Vec<&str> = output.stdout_trimmed().split(':').collect();
    match (fields.get(2), fields.get(3)) {
        (Some(uid), Some(gid)) => match (uid.parse(), gid.parse()) {
            (Ok(uid), Ok(gid)) => Ok(Some((uid, gid))),
            _ => Err(ProbeError::UnexpectedOutput {
                command: format!("getent passwd {}", user),
                output: output.stdout.clone(),
            }),
        },
        _ => Ok(None),
    }
}

pub async fn group_exists(runner: &dyn CommandRunner, group: &str) -> Result<bool, ProbeError> {
    let output = runner.run(&Invocation::new("getent", ["group", group])).await?;
    Ok(output.success())
}

pub async fn groups_of(runner: &dyn CommandRunner, user: &str) -> Result<Vec<String>, ProbeError> {
    let output = runner.run_checked(&Invocation::new("id", ["-nG", user])).await?;
    Ok(output
        .stdout_trimmed()
        .split_whitespace()
        .map(str::to_string)
        .collect())
}

/// Add `user` to `group`; a no-op for existing members.
pub async fn add_to_group(
    runner: &dyn CommandRunner,
    user: &str,
    group: &str,
) -> Result<(), ExecutionError> {
    runner
        .run_checked(&Invocation::new("usermod", ["-aG", group, user]))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[test]
    fn sudo_user_wins_over_user() {
        assert_eq!(invoking_user(Some("pi"), Some("root")), "pi");
        assert_eq!(invoking_user(Some(""), Some("lab")), "lab");
        assert_eq!(invoking_user(None, None), "root");
    }

    #[tokio::test]
    async fn home_dir_reads_sixth_passwd_field() {
        let runner = ScriptedRunner::new()
            .respond("getent passwd pi", "pi:x:1000:1000:,,,:/home/pi:/bin/bash\n");
        assert_eq!(
            home_dir(&runner, "pi").await.unwrap(),
            Some(PathBuf::from("/home/pi"))
        );
    }

    #[tokio::test]
    async fn user_ids_read_third_and_fourth_passwd_fields() {
        let runner = ScriptedRunner::new()
            .respond("getent passwd pi", "pi:x:1000:1001:,,,:/home/pi:/bin/bash\n")
            .fail("getent passwd ghost", 2, "");

        assert_eq!(user_ids(&runner, "pi").await.unwrap(), Some((1000, 1001)));
        assert_eq!(user_ids(&runner, "ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_group_is_not_an_error() {
        let runner = ScriptedRunner::new().fail("getent group gpio", 2, "");
        assert!(!group_exists(&runner, "gpio").await.unwrap());
    }

    #[tokio::test]
    async fn effective_uid_parses_id_output() {
        let runner = ScriptedRunner::new().respond("id -u", "0\n");
        assert_eq!(effective_uid(&runner).await.unwrap(), 0);
    }
}
