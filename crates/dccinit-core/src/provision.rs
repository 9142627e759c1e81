//! Toolchain provisioning.
//!
//! Installing compilers is opaque to the supervisor: a [`Provisioner`]
//! succeeds or fails. [`CommandProvisioner`] runs an external installer once
//! and records success in a stamp file so later container starts skip it.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ProvisionConfig;
use crate::error::{Result, SupervisorError};
use crate::signals::exit_status_code;

/// What a provisioning pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Already provisioned; nothing ran.
    Skipped,
    /// The installer ran and succeeded.
    Completed,
}

/// Prepares the container before daemons start.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Runs the provisioning step.
    ///
    /// # Errors
    /// Returns [`SupervisorError::Provisioning`] on failure.
    async fn provision(&self) -> Result<ProvisionOutcome>;
}

/// Runs an external installer command.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    config: ProvisionConfig,
}

impl CommandProvisioner {
    /// Creates a provisioner from configuration.
    #[must_use]
    pub const fn new(config: ProvisionConfig) -> Self {
        Self { config }
    }

    fn is_stamped(&self) -> bool {
        self.config.stamp_file.as_deref().is_some_and(Path::exists)
    }

    fn write_stamp(&self) -> Result<()> {
        let Some(stamp) = self.config.stamp_file.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = stamp.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(stamp, b"")?;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self) -> Result<ProvisionOutcome> {
        if self.is_stamped() {
            tracing::info!(program = %self.config.program.display(), "already provisioned, skipping");
            return Ok(ProvisionOutcome::Skipped);
        }

        tracing::info!(program = %self.config.program.display(), "provisioning");
        let status = Command::new(&self.config.program)
            .args(&self.config.args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                SupervisorError::provisioning(format!(
                    "{}: {e}",
                    self.config.program.display()
                ))
            })?;

        if !status.success() {
            return Err(SupervisorError::provisioning(format!(
                "{} exited with code {}",
                self.config.program.display(),
                exit_status_code(status)
            )));
        }

        self.write_stamp()?;
        Ok(ProvisionOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn installer(script: &str, stamp: Option<PathBuf>) -> CommandProvisioner {
        CommandProvisioner::new(ProvisionConfig {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            stamp_file: stamp,
        })
    }

    #[tokio::test]
    async fn test_success_writes_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("state/compilers.stamp");
        let marker = dir.path().join("ran");
        let p = installer(&format!("touch {}", marker.display()), Some(stamp.clone()));

        assert_eq!(p.provision().await.unwrap(), ProvisionOutcome::Completed);
        assert!(stamp.exists());
        assert!(marker.exists());

        std::fs::remove_file(&marker).unwrap();
        assert_eq!(p.provision().await.unwrap(), ProvisionOutcome::Skipped);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_failure_leaves_no_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("compilers.stamp");
        let p = installer("exit 3", Some(stamp.clone()));

        let err = p.provision().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Provisioning(_)));
        assert!(err.to_string().contains("code 3"));
        assert!(!stamp.exists());
    }

    #[tokio::test]
    async fn test_without_stamp_always_runs() {
        let p = installer("true", None);
        assert_eq!(p.provision().await.unwrap(), ProvisionOutcome::Completed);
        assert_eq!(p.provision().await.unwrap(), ProvisionOutcome::Completed);
    }

    /// Running, as opposed to gone or a zombie awaiting reaping.
    fn running(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let state = stat.rsplit_once(") ")?.1.chars().next()?;
                Some(state != 'Z' && state != 'X')
            })
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_cancelled_provisioning_kills_installer() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("installer.pid");
        let p = installer(
            &format!("echo $$ > {}; exec sleep 30", pidfile.display()),
            None,
        );

        let cancelled = tokio::time::timeout(Duration::from_millis(300), p.provision()).await;
        assert!(cancelled.is_err());

        let pid: u32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while running(pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!running(pid), "installer {pid} survived cancellation");
    }

    #[tokio::test]
    async fn test_missing_installer() {
        let p = CommandProvisioner::new(ProvisionConfig {
            program: PathBuf::from("/nonexistent/install-compilers"),
            args: vec![],
            stamp_file: None,
        });
        assert!(p.provision().await.is_err());
    }
}
