//! Service accounts and file ownership.

use std::path::{Path, PathBuf};

use crate::error::{PlatformError, Result};

/// A resolved Unix account that daemons and commands run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    /// Login name.
    pub name: String,
    /// User ID.
    pub uid: u32,
    /// Primary group ID.
    pub gid: u32,
    /// Home directory.
    pub home: PathBuf,
}

impl ServiceAccount {
    /// Looks up an account in the user database.
    ///
    /// # Errors
    /// Returns [`PlatformError::Account`] if no such user exists.
    pub fn lookup(name: &str) -> Result<Self> {
        #[cfg(unix)]
        {
            let user = nix::unistd::User::from_name(name)
                .map_err(|e| PlatformError::Account(format!("{name}: {e}")))?
                .ok_or_else(|| PlatformError::Account(name.to_string()))?;
            Ok(Self {
                name: user.name,
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
                home: user.dir,
            })
        }

        #[cfg(not(unix))]
        {
            Err(PlatformError::not_supported(format!("account lookup for {name}")))
        }
    }

    /// The privileged account.
    #[must_use]
    pub fn root() -> Self {
        Self {
            name: "root".to_string(),
            uid: 0,
            gid: 0,
            home: PathBuf::from("/root"),
        }
    }

    /// Returns true for uid 0.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Environment a process running as this account should see.
    #[must_use]
    pub fn env(&self) -> [(&'static str, String); 3] {
        [
            ("HOME", self.home.display().to_string()),
            ("USER", self.name.clone()),
            ("LOGNAME", self.name.clone()),
        ]
    }

    /// Changes ownership of `path` to this account.
    ///
    /// # Errors
    /// Returns [`PlatformError::Resource`] if `chown(2)` fails.
    pub fn chown(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::unistd::{Gid, Uid, chown};
            chown(
                path,
                Some(Uid::from_raw(self.uid)),
                Some(Gid::from_raw(self.gid)),
            )
            .map_err(|e| PlatformError::resource(path, format!("chown to {}: {e}", self.name)))
        }

        #[cfg(not(unix))]
        {
            let _ = path;
            Err(PlatformError::not_supported("chown"))
        }
    }
}

/// Returns true if the current process runs with uid 0.
#[must_use]
pub fn running_as_root() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Sets the permission bits of `path`.
///
/// # Errors
/// Returns [`PlatformError::Resource`] if the mode cannot be changed.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| PlatformError::resource(path, format!("chmod {mode:o}: {e}")))
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}
