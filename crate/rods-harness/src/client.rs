use crate::HarnessError;
use rods_types::RodsPath;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Blocking access to the remote service's data and admin primitives.
///
/// The harness only relies on the contracts stated here; the wire
/// protocol and the service's own consistency model belong to the
/// implementation behind this trait.
pub trait RodsClient {
    /// Create the collection at `path`.
    ///
    /// With `make_parents`, every missing ancestor is created first
    /// and an already-existing target collection is tolerated.
    /// Without it, an existing target is an error. A path element
    /// that exists but is not a collection is always an error.
    fn mkdir(&self, path: &RodsPath, make_parents: bool) -> Result<(), HarnessError>;

    /// Remove the resource at `path`.
    ///
    /// With `force`, an already-absent target is tolerated. Removing
    /// a non-empty collection requires `recursive`.
    fn rm(&self, path: &RodsPath, force: bool, recursive: bool) -> Result<(), HarnessError>;

    /// Copy `local` to `remote`, byte for byte.
    ///
    /// A single file lands as a data object; a directory requires
    /// `recursive` and lands as a collection tree under `remote`,
    /// relative structure preserved. Partial transfers are reported,
    /// not rolled back.
    fn put(&self, local: &Path, remote: &RodsPath, recursive: bool) -> Result<(), HarnessError>;

    /// Create the named group. Requires admin capability. Creating a
    /// group that already exists is not an error.
    fn mkgroup(&self, name: &str) -> Result<(), HarnessError>;

    /// Remove the named group. Requires admin capability. Removing a
    /// group that does not exist is not an error.
    fn rmgroup(&self, name: &str) -> Result<(), HarnessError>;

    /// Return true if the connected user has admin capability.
    fn have_admin(&self) -> bool;
}

/// [RodsClient] backed by the icommands installed on this host.
///
/// Commands run with the iRODS environment of the calling user, the
/// same way they would from a shell.
#[derive(Clone, Copy, Debug, Default)]
pub struct Icommands;

impl Icommands {
    pub fn new() -> Icommands {
        Icommands
    }
}

impl RodsClient for Icommands {
    fn mkdir(&self, path: &RodsPath, make_parents: bool) -> Result<(), HarnessError> {
        let mut cmd = Command::new("imkdir");
        if make_parents {
            cmd.arg("-p");
        }
        cmd.arg(path.as_str());

        let output = run(&mut cmd).map_err(|err| HarnessError::creation(path, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_text(&output);
        if make_parents && already_exists(&stderr) {
            return Ok(());
        }

        Err(HarnessError::creation(path, stderr))
    }

    fn rm(&self, path: &RodsPath, force: bool, recursive: bool) -> Result<(), HarnessError> {
        let mut cmd = Command::new("irm");
        if recursive {
            cmd.arg("-r");
        }
        if force {
            cmd.arg("-f");
        }
        cmd.arg(path.as_str());

        let output = run(&mut cmd).map_err(|err| HarnessError::removal(path, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_text(&output);
        if force && already_absent(&stderr) {
            return Ok(());
        }

        Err(HarnessError::removal(path, stderr))
    }

    fn put(&self, local: &Path, remote: &RodsPath, recursive: bool) -> Result<(), HarnessError> {
        let mut cmd = Command::new("iput");
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg(local).arg(remote.as_str());

        let output = run(&mut cmd).map_err(|err| HarnessError::transfer(remote, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }

        Err(HarnessError::transfer(remote, stderr_text(&output)))
    }

    fn mkgroup(&self, name: &str) -> Result<(), HarnessError> {
        let output = run(Command::new("iadmin").args(["mkgroup", name]))
            .map_err(|err| HarnessError::creation(name, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_text(&output);
        if already_exists(&stderr) {
            return Ok(());
        }

        Err(HarnessError::creation(name, stderr))
    }

    fn rmgroup(&self, name: &str) -> Result<(), HarnessError> {
        let output = run(Command::new("iadmin").args(["rmgroup", name]))
            .map_err(|err| HarnessError::removal(name, err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = stderr_text(&output);
        if already_absent(&stderr) {
            return Ok(());
        }

        Err(HarnessError::removal(name, stderr))
    }

    fn have_admin(&self) -> bool {
        match run(Command::new("iadmin").arg("lu")) {
            Ok(output) => output.status.success(),
            Err(err) => {
                log::debug!("iadmin unavailable: {err}");
                false
            }
        }
    }
}

fn run(cmd: &mut Command) -> std::io::Result<Output> {
    log::debug!("running {cmd:?}");
    cmd.stdin(Stdio::null()).output()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Classify server errors that mean the target is already there.
fn already_exists(stderr: &str) -> bool {
    stderr.contains("CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME")
        || stderr.contains("CAT_NAME_EXISTS_AS_COLLECTION")
}

/// Classify server errors that mean the target was never there.
fn already_absent(stderr: &str) -> bool {
    stderr.contains("does not exist")
        || stderr.contains("USER_FILE_DOES_NOT_EXIST")
        || stderr.contains("CAT_NO_ROWS_FOUND")
        || stderr.contains("CAT_INVALID_GROUP")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_already_exists() {
        assert!(already_exists(
            "ERROR: mkgroupUtil: mkgroup ss_study_01 failure, status = -809000 \
             CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME"
        ));
        assert!(already_exists(
            "ERROR: mkdirUtil: mkColl failed, status = -821000 CAT_NAME_EXISTS_AS_COLLECTION"
        ));
        assert!(!already_exists("ERROR: connectToRhost: connect failed"));
    }

    #[test]
    fn classify_already_absent() {
        assert!(already_absent(
            "ERROR: rmUtil: srcPath /testZone/home/irods/test does not exist"
        ));
        assert!(already_absent(
            "ERROR: rmgroupUtil: rmgroup failed, status = -829000 CAT_INVALID_GROUP"
        ));
        assert!(!already_absent("ERROR: SYS_NO_API_PRIV"));
    }
}
