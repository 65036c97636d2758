//! Staged, all-or-nothing file writes.
//!
//! Files are written into a private staging directory next to their targets and only linked
//! into place by [`FileTransaction::commit`]. Placing never replaces an existing file. Dropping
//! the transaction removes whatever was staged.

use kerbldap_core::{Error, Result};
use nix::unistd::{chown, Gid, Uid};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Owner applied to a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwner {
    /// User id.
    pub uid: Uid,
    /// Group id.
    pub gid: Gid,
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

/// Files waiting to be linked into place.
#[derive(Debug)]
pub struct FileTransaction {
    staging: TempDir,
    files: Vec<StagedFile>,
}

impl FileTransaction {
    /// Opens a transaction staging under `root`, which must share a filesystem with the targets.
    ///
    /// While `root` does not exist the staging directory goes into its closest existing
    /// ancestor; missing directories are only created on commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the staging directory cannot be created.
    pub fn new(root: &Path) -> Result<Self> {
        let anchor = root
            .ancestors()
            .find(|dir| dir.is_dir())
            .ok_or_else(|| Error::Io(format!("no existing directory above {}", root.display())))?;
        let staging = tempfile::Builder::new()
            .prefix(".kerbldap-staging-")
            .tempdir_in(anchor)?;
        debug!(staging = %staging.path().display(), "staging directory");
        Ok(Self {
            staging,
            files: Vec::new(),
        })
    }

    /// Fails if any target already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactCollision`] naming the first existing target.
    pub fn check_absent<P: AsRef<Path>>(targets: &[P]) -> Result<()> {
        match targets.iter().map(AsRef::as_ref).find(|target| target.exists()) {
            Some(existing) => Err(collision(existing)),
            None => Ok(()),
        }
    }

    /// Reserves a staging path for `target` without writing it.
    ///
    /// Used for files produced by external tools; a staged path left unwritten is skipped on
    /// commit.
    pub fn stage(&mut self, target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map_or_else(|| "file".into(), |name| name.to_string_lossy().into_owned());
        let staged = self.staging.path().join(format!("{}-{name}", self.files.len()));
        self.files.push(StagedFile {
            staged: staged.clone(),
            target: target.to_path_buf(),
        });
        staged
    }

    /// Stages `contents` for `target` with the given permission bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the staged file cannot be written.
    pub fn write(&mut self, target: &Path, contents: &str, mode: u32) -> Result<PathBuf> {
        let staged = self.stage(target);
        fs::write(&staged, contents)?;
        fs::set_permissions(&staged, fs::Permissions::from_mode(mode))?;
        Ok(staged)
    }

    /// Hands a staged file to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the ownership change is refused.
    pub fn set_owner(staged: &Path, owner: FileOwner) -> Result<()> {
        chown(staged, Some(owner.uid), Some(owner.gid))
            .map_err(|err| Error::Io(format!("chown {}: {err}", staged.display())))
    }

    /// Links every staged file into place.
    ///
    /// If one file cannot be placed the files already placed are removed again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactCollision`] when a target appeared since staging and
    /// [`Error::Io`] for any other failure.
    pub fn commit(mut self) -> Result<CommittedFiles> {
        let mut committed = CommittedFiles::default();
        for file in std::mem::take(&mut self.files) {
            if !file.staged.exists() {
                debug!(path = %file.target.display(), "nothing staged, skipping");
                continue;
            }
            if let Err(err) = place(&file) {
                committed.revert();
                return Err(err);
            }
            debug!(path = %file.target.display(), "committed");
            committed.targets.push(file.target);
        }
        Ok(committed)
    }
}

// A hard link fails on an existing target where a rename would replace it. The staged name
// goes away with the staging directory.
fn place(file: &StagedFile) -> Result<()> {
    if let Some(parent) = file.target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::hard_link(&file.staged, &file.target).map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => collision(&file.target),
        _ => Error::Io(format!(
            "cannot move {} into place: {err}",
            file.target.display()
        )),
    })
}

fn collision(existing: &Path) -> Error {
    Error::ArtifactCollision(format!(
        "File '{}' exists, exiting to avoid damage",
        existing.display()
    ))
}

/// Files placed by a commit, kept so a later failure can take them back.
#[derive(Debug, Default)]
pub struct CommittedFiles {
    targets: Vec<PathBuf>,
}

impl CommittedFiles {
    /// Final paths written.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Removes every committed file.
    pub fn revert(self) {
        for target in self.targets.iter().rev() {
            if let Err(err) = fs::remove_file(target) {
                warn!("Cannot remove {}: {err}", target.display());
            }
        }
    }
}
