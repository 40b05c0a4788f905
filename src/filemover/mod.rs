//! FileMover: the only Worker allowed to perform archive restore/archive
//! and bulk filesystem moves (`spec.md` §2/§9). All workers that need raw
//! file bytes go through `restore`/`remove`; `move`/`archive` belong to
//! intake.
//!
//! `archive`/`restore` shell out to `rar`/`unrar` per the Design Note in
//! `spec.md` §9 and `SPEC_FULL.md`'s archive-format-preservation
//! supplement, invoked from the archive's parent directory with a
//! relative target name so the on-disk `.rar` stays bit-compatible —
//! ported from `original_source/apps/sys/FileMover.py::Archive`.

use crate::error::{Result, SonicatError};
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct FileMover {
    /// `/tmp/sonicat-<worker>`, owned exclusively by this FileMover for
    /// writes (`spec.md` §5); other workers only read from it.
    temp_root: PathBuf,
}

impl FileMover {
    pub fn new(worker_moniker: &str) -> Self {
        Self { temp_root: PathBuf::from(format!("/tmp/sonicat-{worker_moniker}")) }
    }

    pub fn with_temp_root(temp_root: impl Into<PathBuf>) -> Self {
        Self { temp_root: temp_root.into() }
    }

    pub fn temp_path(&self, cname: &str) -> PathBuf {
        self.temp_root.join(cname)
    }

    /// Moves a directory or file tree from `from` to `to`, falling back
    /// to copy-then-remove when `from`/`to` cross filesystems (`rename`
    /// returning `EXDEV`).
    pub fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SonicatError::External(format!("cannot create '{}': {e}", parent.display())))?;
        }
        match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
                copy_dir_recursive(from, to)?;
                std::fs::remove_dir_all(from)
                    .map_err(|e| SonicatError::External(format!("cannot remove '{}' after copy: {e}", from.display())))
            }
            Err(e) => Err(SonicatError::External(format!(
                "move '{}' -> '{}' failed: {e}",
                from.display(),
                to.display()
            ))),
        }
    }

    /// Recursively removes `path` — the single cleanup task the
    /// scheduler issues after an asset's per-file Tasks complete.
    pub fn remove(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        }
        .map_err(|e| SonicatError::External(format!("cannot remove '{}': {e}", path.display())))
    }

    /// Extracts `archive_path` (a `.rar`) into `dest_dir`, run from the
    /// archive's parent directory so `unrar` sees a relative filename.
    pub fn restore(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let parent = archive_path
            .parent()
            .ok_or_else(|| SonicatError::Validation(format!("'{}' has no parent directory", archive_path.display())))?;
        let filename = archive_path
            .file_name()
            .ok_or_else(|| SonicatError::Validation(format!("'{}' has no filename", archive_path.display())))?;
        std::fs::create_dir_all(dest_dir)
            .map_err(|e| SonicatError::External(format!("cannot create '{}': {e}", dest_dir.display())))?;
        run_subprocess(
            Command::new("unrar").arg("x").arg("-y").arg(filename).arg(dest_dir).current_dir(parent),
        )
    }

    /// Archives `source_dir` (named `<cname>`) into
    /// `<source_dir's parent>/<cname>.rar`, run from the parent directory
    /// so `rar` receives a relative directory name, per `spec.md` §6.
    /// Removes the now-redundant uncompressed `source_dir` once the
    /// `.rar` exists, matching
    /// `original_source/apps/sys/FileMover.py::FileMover.archive`'s
    /// `Archive.archive(...); self.remove(...)` sequence — otherwise
    /// every intake asset would leave a duplicate uncompressed copy
    /// sitting next to its archive forever.
    pub fn archive(&self, source_dir: &Path) -> Result<PathBuf> {
        let parent = source_dir
            .parent()
            .ok_or_else(|| SonicatError::Validation(format!("'{}' has no parent directory", source_dir.display())))?;
        let dirname = source_dir
            .file_name()
            .ok_or_else(|| SonicatError::Validation(format!("'{}' has no directory name", source_dir.display())))?;
        let archive_name = format!("{}.rar", dirname.to_string_lossy());
        run_subprocess(Command::new("rar").arg("a").arg(&archive_name).arg(dirname).current_dir(parent))?;
        let archive_path = parent.join(&archive_name);
        self.remove(source_dir)?;
        Ok(archive_path)
    }

    /// Restored-temp-directory orphans: directories under the temp root
    /// with no matching in-flight Task, reclaimed at scheduler startup
    /// per `spec.md` §4.1's restart semantics.
    pub fn list_temp_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.temp_root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.temp_root)
            .map_err(|e| SonicatError::External(format!("cannot list '{}': {e}", self.temp_root.display())))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SonicatError::External(format!("directory entry read failed: {e}")))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

fn libc_exdev() -> i32 {
    18 // EXDEV, stable across the Linux targets this crate ships on
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to).map_err(|e| SonicatError::External(format!("cannot create '{}': {e}", to.display())))?;
    for entry in std::fs::read_dir(from).map_err(|e| SonicatError::External(format!("cannot read '{}': {e}", from.display())))? {
        let entry = entry.map_err(|e| SonicatError::External(format!("directory entry read failed: {e}")))?;
        let dest = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)
                .map_err(|e| SonicatError::External(format!("cannot copy '{}': {e}", entry.path().display())))?;
        }
    }
    Ok(())
}

fn run_subprocess(cmd: &mut Command) -> Result<()> {
    let output = cmd.output().map_err(|e| SonicatError::External(format!("failed to spawn subprocess: {e}")))?;
    if !output.status.success() {
        return Err(SonicatError::External(format!(
            "subprocess exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn move_path_renames_within_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("source");
        std::fs::create_dir_all(&from).unwrap();
        std::fs::write(from.join("kick.wav"), b"data").unwrap();
        let to = dir.path().join("dest");

        let mover = FileMover::with_temp_root(dir.path().join("tmp"));
        mover.move_path(&from, &to).unwrap();

        assert!(!from.exists());
        assert!(to.join("kick.wav").exists());
    }

    #[test]
    fn remove_is_a_noop_on_missing_path() {
        let dir = TempDir::new().unwrap();
        let mover = FileMover::with_temp_root(dir.path());
        mover.remove(&dir.path().join("missing")).unwrap();
    }

    #[test]
    fn remove_deletes_directory_tree() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Acme Sounds - Pack Vol 1");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("kick.wav"), b"data").unwrap();

        let mover = FileMover::with_temp_root(dir.path());
        mover.remove(&target).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn list_temp_dirs_empty_when_root_absent() {
        let dir = TempDir::new().unwrap();
        let mover = FileMover::with_temp_root(dir.path().join("does-not-exist"));
        assert!(mover.list_temp_dirs().unwrap().is_empty());
    }

    #[test]
    fn list_temp_dirs_finds_orphaned_restores() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Acme Sounds - Pack Vol 1")).unwrap();
        let mover = FileMover::with_temp_root(dir.path());
        let dirs = mover.list_temp_dirs().unwrap();
        assert_eq!(dirs.len(), 1);
    }
}
