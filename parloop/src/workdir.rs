//! Run-scoped filesystem layout: each run owns a working copy of the
//! project under `<temp_root>/<run_id>/` and writes results under
//! `<output_dir>/<run_id>/`. Copies preserve file modes and dereference
//! symlinks, so the working copy builds exactly like the original tree.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, Result};

/// Remove any stale copy at `path` and create it fresh.
pub fn clean_or_create(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    fs::create_dir_all(path).map_err(|e| Error::io(path, e))
}

/// Deep-copy `src` into `dst`. Symlinks are followed, modes preserved.
pub fn copy_project(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            match e.into_io_error() {
                Some(io) => Error::io(path, io),
                None => Error::Config("project copy hit a filesystem loop".to_owned()),
            }
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under src");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
            let meta = entry.metadata().map_err(|e| {
                Error::io(
                    entry.path(),
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("metadata unavailable")),
                )
            })?;
            fs::set_permissions(&target, meta.permissions())
                .map_err(|e| Error::io(&target, e))?;
        }
    }
    Ok(())
}

/// Write `bytes` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(&path, bytes).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

/// The working-copy directory for one run.
pub fn work_dir(temp_root: &Path, run_id: &str) -> PathBuf {
    temp_root.join(run_id)
}

/// The output directory for one run.
pub fn out_dir(output_root: &Path, run_id: &str) -> PathBuf {
    output_root.join(run_id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn copy_recreates_tree_and_contents() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("pkg")).unwrap();
        fs::write(src.path().join("go.mod"), "module demo\n").unwrap();
        fs::write(src.path().join("pkg/a.go"), "package pkg\n").unwrap();

        let target = dst.path().join("copy");
        copy_project(src.path(), &target).unwrap();
        assert_eq!(
            fs::read_to_string(target.join("go.mod")).unwrap(),
            "module demo\n"
        );
        assert_eq!(
            fs::read_to_string(target.join("pkg/a.go")).unwrap(),
            "package pkg\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_follows_symlinks_and_keeps_modes() {
        use std::os::unix::fs::symlink;
        use std::os::unix::fs::PermissionsExt;

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("real.sh"), "#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(src.path().join("real.sh")).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(src.path().join("real.sh"), perms).unwrap();
        symlink(src.path().join("real.sh"), src.path().join("link.sh")).unwrap();

        let target = dst.path().join("copy");
        copy_project(src.path(), &target).unwrap();
        // The link is materialized as a regular file with the same bytes.
        let meta = fs::symlink_metadata(target.join("link.sh")).unwrap();
        assert!(meta.file_type().is_file());
        let mode = fs::metadata(target.join("real.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn clean_or_create_resets_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run");
        fs::create_dir_all(path.join("stale")).unwrap();
        fs::write(path.join("stale/file"), "x").unwrap();
        clean_or_create(&path).unwrap();
        assert!(path.exists());
        assert!(!path.join("stale").exists());
    }
}
