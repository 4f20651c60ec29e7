//! Filesystem helpers shared by reader, snapshot and archive stages.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Clears the read-only state of one path.
///
/// Members extracted from device archives carry mode 0, so on Unix the
/// owner read/write (and search, for directories) bits are restored too.
pub fn make_path_writable(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = metadata.permissions();
        let owner_bits = if metadata.is_dir() { 0o700 } else { 0o600 };
        permissions.set_mode(permissions.mode() | owner_bits);
        fs::set_permissions(path, permissions)
    }

    #[cfg(not(unix))]
    {
        let mut permissions = metadata.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)
    }
}

/// Recursively clears read-only state under `root`, `root` included.
///
/// Directories are fixed before they are listed.
pub fn make_tree_writable(root: &Path) -> io::Result<()> {
    make_path_writable(root)?;
    if !fs::symlink_metadata(root)?.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(root)? {
        make_tree_writable(&entry?.path())?;
    }
    Ok(())
}

/// Collects regular files under `root` accepted by `keep`, sorted by path.
pub fn collect_files(root: &Path, keep: &dyn Fn(&Path) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    collect_into(root, keep, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_into(dir: &Path, keep: &dyn Fn(&Path) -> bool, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_into(&path, keep, found)?;
        } else if file_type.is_file() && keep(&path) {
            found.push(path);
        }
    }
    Ok(())
}
