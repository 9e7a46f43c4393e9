//! Atomic write primitives
//!
//! Uses temp→fsync→rename so a crash leaves either the old file or the new
//! one, never a truncated mix

use crate::errors::{io_error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically replace `target_path` with `content`
///
/// The temp file lives next to the target (same filesystem) under a unique
/// name, so concurrent writers never share one.
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    let parent = match target_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| io_error("create_table_dir", e))?;

    let temp_path = temp_path_for(target_path);

    let written = write_synced(&temp_path, content)
        .and_then(|()| fs::rename(&temp_path, target_path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error("write_table", e));
    }

    sync_dir(&parent);
    Ok(())
}

fn temp_path_for(target_path: &Path) -> PathBuf {
    let file_name = target_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target_path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name,
        uuid::Uuid::new_v4().simple()
    ))
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

// Persist the rename itself; not every platform can open a directory
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
