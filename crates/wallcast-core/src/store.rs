//! JSON state files: load-or-create and atomic replace.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{Error, Result};

/// Load `path` as JSON, creating it with `T::default()` when missing.
///
/// An empty (or whitespace-only) file counts as the default value. Anything else that
/// fails to parse is an error: state files are never silently discarded.
pub fn load_or_init<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    if !path.exists() {
        let value = T::default();
        write_atomic(path, &value)?;
        tracing::info!(path = %path.display(), "created state file");
        return Ok(value);
    }

    let txt = fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&txt).map_err(|e| Error::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Serialize `value` next to `path` and rename it over the target.
///
/// The temp file is flushed and synced before the rename, so readers see either
/// the old contents or the new ones.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let txt = serde_json::to_string_pretty(value)?;
    let tmp = temp_path(path);

    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(txt.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
