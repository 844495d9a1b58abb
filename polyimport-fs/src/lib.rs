//! Capability-based file access for dataset inputs and database outputs.
//!
//! Every helper opens the directory holding the target with ambient
//! authority and then works on the bare file name, so callers pass plain
//! UTF-8 paths and never touch `std::fs` directly.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// Directory containing `path` together with the file name inside it.
fn locate(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("<{path}> does not name a file")))?;
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, name.to_owned()))
}

/// Read a whole UTF-8 text file, such as a JSON dataset.
pub fn read_text(path: &Utf8Path) -> io::Result<String> {
    let (dir, name) = locate(path)?;
    dir.read_to_string(name.as_str())
}

/// Whether the existing entry at `path` is a regular file.
///
/// A missing entry is reported as an [`io::ErrorKind::NotFound`] error so
/// callers can tell "absent" from "not a file".
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = locate(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Whether `path` names an existing regular file.
///
/// A missing parent directory counts as "no file" rather than an error.
pub fn is_regular_file(path: &Utf8Path) -> io::Result<bool> {
    match file_is_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        other => other,
    }
}

/// Delete the file at `path`; returns whether something was removed.
pub fn remove_file_if_present(path: &Utf8Path) -> io::Result<bool> {
    if !is_regular_file(path)? {
        return Ok(false);
    }
    let (dir, name) = locate(path)?;
    dir.remove_file(name.as_str())?;
    Ok(true)
}

/// Create every missing directory above `path`.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }
    let (anchor, relative) = split_anchor(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    anchor.create_dir_all(&relative)
}

/// Split `dir` into an ambient anchor directory and the path below it.
///
/// Absolute paths anchor at their root (or Windows prefix), relative paths at
/// the working directory.
fn split_anchor(dir: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_dir = dir.as_std_path();
    let root = match std_dir.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            Utf8PathBuf::from(prefix).join(std::path::MAIN_SEPARATOR.to_string())
        }
        Some(Component::RootDir) => Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string()),
        _ => Utf8PathBuf::from("."),
    };
    let relative = if root == Utf8Path::new(".") {
        dir.to_path_buf()
    } else {
        dir.strip_prefix(&root)
            .map_err(|_| io::Error::other(format!("cannot strip <{root}> from <{dir}>")))?
            .to_path_buf()
    };
    let anchor = fs_utf8::Dir::open_ambient_dir(&root, ambient_authority())?;
    Ok((anchor, relative))
}
