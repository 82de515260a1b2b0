//! Reading and writing the whole-document form of a store.

use std::{
    fs::File,
    io::{ErrorKind, Read as _, Write as _},
    path::{Path, PathBuf},
};

use serde::Serialize as _;
use serde_json::Value;
use tally_core::{Failure, Outcome};

const INDENT: &[u8] = b"    ";

/// Read and parse the document at `location`.
///
/// A shared lock is held on the file while it is read, so a writer in another
/// process is never observed halfway.
///
/// The result is only known to be JSON; checking it against a schema is up to
/// the store that consumes it.
pub async fn read_document(location: &Path) -> Outcome<Value> {
    let path: PathBuf = location.to_owned();
    let text = tokio::task::spawn_blocking(move || read_locked(&path))
        .await
        .map_err(|e| Failure::io(location, e))??;
    let document = serde_json::from_str(&text).map_err(|e| Failure::parse(location, e))?;
    tracing::debug!(location = %location.display(), "read document");
    Ok(document)
}

/// Overwrite the document at `location`.
///
/// The new content is written and synced to a temporary file next to
/// `location`, which then replaces it. Readers see either the old or the new
/// document, and a crash part way leaves the old one in place.
pub async fn write_document(location: &Path, document: &Value) -> Outcome<()> {
    let bytes = to_pretty_bytes(document).map_err(|e| Failure::io(location, e))?;
    let path: PathBuf = location.to_owned();
    tokio::task::spawn_blocking(move || write_locked(&path, &bytes))
        .await
        .map_err(|e| Failure::io(location, e))??;
    tracing::debug!(location = %location.display(), "wrote document");
    Ok(())
}

/// Render a document the way it is persisted: four-space indentation and a
/// trailing newline.
///
/// We prettify so that the files stay readable and diff well when they are
/// edited by hand or kept under version control.
pub fn to_pretty_bytes(document: &Value) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

fn read_locked(location: &Path) -> Outcome<String> {
    let io = |e: std::io::Error| Failure::io(location, e);
    let file = File::open(location).map_err(io)?;
    let locking = fd_lock::RwLock::new(file);
    let guard = locking.read().map_err(io)?;
    let mut text = String::new();
    let mut file: &File = &guard;
    file.read_to_string(&mut text).map_err(io)?;
    Ok(text)
}

fn write_locked(location: &Path, bytes: &[u8]) -> Outcome<()> {
    let io = |e: std::io::Error| Failure::io(location, e);
    let dir = match location.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io)?;
    staged.write_all(bytes).map_err(io)?;
    staged.as_file().sync_all().map_err(io)?;

    // Readers of the current file wait until it has been replaced
    let current = match File::open(location) {
        Ok(file) => Some(file),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(io(e)),
    };
    let mut locking = current.map(fd_lock::RwLock::new);
    let _guard = match locking.as_mut() {
        Some(locking) => Some(locking.write().map_err(io)?),
        None => None,
    };
    staged.persist(location).map_err(|e| io(e.error))?;
    Ok(())
}
