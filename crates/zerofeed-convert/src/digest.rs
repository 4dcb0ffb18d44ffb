//! The target ecosystem's canonical manifest digest.
//!
//! A directory tree is rendered as a line-oriented manifest in the "new"
//! format:
//!
//! ```text
//! F <sha256 hex> <mtime> <size> <name>     regular file
//! X <sha256 hex> <mtime> <size> <name>     executable file
//! S <sha256 hex> <size> <name>             symlink (hash of its target)
//! D /<path>                                subdirectory
//! ```
//!
//! Within one directory, entries are visited in byte order; file lines come
//! first, then each subdirectory introduced by its `D` line. The digest is
//! the sha256 over all lines (each newline-terminated), rendered as
//! unpadded base32, which is the `sha256new_...` store id with the
//! algorithm prefix stripped.

use data_encoding::BASE32_NOPAD;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    /// The tree cannot be represented in a manifest (non-UTF-8 name,
    /// newline in a name, odd file type). The distribution is unsupported.
    #[error("cannot digest distribution: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compute the manifest digest of a directory tree.
pub fn digest_of(root: &Path) -> Result<String, DigestError> {
    let mut hasher = Sha256::new();
    walk(root, "", &mut |line| {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    })?;
    Ok(BASE32_NOPAD.encode(&hasher.finalize()))
}

/// Render the manifest lines of a tree, for tests and debugging.
pub fn manifest_lines(root: &Path) -> Result<Vec<String>, DigestError> {
    let mut lines = Vec::new();
    walk(root, "", &mut |line| lines.push(line.to_owned()))?;
    Ok(lines)
}

fn walk(
    directory: &Path,
    sub: &str,
    emit: &mut impl FnMut(&str),
) -> Result<(), DigestError> {
    if !sub.is_empty() {
        emit(&format!("D {sub}"));
    }

    let mut entries: Vec<(String, std::fs::DirEntry)> = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| DigestError::Unsupported(format!("non-UTF-8 name {name:?}")))?;
        if name.contains('\n') {
            // A newline would let the entry smuggle extra manifest lines.
            return Err(DigestError::Unsupported(format!(
                "newline in name {name:?}"
            )));
        }
        entries.push((name, entry));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut directories = Vec::new();
    for (name, entry) in entries {
        let path = entry.path();
        let metadata = std::fs::symlink_metadata(&path)?;
        let file_type = metadata.file_type();
        if file_type.is_dir() {
            directories.push((name, path));
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&path)?;
            let target = target.to_str().ok_or_else(|| {
                DigestError::Unsupported(format!("non-UTF-8 symlink target in {name:?}"))
            })?;
            let mut hasher = Sha256::new();
            hasher.update(target.as_bytes());
            emit(&format!(
                "S {} {} {name}",
                hex::encode(hasher.finalize()),
                target.len(),
            ));
        } else if file_type.is_file() {
            let flag = if is_executable(&metadata) { 'X' } else { 'F' };
            emit(&format!(
                "{flag} {} {} {} {name}",
                hash_file(&path)?,
                mtime(&metadata),
                metadata.len(),
            ));
        } else {
            return Err(DigestError::Unsupported(format!(
                "{name:?} is neither file, directory nor symlink"
            )));
        }
    }

    for (name, path) in directories {
        walk(&path, &format!("{sub}/{name}"), emit)?;
    }
    Ok(())
}

fn hash_file(path: &Path) -> Result<String, DigestError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn mtime(metadata: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.mtime()
}

fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.mode() & 0o111 != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn manifest_orders_files_before_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        write(&dir.path().join("a/inner.txt"), "inner");
        write(&dir.path().join("z.txt"), "outer");
        std::os::unix::fs::symlink("z.txt", dir.path().join("link")).unwrap();

        let lines = manifest_lines(dir.path()).unwrap();
        let shapes: Vec<String> = lines
            .iter()
            .map(|line| {
                let mut parts = line.split(' ');
                let flag = parts.next().unwrap().to_owned();
                let name = parts.next_back().unwrap();
                format!("{flag} {name}")
            })
            .collect();
        assert_eq!(shapes, vec!["S link", "F z.txt", "D /a", "F inner.txt"]);
    }

    #[test]
    fn executable_files_are_marked() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("setup.py");
        write(&script, "#!/usr/bin/env python\n");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let lines = manifest_lines(dir.path()).unwrap();
        assert!(lines[0].starts_with("X "));
        assert!(lines[0].ends_with(" setup.py"));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("file"), "content");
        let first = digest_of(dir.path()).unwrap();
        let again = digest_of(dir.path()).unwrap();
        assert_eq!(first, again);
        // Base32 without padding, upper-case: the store id form.
        assert!(first.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        write(&dir.path().join("file"), "changed");
        assert_ne!(digest_of(dir.path()).unwrap(), first);
    }

    #[test]
    fn newline_in_name_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("bad\nname"), "x");
        assert!(matches!(
            digest_of(dir.path()),
            Err(DigestError::Unsupported(_))
        ));
    }

    #[test]
    fn file_line_shape() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("f"), "hello");
        let lines = manifest_lines(dir.path()).unwrap();
        let parts: Vec<&str> = lines[0].split(' ').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "F");
        assert_eq!(parts[1].len(), 64); // sha256 hex
        assert_eq!(parts[3], "5"); // size
        assert_eq!(parts[4], "f");
    }
}
