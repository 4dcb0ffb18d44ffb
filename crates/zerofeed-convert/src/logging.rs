//! Per-feed log files.
//!
//! Every package gets a `{canonical}.log` next to its feed, capturing the
//! conversion lifecycle at info level and every problem that led to a
//! blacklist entry. The handle is threaded explicitly through the worker
//! context; messages are mirrored onto `tracing` so the stderr/global sinks
//! see them too.
//!
//! Log files rotate once they grow past their budget; rotated files are
//! bzip2-compressed. The budget keeps a full run over the whole index within
//! a repository-sized output tree.

use bzip2::Compression;
use bzip2::write::BzEncoder;
use chrono::Local;
use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Byte budget per feed log, all generations combined.
const MAX_BYTES: u64 = (1 << 30) / 150_000;

/// Compressed generations to keep when rotating.
const BACKUP_COUNT: u32 = 3;

/// Handle for one package's log file.
#[derive(Clone)]
pub struct FeedLogger {
    name: String,
    writer: Rc<RefCell<RotatingWriter>>,
}

impl FeedLogger {
    /// Open (append to) the log file for the feed `name`.
    pub fn open(name: &str, path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            writer: Rc::new(RefCell::new(RotatingWriter::open(path)?)),
        })
    }

    /// Fine-grained progress; global sinks only, not the feed log file.
    pub fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!(feed = %self.name, "{}", message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!(feed = %self.name, "{}", message.as_ref());
        self.write('I', message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!(feed = %self.name, "{}", message.as_ref());
        self.write('W', message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!(feed = %self.name, "{}", message.as_ref());
        self.write('E', message.as_ref());
    }

    fn write(&self, level: char, message: &str) {
        let line = format!(
            "{level} {}: {message}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if let Err(error) = self.writer.borrow_mut().write_line(&line) {
            tracing::warn!(feed = %self.name, "could not write feed log: {error}");
        }
    }
}

/// Append-only writer that rotates into bzip2-compressed generations.
struct RotatingWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotatingWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
        })
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        // Rotating at half the budget leaves room for the compressed
        // generations; the observed compression rate is well above 2.
        if self.written + line.len() as u64 > MAX_BYTES / 2 {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.written += line.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;

        // Shift older generations up, dropping the oldest.
        let generation = |n: u32| {
            let mut name = self.path.as_os_str().to_owned();
            name.push(format!(".{n}.bz2"));
            PathBuf::from(name)
        };
        for n in (1..BACKUP_COUNT).rev() {
            let from = generation(n);
            if from.exists() {
                std::fs::rename(&from, generation(n + 1))?;
            }
        }

        // Compress the current file into generation 1 and start over.
        let mut encoder = BzEncoder::new(File::create(generation(1))?, Compression::default());
        let mut current = File::open(&self.path)?;
        std::io::copy(&mut current, &mut encoder)?;
        encoder.finish()?;

        self.file = File::create(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.log");
        let logger = FeedLogger::open("foo", &path).unwrap();
        logger.info("Updating (PyPI name: 'Foo')");
        logger.warn("something odd");
        logger.debug("not in the file");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('I'));
        assert!(lines[0].ends_with("Updating (PyPI name: 'Foo')"));
        assert!(lines[1].starts_with('W'));
    }

    #[test]
    fn appends_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.log");
        FeedLogger::open("foo", &path).unwrap().info("first");
        FeedLogger::open("foo", &path).unwrap().info("second");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn rotates_and_compresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.log");
        let logger = FeedLogger::open("foo", &path).unwrap();
        let long = "x".repeat(200);
        // Enough to blow through MAX_BYTES / 2 several times.
        for _ in 0..((MAX_BYTES / 200) * 2) {
            logger.info(&long);
        }
        assert!(dir.path().join("foo.log.1.bz2").exists());
        assert!(std::fs::metadata(&path).unwrap().len() <= MAX_BYTES / 2 + 256);
    }
}
