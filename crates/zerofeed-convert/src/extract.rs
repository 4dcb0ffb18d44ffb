//! Archive extraction for source distributions.
//!
//! PyPI sdists come as tarballs (gzip, bzip2, xz or plain) or zip files;
//! the format is dispatched on the file name, the way the index names its
//! artifacts. Everything here is blocking and runs on the worker-thread
//! pool.

use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file name does not look like any archive we can unpack.
    #[error("invalid archive or unknown archive format")]
    UnknownFormat,

    /// The archive failed to unpack; the caller decides whether the quota
    /// ran out or the archive is broken.
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for ExtractError {
    fn from(error: std::io::Error) -> Self {
        Self::Failed(error.to_string())
    }
}

/// Unpack `archive` (named `filename` upstream) into `destination`.
pub fn extract_archive(
    archive: &Path,
    filename: &str,
    destination: &Path,
) -> Result<(), ExtractError> {
    let lowered = filename.to_lowercase();
    if let Some(kind) = tar_compression(&lowered) {
        extract_tar(archive, kind, destination)
    } else if lowered.ends_with(".zip") {
        extract_zip(archive, destination)
    } else {
        Err(ExtractError::UnknownFormat)
    }
}

enum TarCompression {
    Gzip,
    Bzip2,
    Xz,
    None,
}

fn tar_compression(filename: &str) -> Option<TarCompression> {
    if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        Some(TarCompression::Gzip)
    } else if filename.ends_with(".tar.bz2") || filename.ends_with(".tbz2") {
        Some(TarCompression::Bzip2)
    } else if filename.ends_with(".tar.xz") || filename.ends_with(".txz") {
        Some(TarCompression::Xz)
    } else if filename.ends_with(".tar") {
        Some(TarCompression::None)
    } else {
        None
    }
}

fn extract_tar(
    archive: &Path,
    compression: TarCompression,
    destination: &Path,
) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let reader: Box<dyn std::io::Read> = match compression {
        TarCompression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        TarCompression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        TarCompression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        TarCompression::None => Box::new(file),
    };
    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.unpack(destination)?;
    Ok(())
}

fn extract_zip(archive: &Path, destination: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ExtractError::Failed(e.to_string()))?;
    zip.extract(destination)
        .map_err(|e| ExtractError::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn build_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn unpacks_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foo-1.tar.gz");
        build_tar_gz(
            &archive,
            &[("foo-1/setup.py", "from setuptools import setup\n")],
        );

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        extract_archive(&archive, "foo-1.tar.gz", &dest).unwrap();
        assert!(dest.join("foo-1/setup.py").exists());
    }

    #[test]
    fn unpacks_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foo-1.zip");
        let file = File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("foo-1/setup.py", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"from setuptools import setup\n").unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        extract_archive(&archive, "foo-1.zip", &dest).unwrap();
        assert!(dest.join("foo-1/setup.py").exists());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foo-1.rar");
        std::fs::write(&archive, "not an archive").unwrap();
        assert!(matches!(
            extract_archive(&archive, "foo-1.rar", dir.path()),
            Err(ExtractError::UnknownFormat)
        ));
    }

    #[test]
    fn corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foo-1.tar.gz");
        std::fs::write(&archive, "definitely not gzip").unwrap();
        assert!(matches!(
            extract_archive(&archive, "foo-1.tar.gz", dir.path()),
            Err(ExtractError::Failed(_))
        ));
    }
}
