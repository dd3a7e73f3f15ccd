//! Archive expansion capability.
//!
//! The walker asks an [`ArchiveExpander`] whether a file is an archive and,
//! if so, which members it contains. Each member becomes a virtual
//! [`FileEntry`](super::FileEntry) so duplicates hiding inside archives are
//! found alongside regular files.
//!
//! [`StandardArchiveExpander`] recognises archives by extension and supports:
//!
//! | Kind      | Extensions              | Codec          |
//! |-----------|-------------------------|----------------|
//! | Zip       | `.zip`                  | `zip`          |
//! | Tar       | `.tar`                  | `tar`          |
//! | TarGz     | `.tar.gz`, `.tgz`       | `tar`+`flate2` |
//! | TarBz2    | `.tar.bz2`, `.tbz2`     | `tar`+`bzip2`  |
//! | TarXz     | `.tar.xz`, `.txz`       | `tar`+`xz2`    |
//! | Gzip      | `.gz` (single stream)   | `flate2`       |
//! | Xz        | `.xz` (single stream)   | `xz2`          |
//!
//! Members are never buffered whole: [`ArchiveExpander::read_member`] hands
//! the decompressing reader to a callback while the archive is still open.
//!
//! Archives nested inside archives are reported as ordinary members (so two
//! identical inner archives are still found as duplicates) and are not
//! expanded further. Archives found anywhere in the scanned directory tree
//! are expanded.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use thiserror::Error;
use xz2::read::XzDecoder;

use crate::fs_util::unix_seconds;

/// Errors raised while reading an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The file is not a supported archive.
    #[error("not a supported archive: {0}")]
    Unsupported(PathBuf),

    /// The requested member does not exist in the archive.
    #[error("member {member} not found in {archive}")]
    MemberNotFound { archive: PathBuf, member: PathBuf },

    /// The zip container is malformed.
    #[error("invalid zip archive {path}: {message}")]
    Zip { path: PathBuf, message: String },

    /// I/O or decompression failure.
    #[error("I/O error reading archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(path: &Path, error: &zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

/// One regular file stored inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Path of the member inside the archive
    pub relative_path: PathBuf,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Modification time in Unix seconds
    pub modified: i64,
    /// Creation time in Unix seconds (modification time when the format has none)
    pub created: i64,
}

/// Receives the reader of one archive member.
pub type MemberVisitor<'a> = &'a mut dyn FnMut(&mut dyn Read) -> io::Result<()>;

/// Capability: detect archives, enumerate their members and stream them.
pub trait ArchiveExpander: Send + Sync {
    /// Whether `path` looks like a supported archive.
    fn is_archive(&self, path: &Path) -> bool;

    /// List the regular-file members of the archive at `path`.
    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveMember>, ArchiveError>;

    /// Stream one member through `visit`.
    ///
    /// An I/O error returned by `visit` is reported as [`ArchiveError::Io`]
    /// against the archive.
    fn read_member(
        &self,
        archive: &Path,
        member: &Path,
        visit: MemberVisitor<'_>,
    ) -> Result<(), ArchiveError>;
}

/// Archive formats understood by [`StandardArchiveExpander`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Gzip,
    Xz,
}

impl ArchiveKind {
    /// Detect the archive kind from the file name.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".gz") {
            Some(Self::Gzip)
        } else if name.ends_with(".xz") {
            Some(Self::Xz)
        } else {
            None
        }
    }
}

/// Default expander backed by the `zip`, `tar`, `flate2`, `bzip2` and `xz2` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardArchiveExpander;

impl StandardArchiveExpander {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<BufReader<File>, ArchiveError> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| ArchiveError::io(path, e))
    }

    fn tar_reader(path: &Path, kind: ArchiveKind) -> Result<Box<dyn Read>, ArchiveError> {
        let file = Self::open(path)?;
        Ok(match kind {
            ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveKind::TarBz2 => Box::new(BzDecoder::new(file)),
            ArchiveKind::TarXz => Box::new(XzDecoder::new(file)),
            _ => Box::new(file),
        })
    }

    /// Decoder for a compressed file holding a single stream.
    fn stream_reader(path: &Path, kind: ArchiveKind) -> Result<Box<dyn Read>, ArchiveError> {
        let file = Self::open(path)?;
        Ok(match kind {
            ArchiveKind::Xz => Box::new(XzDecoder::new(file)),
            _ => Box::new(GzDecoder::new(file)),
        })
    }

    fn list_zip(path: &Path) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let mut archive =
            zip::ZipArchive::new(Self::open(path)?).map_err(|e| ArchiveError::zip(path, &e))?;
        let mut members = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let file = archive
                .by_index(index)
                .map_err(|e| ArchiveError::zip(path, &e))?;
            if file.is_dir() {
                continue;
            }
            let Some(relative_path) = file.enclosed_name() else {
                log::warn!(
                    "Skipping unsafe member name '{}' in {}",
                    file.name(),
                    path.display()
                );
                continue;
            };
            let modified = file.last_modified().map_or(0, zip_time_to_unix);
            members.push(ArchiveMember {
                relative_path,
                size: file.size(),
                modified,
                created: modified,
            });
        }
        Ok(members)
    }

    fn list_tar(path: &Path, kind: ArchiveKind) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let mut archive = tar::Archive::new(Self::tar_reader(path, kind)?);
        let mut members = Vec::new();
        let entries = archive.entries().map_err(|e| ArchiveError::io(path, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(path, e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let raw = entry.path().map_err(|e| ArchiveError::io(path, e))?;
            let Some(relative_path) = sanitize_member_path(&raw) else {
                log::warn!("Skipping unsafe member name '{}' in {}", raw.display(), path.display());
                continue;
            };
            let modified = entry
                .header()
                .mtime()
                .ok()
                .and_then(|t| i64::try_from(t).ok())
                .unwrap_or(0);
            members.push(ArchiveMember {
                relative_path,
                size: entry.size(),
                modified,
                created: modified,
            });
        }
        Ok(members)
    }

    fn list_stream(path: &Path, kind: ArchiveKind) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let mut decoder = Self::stream_reader(path, kind)?;
        let size = io::copy(&mut decoder, &mut io::sink()).map_err(|e| ArchiveError::io(path, e))?;
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(unix_seconds)
            .unwrap_or(0);
        Ok(vec![ArchiveMember {
            relative_path: stream_member_name(path),
            size,
            modified,
            created: modified,
        }])
    }

    fn read_zip_member(
        archive: &Path,
        member: &Path,
        visit: MemberVisitor<'_>,
    ) -> Result<(), ArchiveError> {
        let mut zip =
            zip::ZipArchive::new(Self::open(archive)?).map_err(|e| ArchiveError::zip(archive, &e))?;
        for index in 0..zip.len() {
            let mut file = zip
                .by_index(index)
                .map_err(|e| ArchiveError::zip(archive, &e))?;
            if file.is_dir() || file.enclosed_name().as_deref() != Some(member) {
                continue;
            }
            return visit(&mut file).map_err(|e| ArchiveError::io(archive, e));
        }
        Err(ArchiveError::MemberNotFound {
            archive: archive.to_path_buf(),
            member: member.to_path_buf(),
        })
    }

    fn read_tar_member(
        archive: &Path,
        kind: ArchiveKind,
        member: &Path,
        visit: MemberVisitor<'_>,
    ) -> Result<(), ArchiveError> {
        let mut tar = tar::Archive::new(Self::tar_reader(archive, kind)?);
        let entries = tar.entries().map_err(|e| ArchiveError::io(archive, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveError::io(archive, e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let raw = entry.path().map_err(|e| ArchiveError::io(archive, e))?;
            if sanitize_member_path(&raw).as_deref() != Some(member) {
                continue;
            }
            return visit(&mut entry).map_err(|e| ArchiveError::io(archive, e));
        }
        Err(ArchiveError::MemberNotFound {
            archive: archive.to_path_buf(),
            member: member.to_path_buf(),
        })
    }
}

impl ArchiveExpander for StandardArchiveExpander {
    fn is_archive(&self, path: &Path) -> bool {
        ArchiveKind::detect(path).is_some()
    }

    fn list_contents(&self, path: &Path) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let kind = ArchiveKind::detect(path).ok_or_else(|| ArchiveError::Unsupported(path.to_path_buf()))?;
        log::trace!("Listing {:?} archive {}", kind, path.display());
        match kind {
            ArchiveKind::Zip => Self::list_zip(path),
            ArchiveKind::Gzip | ArchiveKind::Xz => Self::list_stream(path, kind),
            ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::TarBz2 | ArchiveKind::TarXz => {
                Self::list_tar(path, kind)
            }
        }
    }

    fn read_member(
        &self,
        archive: &Path,
        member: &Path,
        visit: MemberVisitor<'_>,
    ) -> Result<(), ArchiveError> {
        let kind =
            ArchiveKind::detect(archive).ok_or_else(|| ArchiveError::Unsupported(archive.to_path_buf()))?;
        match kind {
            ArchiveKind::Zip => Self::read_zip_member(archive, member, visit),
            ArchiveKind::Gzip | ArchiveKind::Xz => {
                if member != stream_member_name(archive) {
                    return Err(ArchiveError::MemberNotFound {
                        archive: archive.to_path_buf(),
                        member: member.to_path_buf(),
                    });
                }
                let mut decoder = Self::stream_reader(archive, kind)?;
                visit(decoder.as_mut()).map_err(|e| ArchiveError::io(archive, e))
            }
            ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::TarBz2 | ArchiveKind::TarXz => {
                Self::read_tar_member(archive, kind, member, visit)
            }
        }
    }
}

/// Name of the single member of a `.gz` or `.xz` file (`notes.txt.gz` -> `notes.txt`).
fn stream_member_name(path: &Path) -> PathBuf {
    path.file_stem()
        .map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Keep only normal components so a member can never escape its archive path.
fn sanitize_member_path(raw: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Zip timestamps are MS-DOS local times without a zone; they are read as UTC.
fn zip_time_to_unix(time: zip::DateTime) -> i64 {
    chrono::NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )
    .and_then(|d| {
        d.and_hms_opt(
            u32::from(time.hour()),
            u32::from(time.minute()),
            u32::from(time.second()),
        )
    })
    .map_or(0, |dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.add_directory("nested/", options).unwrap();
        for (name, data) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_all(expander: &dyn ArchiveExpander, archive: &Path, member: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut content = Vec::new();
        expander.read_member(archive, Path::new(member), &mut |reader| {
            reader.read_to_end(&mut content).map(|_| ())
        })?;
        Ok(content)
    }

    fn append_members<W: Write>(builder: &mut tar::Builder<W>, members: &[(&str, &[u8])]) {
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_600_000_000);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
    }

    fn write_tar_gz(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        append_members(&mut builder, members);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_tar_xz(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(xz2::write::XzEncoder::new(file, 6));
        append_members(&mut builder, members);
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_kinds() {
        assert_eq!(ArchiveKind::detect(Path::new("a.ZIP")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a.tgz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.bz2")), Some(ArchiveKind::TarBz2));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.xz")), Some(ArchiveKind::TarXz));
        assert_eq!(ArchiveKind::detect(Path::new("a.txz")), Some(ArchiveKind::TarXz));
        assert_eq!(ArchiveKind::detect(Path::new("a.txt.gz")), Some(ArchiveKind::Gzip));
        assert_eq!(ArchiveKind::detect(Path::new("a.txt.xz")), Some(ArchiveKind::Xz));
        assert_eq!(ArchiveKind::detect(Path::new("a.txt")), None);
    }

    #[test]
    fn test_zip_list_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.zip");
        write_zip(
            &path,
            &[("a.txt", b"alpha".as_slice()), ("nested/b.txt", b"bravo!".as_slice())],
        );

        let expander = StandardArchiveExpander::new();
        assert!(expander.is_archive(&path));

        let members = expander.list_contents(&path).unwrap();
        let names: Vec<_> = members.iter().map(|m| m.relative_path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("a.txt"), PathBuf::from("nested/b.txt")]);
        assert_eq!(members[1].size, 6);

        assert_eq!(read_all(&expander, &path, "nested/b.txt").unwrap(), b"bravo!");

        let missing = read_all(&expander, &path, "nope.txt");
        assert!(matches!(missing, Err(ArchiveError::MemberNotFound { .. })));
    }

    #[test]
    fn test_tar_gz_list_and_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.tar.gz");
        write_tar_gz(&path, &[("x/one.txt", b"1".as_slice()), ("two.txt", b"22".as_slice())]);

        let expander = StandardArchiveExpander::new();
        let members = expander.list_contents(&path).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].relative_path, PathBuf::from("x/one.txt"));
        assert_eq!(members[0].modified, 1_600_000_000);
        assert_eq!(members[1].size, 2);

        assert_eq!(read_all(&expander, &path, "two.txt").unwrap(), b"22");
    }

    #[test]
    fn test_tar_xz_list_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.tar.xz");
        write_tar_xz(&path, &[("docs/readme.md", b"# hi".as_slice()), ("b.bin", b"xyz".as_slice())]);

        let expander = StandardArchiveExpander::new();
        assert!(expander.is_archive(&path));
        let members = expander.list_contents(&path).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].relative_path, PathBuf::from("docs/readme.md"));
        assert_eq!(members[0].size, 4);

        assert_eq!(read_all(&expander, &path, "b.bin").unwrap(), b"xyz");
    }

    #[test]
    fn test_plain_xz_single_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dump.sql.xz");
        let mut encoder = xz2::write::XzEncoder::new(File::create(&path).unwrap(), 6);
        encoder.write_all(b"select 1;").unwrap();
        encoder.finish().unwrap();

        let expander = StandardArchiveExpander::new();
        let members = expander.list_contents(&path).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].relative_path, PathBuf::from("dump.sql"));
        assert_eq!(members[0].size, 9);
        assert_eq!(read_all(&expander, &path, "dump.sql").unwrap(), b"select 1;");
    }

    #[test]
    fn test_member_is_streamed_in_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.zip");
        let payload = vec![7u8; 256 * 1024];
        write_zip(&path, &[("big.bin", payload.as_slice())]);

        let mut reads = 0;
        let mut total = 0;
        let mut buffer = [0u8; 4096];
        StandardArchiveExpander::new()
            .read_member(&path, Path::new("big.bin"), &mut |reader| {
                loop {
                    let n = reader.read(&mut buffer)?;
                    if n == 0 {
                        return Ok(());
                    }
                    reads += 1;
                    total += n;
                }
            })
            .unwrap();
        assert_eq!(total, payload.len());
        assert!(reads > 1);
    }

    #[test]
    fn test_visitor_error_is_reported_against_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.tar.gz");
        write_tar_gz(&path, &[("one.txt", b"1".as_slice())]);

        let result = StandardArchiveExpander::new().read_member(&path, Path::new("one.txt"), &mut |_| {
            Err(io::Error::new(io::ErrorKind::Other, "sink closed"))
        });
        assert!(matches!(result, Err(ArchiveError::Io { path: p, .. }) if p == path));
    }

    #[test]
    fn test_plain_gzip_single_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"hello gzip").unwrap();
        encoder.finish().unwrap();

        let expander = StandardArchiveExpander::new();
        let members = expander.list_contents(&path).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].relative_path, PathBuf::from("notes.txt"));
        assert_eq!(members[0].size, 10);
        assert_eq!(read_all(&expander, &path, "notes.txt").unwrap(), b"hello gzip");
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let result = StandardArchiveExpander::new().list_contents(&path);
        assert!(matches!(result, Err(ArchiveError::Zip { .. })));
    }

    #[test]
    fn test_sanitize_member_path() {
        assert_eq!(sanitize_member_path(Path::new("./a/b")), Some(PathBuf::from("a/b")));
        assert_eq!(sanitize_member_path(Path::new("../evil")), None);
        assert_eq!(sanitize_member_path(Path::new("/abs")), None);
    }
}
