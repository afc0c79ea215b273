//! Unpacking of downloaded artifacts.
//!
//! The decoders are picked from the download file name: extensions are peeled off from
//! the end (`tkn.tar.gz` -> gzip, then tar) until one is not recognized. Archives are
//! unpacked next to the command; anything else is written to the command path.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use flate2::read::GzDecoder;
use tracing::{debug, trace};
use zip::ZipArchive;
use crate::error::{Error, Result};

/// One decoding step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// gzip decompression.
    Gzip,
    /// tar archive.
    Tar,
    /// zip archive.
    Zip,
}

impl Layer {
    fn from_extension(extension: &str) -> Option<&'static [Layer]> {
        match extension.to_ascii_lowercase().as_str() {
            "gz" => Some(&[Layer::Gzip]),
            "tgz" => Some(&[Layer::Gzip, Layer::Tar]),
            "tar" => Some(&[Layer::Tar]),
            "zip" => Some(&[Layer::Zip]),
            _ => None,
        }
    }

    fn is_archive(&self) -> bool {
        matches!(self, Layer::Tar | Layer::Zip)
    }
}

/// The decoders for `file_name`, outermost first.
///
/// Peeling stops at the first unknown extension or once an archive format is reached.
pub fn layers(file_name: &str) -> Vec<Layer> {
    let mut layers = Vec::new();
    let mut name = file_name;
    while let Some((stem, extension)) = name.rsplit_once('.') {
        let Some(found) = Layer::from_extension(extension) else {
            break;
        };
        layers.extend_from_slice(found);
        if found.iter().any(Layer::is_archive) {
            break;
        }
        name = stem;
    }
    layers
}

/// What decoding produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Files unpacked from an archive.
    Entries(Vec<PathBuf>),
    /// A single, possibly decompressed, file written to the command path.
    Plain(PathBuf),
}

/// Decodes `download` according to `file_name` and writes the result next to `command`.
///
/// Every written file is made executable.
///
/// # Errors
///
/// Returns [`Error::Archive`] if the download cannot be read or unpacked, or if an
/// archive entry would land outside the command's directory.
pub fn decode(download: &Path, file_name: &str, command: &Path) -> Result<Decoded> {
    let target_dir = command.parent().unwrap_or_else(|| Path::new("."));
    let layers = layers(file_name);
    debug!(download = %download.display(), ?layers, "Decoding download");

    if layers.is_empty() && download == command {
        set_executable(command).map_err(|e| Error::archive(download, e))?;
        return Ok(Decoded::Plain(command.to_path_buf()));
    }

    let file = File::open(download).map_err(|e| Error::archive(download, e))?;
    if layers.first() == Some(&Layer::Zip) {
        return unpack_zip_file(file, download, target_dir).map(Decoded::Entries);
    }

    let mut stream: Box<dyn Read> = Box::new(BufReader::new(file));
    for layer in layers {
        match layer {
            Layer::Gzip => stream = Box::new(GzDecoder::new(stream)),
            Layer::Tar => return unpack_tar(stream, download, target_dir).map(Decoded::Entries),
            Layer::Zip => {
                return unpack_zip_stream(stream, download, target_dir).map(Decoded::Entries);
            }
        }
    }
    write_file(&mut stream, command).map_err(|e| Error::archive(download, e))?;
    Ok(Decoded::Plain(command.to_path_buf()))
}

fn unpack_tar(stream: Box<dyn Read>, download: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |e: io::Error| Error::archive(download, e);
    let mut archive = tar::Archive::new(stream);
    let mut written = Vec::new();
    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let name = entry.path().map_err(archive_err)?.into_owned();
        let Some(dest) = contained_path(download, target_dir, &name)? else {
            continue;
        };
        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&dest).map_err(archive_err)?;
        } else if entry_type.is_file() {
            write_file(&mut entry, &dest).map_err(archive_err)?;
            written.push(dest);
        } else {
            trace!(entry = %name.display(), ?entry_type, "Skipping tar entry");
        }
    }
    Ok(written)
}

fn unpack_zip_file(file: File, download: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| Error::archive(download, e))?;
    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::archive(download, e))?;
        let name = PathBuf::from(entry.name());
        let Some(dest) = contained_path(download, target_dir, &name)? else {
            continue;
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::archive(download, e))?;
        } else {
            write_file(&mut entry, &dest).map_err(|e| Error::archive(download, e))?;
            written.push(dest);
        }
    }
    Ok(written)
}

/// Zip read front to back, for zips nested inside a compression layer.
fn unpack_zip_stream(mut stream: Box<dyn Read>, download: &Path, target_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    while let Some(mut entry) =
        zip::read::read_zipfile_from_stream(&mut stream).map_err(|e| Error::archive(download, e))?
    {
        let name = PathBuf::from(entry.name());
        let Some(dest) = contained_path(download, target_dir, &name)? else {
            continue;
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| Error::archive(download, e))?;
        } else {
            write_file(&mut entry, &dest).map_err(|e| Error::archive(download, e))?;
            written.push(dest);
        }
    }
    Ok(written)
}

/// Joins an entry name onto `target_dir`.
///
/// Returns `None` for names without a file component (`./`) and an error for names that
/// would escape `target_dir`.
fn contained_path(download: &Path, target_dir: &Path, name: &Path) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::archive(
                    download,
                    format!("entry '{}' escapes the target directory", name.display()),
                ));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(target_dir.join(relative)))
}

fn write_file<R: Read + ?Sized>(source: &mut R, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut output = File::create(dest)?;
    io::copy(source, &mut output)?;
    drop(output);
    set_executable(dest)?;
    trace!(path = %dest.display(), "Wrote file");
    Ok(())
}

/// Adds the executable bits to `path`.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

/// Windows has no executable bit; the extension decides.
#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};
    use zip::write::SimpleFileOptions;

    const TKN: &[u8] = b"#!/bin/sh\necho 'Client version: 0.5.0 (linux)'\n";

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        for (path, content) in files {
            writer.start_file(*path, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn setup(file_name: &str, bytes: &[u8]) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let version_dir = dir.path().join("cache").join("0.5.0");
        std::fs::create_dir_all(&version_dir).unwrap();
        let download = version_dir.join(file_name);
        std::fs::write(&download, bytes).unwrap();
        let command = version_dir.join("tkn");
        (dir, download, command)
    }

    #[cfg(unix)]
    fn is_executable(path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).unwrap().permissions().mode() & 0o111 != 0
    }

    #[test]
    fn test_layers() {
        assert_eq!(layers("tkn_0.5.0_Linux_x86_64.tar.gz"), vec![Layer::Gzip, Layer::Tar]);
        assert_eq!(layers("kubectl.zip"), vec![Layer::Zip]);
        assert_eq!(layers("tkn-linux-amd64.gz"), vec![Layer::Gzip]);
        assert_eq!(layers("odo.tgz"), vec![Layer::Gzip, Layer::Tar]);
        assert_eq!(layers("tool.zip.gz"), vec![Layer::Gzip, Layer::Zip]);
        assert_eq!(layers("TOOL.TAR.GZ"), vec![Layer::Gzip, Layer::Tar]);
        assert!(layers("kn").is_empty());
        assert!(layers("kn-0.9.0").is_empty());
        assert!(layers("tkn.exe").is_empty());
    }

    #[test]
    fn test_peeling_stops_at_archive() {
        assert_eq!(layers("weird.gz.tar"), vec![Layer::Tar]);
    }

    #[test]
    fn test_tar_gz_round_trip() {
        let archive = gzip(&tar_bytes(&[("tkn", TKN), ("LICENSE", b"Apache-2.0")]));
        let (_dir, download, command) = setup("tkn.tar.gz", &archive);

        let decoded = decode(&download, "tkn.tar.gz", &command).unwrap();
        match decoded {
            Decoded::Entries(entries) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
        #[cfg(unix)]
        assert!(is_executable(&command));
    }

    #[test]
    fn test_tar_directories_are_created() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("docs/").unwrap();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, io::empty()).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_path("docs/README").unwrap();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"hello"[..]).unwrap();
        let (_dir, download, command) = setup("odo.tar", &builder.into_inner().unwrap());

        decode(&download, "odo.tar", &command).unwrap();
        let readme = command.parent().unwrap().join("docs").join("README");
        assert_eq!(std::fs::read(readme).unwrap(), b"hello");
    }

    #[test]
    fn test_zip_archive() {
        let (_dir, download, command) = setup("tkn.zip", &zip_bytes(&[("tkn", TKN)]));

        let decoded = decode(&download, "tkn.zip", &command).unwrap();
        assert_eq!(decoded, Decoded::Entries(vec![command.clone()]));
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
    }

    #[test]
    fn test_gzipped_zip_archive() {
        let (_dir, download, command) = setup("tkn.zip.gz", &gzip(&zip_bytes(&[("tkn", TKN)])));

        decode(&download, "tkn.zip.gz", &command).unwrap();
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
    }

    #[test]
    fn test_plain_gzip_is_written_to_command() {
        let (_dir, download, command) = setup("tkn-linux-amd64.gz", &gzip(TKN));

        let decoded = decode(&download, "tkn-linux-amd64.gz", &command).unwrap();
        assert_eq!(decoded, Decoded::Plain(command.clone()));
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
        #[cfg(unix)]
        assert!(is_executable(&command));
    }

    #[test]
    fn test_plain_file_with_other_name_is_copied() {
        let (_dir, download, command) = setup("tkn-linux-amd64", TKN);

        decode(&download, "tkn-linux-amd64", &command).unwrap();
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
        assert!(download.exists());
    }

    #[test]
    fn test_plain_file_already_at_command_path() {
        let (_dir, download, command) = setup("tkn", TKN);
        assert_eq!(download, command);

        let decoded = decode(&download, "tkn", &command).unwrap();
        assert_eq!(decoded, Decoded::Plain(command.clone()));
        assert_eq!(std::fs::read(&command).unwrap(), TKN);
        #[cfg(unix)]
        assert!(is_executable(&command));
    }

    #[test]
    fn test_corrupt_gzip_is_archive_error() {
        let (_dir, download, command) = setup("tkn.tar.gz", b"definitely not gzip");
        let err = decode(&download, "tkn.tar.gz", &command).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }

    #[test]
    fn test_corrupt_zip_is_archive_error() {
        let (_dir, download, command) = setup("tkn.zip", b"PK but not really");
        let err = decode(&download, "tkn.zip", &command).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }

    #[test]
    fn test_entry_escaping_target_is_rejected() {
        let mut header = tar::Header::new_gnu();
        let name = b"../evil";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let (dir, download, command) = setup("tkn.tar", &builder.into_inner().unwrap());

        let err = decode(&download, "tkn.tar", &command).unwrap_err();
        assert!(err.to_string().contains("escapes the target directory"));
        assert!(!dir.path().join("cache").join("evil").exists());
    }
}
