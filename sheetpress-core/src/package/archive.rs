//! In-memory ZIP part store

use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Largest inflated size accepted for a single part
pub(crate) const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;
/// Largest inflated size accepted for the whole package
pub(crate) const MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;

/// Ordered mapping from part name to raw bytes
///
/// Entry order is the order of the source ZIP and is kept on write. The source file is
/// never touched after `open` returns.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    parts: Vec<(String, Vec<u8>)>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file entry of the ZIP at `path` into memory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(Error::corrupt(&path.display().to_string(), e)),
        };
        let mut zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| Error::corrupt(&path.display().to_string(), e))?;

        let mut parts = Vec::with_capacity(zip.len());
        let mut total = 0u64;
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| Error::corrupt(&path.display().to_string(), e))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if entry.size() > MAX_PART_BYTES {
                return Err(Error::corrupt(&name, "part exceeds size limit"));
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .take(MAX_PART_BYTES + 1)
                .read_to_end(&mut data)
                .map_err(|e| Error::corrupt(&name, e))?;
            if data.len() as u64 > MAX_PART_BYTES {
                return Err(Error::corrupt(&name, "part exceeds size limit"));
            }
            total += data.len() as u64;
            if total > MAX_TOTAL_BYTES {
                return Err(Error::corrupt(
                    &path.display().to_string(),
                    "package exceeds size limit",
                ));
            }
            parts.push((name, data));
        }

        debug!("loaded {} parts from {}", parts.len(), path.display());
        Ok(Self { parts })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Like [`Archive::part`] but a missing part is a corrupt package
    pub fn required_part(&self, name: &str) -> Result<&[u8]> {
        self.part(name)
            .ok_or_else(|| Error::corrupt(name, "required part is missing"))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|(n, _)| n == name)
    }

    /// Replace a part in place, or append it when new
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.parts.push((name.to_string(), data)),
        }
    }

    /// Remove a part; removing an absent part is a no-op
    pub fn delete_part(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|(n, _)| n != name);
        before != self.parts.len()
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Write the package to `path`, deflating every entry
    ///
    /// The ZIP is assembled in a temporary file next to `path` and renamed over it only
    /// once complete.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = temp_file_beside(path)?;

        let mut zip = ZipWriter::new(tmp);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| Error::write_failure(path, io::Error::other(e)))?;
            zip.write_all(data)
                .map_err(|e| Error::write_failure(path, e))?;
        }
        let tmp = zip
            .finish()
            .map_err(|e| Error::write_failure(path, io::Error::other(e)))?;

        tmp.persist(path)
            .map_err(|e| Error::write_failure(path, e.error))?;
        debug!("wrote {} parts to {}", self.parts.len(), path.display());
        Ok(())
    }
}

/// Copy `source` to `target` byte for byte, with the same atomicity as [`Archive::write`]
pub fn copy_verbatim(source: &Path, target: &Path) -> Result<()> {
    let mut input = match File::open(source) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound(source.to_path_buf()));
        }
        Err(e) => return Err(Error::corrupt(&source.display().to_string(), e)),
    };
    let mut tmp = temp_file_beside(target)?;
    io::copy(&mut input, &mut tmp).map_err(|e| Error::write_failure(target, e))?;
    tmp.persist(target)
        .map_err(|e| Error::write_failure(target, e.error))?;
    Ok(())
}

fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    NamedTempFile::new_in(&dir).map_err(|e| Error::write_failure(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Archive {
        let mut archive = Archive::new();
        archive.set_part("[Content_Types].xml", b"<Types/>".to_vec());
        archive.set_part("xl/workbook.xml", b"<workbook/>".to_vec());
        archive.set_part("xl/worksheets/sheet1.xml", b"<worksheet/>".to_vec());
        archive
    }

    #[test]
    fn test_set_part_keeps_order() {
        let mut archive = sample();
        archive.set_part("xl/workbook.xml", b"<workbook a=\"1\"/>".to_vec());
        let names: Vec<_> = archive.part_names().collect();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "xl/workbook.xml", "xl/worksheets/sheet1.xml"]
        );
        assert_eq!(archive.part("xl/workbook.xml"), Some(&b"<workbook a=\"1\"/>"[..]));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut archive = sample();
        assert!(archive.delete_part("xl/worksheets/sheet1.xml"));
        assert!(!archive.delete_part("xl/worksheets/sheet1.xml"));
        assert!(!archive.contains("xl/worksheets/sheet1.xml"));
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_write_and_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.xlsx");
        sample().write(&path)?;

        let reopened = Archive::open(&path)?;
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.part("xl/worksheets/sheet1.xml"), Some(&b"<worksheet/>"[..]));
        Ok(())
    }

    #[test]
    fn test_open_missing_file() {
        let err = Archive::open("/definitely/not/here.xlsx").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_open_garbage_is_corrupt() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("garbage.xlsx");
        std::fs::write(&path, b"this is not a zip file")?;
        let err = Archive::open(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let err = sample().write("/definitely/not/here/out.xlsx").unwrap_err();
        assert!(matches!(err, Error::WriteFailure { .. }));
        assert!(!Path::new("/definitely/not/here/out.xlsx").exists());
    }
}
