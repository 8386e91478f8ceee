// export.rs - Saving converted files and bundling them into a zip archive

use crate::error::ArchiveError;
use crate::registry::ConvertedFile;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

impl From<&ConvertedFile> for ArchiveEntry {
    fn from(file: &ConvertedFile) -> Self {
        Self {
            name: file.name.clone(),
            data: Arc::clone(&file.data),
        }
    }
}

pub fn archive_file_name(now: DateTime<Utc>) -> String {
    format!("webp_converted_{}.zip", now.timestamp_millis())
}

/// Keeps every entry when names collide: `a.webp`, `a (2).webp`, ...
fn unique_entry_names(entries: &[ArchiveEntry]) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut names = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut candidate = entry.name.clone();
        let mut counter = 1;
        while !taken.insert(candidate.clone()) {
            counter += 1;
            candidate = match entry.name.rfind('.') {
                Some(dot) if dot > 0 => format!(
                    "{} ({}){}",
                    &entry.name[..dot],
                    counter,
                    &entry.name[dot..]
                ),
                _ => format!("{} ({})", entry.name, counter),
            };
        }
        names.push(candidate);
    }

    names
}

pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
    if entries.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (entry, name) in entries.iter().zip(unique_entry_names(entries)) {
        zip.start_file(name, options)?;
        zip.write_all(&entry.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Builds the archive in memory and only then writes it. A failed write
/// removes whatever reached the disk.
pub fn write_archive(entries: &[ArchiveEntry], dest: &Path) -> Result<u64, ArchiveError> {
    let bytes = build_archive(entries)?;
    if let Err(e) = fs::write(dest, &bytes) {
        let _ = fs::remove_file(dest);
        return Err(e.into());
    }
    Ok(bytes.len() as u64)
}

pub fn write_converted(file: &ConvertedFile, dest: &Path) -> io::Result<()> {
    fs::write(dest, file.data.as_slice())
}

pub async fn save_archive(entries: Vec<ArchiveEntry>, dest: PathBuf) -> Result<PathBuf, ArchiveError> {
    tokio::task::spawn_blocking(move || -> Result<PathBuf, ArchiveError> {
        let size = write_archive(&entries, &dest)?;
        log::info!(
            "Saved {} files ({} bytes) to {}",
            entries.len(),
            size,
            dest.display()
        );
        Ok(dest)
    })
    .await
    .map_err(|e| ArchiveError::Worker(e.to_string()))?
}

pub async fn save_converted(file: ConvertedFile, dest: PathBuf) -> io::Result<PathBuf> {
    tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
        write_converted(&file, &dest)?;
        log::info!("Saved {} to {}", file.name, dest.display());
        Ok(dest)
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn entry(name: &str, data: &[u8]) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            data: Arc::new(data.to_vec()),
        }
    }

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).expect("entry");
                let mut data = Vec::new();
                file.read_to_end(&mut data).expect("read entry");
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn archive_name_carries_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(archive_file_name(at), "webp_converted_1700000000123.zip");
    }

    #[test]
    fn archive_contains_every_entry() {
        let bytes =
            build_archive(&[entry("a.webp", b"first"), entry("b.webp", b"second")]).expect("zip");
        let entries = read_entries(bytes);
        assert_eq!(
            entries,
            vec![
                ("a.webp".to_string(), b"first".to_vec()),
                ("b.webp".to_string(), b"second".to_vec()),
            ]
        );
    }

    #[test]
    fn colliding_names_are_suffixed() {
        let bytes = build_archive(&[
            entry("a.webp", b"1"),
            entry("a.webp", b"2"),
            entry("a.webp", b"3"),
            entry("README", b"4"),
            entry("README", b"5"),
        ])
        .expect("zip");
        let names: Vec<_> = read_entries(bytes).into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["a.webp", "a (2).webp", "a (3).webp", "README", "README (2)"]
        );
    }

    #[test]
    fn empty_archive_is_refused() {
        assert!(matches!(build_archive(&[]), Err(ArchiveError::Empty)));
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("missing-dir").join("out.zip");
        let result = write_archive(&[entry("a.webp", b"1")], &dest);
        assert!(matches!(result, Err(ArchiveError::Io(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn saves_archive_and_single_files() {
        let dir = tempfile::tempdir().expect("tempdir");

        let zip_path = dir.path().join("bundle.zip");
        let saved = save_archive(vec![entry("a.webp", b"1")], zip_path.clone())
            .await
            .expect("saved");
        assert_eq!(saved, zip_path);
        assert_eq!(read_entries(fs::read(&zip_path).expect("read")).len(), 1);

        let file = ConvertedFile {
            name: "b.webp".to_string(),
            mime_type: "image/webp".to_string(),
            data: Arc::new(b"webp".to_vec()),
        };
        let single = dir.path().join("b.webp");
        save_converted(file, single.clone()).await.expect("saved");
        assert_eq!(fs::read(single).expect("read"), b"webp");
    }
}
