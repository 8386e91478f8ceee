// source.rs - Selected input files and their metadata

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extensions offered by the file picker filter.
pub const PICKER_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "ico", "avif", "heic", "heif",
];

/// An input file as selected by the user. The bytes stay on disk until a
/// conversion task reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub modified_ms: u128,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis())
            .unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            size: metadata.len(),
            mime_type: mime_type_for(path).to_string(),
            modified_ms,
        })
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Stable key built from name and modification time. Adding the same
    /// file twice yields the same key.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.modified_ms)
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("ico") => "image/x-icon",
        Some("avif") => "image/avif",
        Some("heic") | Some("heif") => "image/heic",
        Some("svg") => "image/svg+xml",
        _ => OCTET_STREAM,
    }
}

/// Expands directories and reads metadata for every file. Type filtering is
/// left to the registry.
pub fn collect_sources(paths: &[PathBuf], recurse: bool) -> Vec<SourceFile> {
    let mut sources = Vec::new();

    for path in paths {
        if path.is_dir() {
            let walker = WalkDir::new(path).sort_by_file_name();
            let walker = if recurse { walker } else { walker.max_depth(1) };
            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    push_source(&mut sources, entry.path());
                }
            }
        } else {
            push_source(&mut sources, path);
        }
    }

    sources
}

fn push_source(sources: &mut Vec<SourceFile>, path: &Path) {
    match SourceFile::from_path(path) {
        Ok(source) => sources.push(source),
        Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
    }
}

pub async fn load_sources(paths: Vec<PathBuf>, recurse: bool) -> Vec<SourceFile> {
    tokio::task::spawn_blocking(move || collect_sources(&paths, recurse))
        .await
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_detection_ignores_case() {
        assert_eq!(mime_type_for(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("scan.TiFF")), "image/tiff");
        assert_eq!(mime_type_for(Path::new("notes.txt")), OCTET_STREAM);
        assert_eq!(mime_type_for(Path::new("no_extension")), OCTET_STREAM);
    }

    #[test]
    fn identity_combines_name_and_mtime() {
        let source = SourceFile {
            path: PathBuf::from("/tmp/a.png"),
            name: "a.png".to_string(),
            size: 10,
            mime_type: "image/png".to_string(),
            modified_ms: 1_700_000_000_123,
        };
        assert_eq!(source.identity(), "a.png-1700000000123");
        assert!(source.is_image());
    }

    #[test]
    fn collects_files_from_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.png"), b"png").expect("write");
        fs::write(dir.path().join("readme.md"), b"text").expect("write");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("mkdir");
        fs::write(nested.join("b.jpg"), b"jpg").expect("write");

        let all = collect_sources(&[dir.path().to_path_buf()], true);
        let mut names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a.png", "b.jpg", "readme.md"]);

        let shallow = collect_sources(&[dir.path().to_path_buf()], false);
        assert_eq!(shallow.len(), 2);
    }

    #[test]
    fn missing_paths_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("here.gif");
        fs::write(&present, b"gif").expect("write");

        let sources = collect_sources(&[dir.path().join("gone.png"), present], true);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].size, 3);
        assert_eq!(sources[0].mime_type, "image/gif");
    }
}
