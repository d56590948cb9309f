//! Entry reader - turns a path into a full `EntryCollection`

use super::classify::stat_nanos;
use crate::db::EntryCollection;
use std::fs::{File, Metadata};
use std::io::Read;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

/// Limits applied when extracting text content
#[derive(Debug, Clone, Copy)]
pub struct ContentLimits {
    pub snippet_chars: usize,
    pub max_content_bytes: u64,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            snippet_chars: 256,
            max_content_bytes: 10_000_000,
        }
    }
}

/// Reader errors
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot read {path}: {source}")]
    Content {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Type of entry, coarse enough for filtering search results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Directory,
    Symlink,
    Special,
    Source,
    Config,
    Documentation,
    Data,
    Binary,
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Special => "special",
            Self::Source => "source",
            Self::Config => "config",
            Self::Documentation => "documentation",
            Self::Data => "data",
            Self::Binary => "binary",
            Self::Other => "other",
        }
    }
}

/// Read metadata (and content, when eligible) for one path without following symlinks
pub fn read_entry(
    path: &Path,
    content_eligible: bool,
    limits: &ContentLimits,
) -> Result<EntryCollection, ReadError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|source| ReadError::Stat {
        path: path.to_path_buf(),
        source,
    })?;

    let mut entry = metadata_record(path, &metadata);

    let wants_content = content_eligible
        && metadata.file_type().is_file()
        && metadata.len() <= limits.max_content_bytes;
    if wants_content {
        let text = read_text(path).map_err(|source| ReadError::Content {
            path: path.to_path_buf(),
            source,
        })?;
        let (total, with_content) = count_lines(&text);
        entry.content_snippet = Some(snippet(&text, limits.snippet_chars));
        entry.line_count_total = Some(total as i64);
        entry.line_count_w_content = Some(with_content as i64);
        entry.full_text = Some(text);
    }

    Ok(entry)
}

fn metadata_record(path: &Path, metadata: &Metadata) -> EntryCollection {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let extension = if metadata.is_dir() {
        None
    } else {
        path.extension().map(|e| e.to_string_lossy().to_lowercase())
    };

    EntryCollection {
        inode: metadata.ino() as i64,
        path: path.to_string_lossy().to_string(),
        parent_directory: path.parent().map(|p| p.to_string_lossy().to_string()),
        name,
        is_dir: metadata.is_dir(),
        size: metadata.len() as i64,
        modification_time: stat_nanos(metadata.mtime(), metadata.mtime_nsec()),
        access_time: stat_nanos(metadata.atime(), metadata.atime_nsec()),
        metadata_change_time: stat_nanos(metadata.ctime(), metadata.ctime_nsec()),
        owner_id: metadata.uid() as i64,
        group_id: metadata.gid() as i64,
        extension,
        filetype: detect_file_type(path, metadata).as_str().to_string(),
        content_snippet: None,
        full_text: None,
        line_count_total: None,
        line_count_w_content: None,
    }
}

fn read_text(path: &Path) -> std::io::Result<String> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// First `max_chars` characters, cut on a char boundary
fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Total lines and lines holding something other than whitespace
fn count_lines(text: &str) -> (usize, usize) {
    text.lines().fold((0, 0), |(total, filled), line| {
        (total + 1, filled + usize::from(!line.trim().is_empty()))
    })
}

fn detect_file_type(path: &Path, metadata: &Metadata) -> FileType {
    let ft = metadata.file_type();
    if ft.is_dir() {
        return FileType::Directory;
    }
    if ft.is_symlink() {
        return FileType::Symlink;
    }
    if ft.is_fifo() || ft.is_socket() || ft.is_block_device() || ft.is_char_device() {
        return FileType::Special;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    // Config files
    if name.ends_with(".config")
        || name.ends_with(".conf")
        || ext == "toml"
        || ext == "yaml"
        || ext == "yml"
        || ext == "ini"
        || name == ".env"
        || name.starts_with(".env.")
        || name == "dockerfile"
        || name.contains("docker-compose")
    {
        return FileType::Config;
    }

    // Documentation
    if ext == "md"
        || ext == "txt"
        || ext == "rst"
        || ext == "adoc"
        || matches!(name.as_str(), "readme" | "changelog" | "license" | "authors")
    {
        return FileType::Documentation;
    }

    // Data files
    if matches!(ext.as_str(), "json" | "csv" | "xml" | "sql" | "db" | "sqlite") {
        return FileType::Data;
    }

    if matches!(
        ext.as_str(),
        "exe" | "dll" | "so" | "dylib" | "bin" | "o" | "a" | "lib" | "png" | "jpg" | "jpeg"
            | "gif" | "ico" | "woff" | "woff2" | "ttf" | "pdf" | "zip" | "tar" | "gz" | "rar"
            | "7z"
    ) {
        return FileType::Binary;
    }

    if matches!(
        ext.as_str(),
        "rs" | "py" | "go" | "js" | "mjs" | "ts" | "tsx" | "jsx" | "java" | "kt" | "c" | "h"
            | "cpp" | "cc" | "hpp" | "cs" | "rb" | "php" | "swift" | "lua" | "sh" | "bash"
            | "zsh" | "html" | "css" | "scss" | "zig" | "hs" | "ml" | "ex" | "exs"
    ) || matches!(name.as_str(), "makefile")
    {
        return FileType::Source;
    }

    FileType::Other
}
