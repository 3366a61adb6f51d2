use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

pub trait AttachmentStore {
    fn store(&self, bytes: &[u8], mime_type: &str, filename: &str)
        -> Result<String, AttachmentError>;
}

/// Writes attachments under one directory and hands back `file://` URLs.
#[derive(Debug, Clone)]
pub struct DirAttachmentStore {
    root: PathBuf,
}

impl DirAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AttachmentStore for DirAttachmentStore {
    fn store(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<String, AttachmentError> {
        if bytes.is_empty() {
            return Err(AttachmentError::Empty);
        }
        fs::create_dir_all(&self.root)?;
        let name = format!("{}-{}", Uuid::now_v7(), sanitize_filename(filename));
        let path = self.root.join(name);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), mime_type, "stored attachment");
        Ok(file_url(&path))
    }
}

fn sanitize_filename(raw: &str) -> String {
    let base = Path::new(raw.trim())
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

/// MIME type inferred from the file extension; unknown types are opaque bytes.
pub fn guess_mime_type(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        Some("txt" | "log") => "text/plain",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}

fn file_url(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

#[derive(Debug)]
pub enum AttachmentError {
    Io(std::io::Error),
    Empty,
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Io(err) => write!(f, "attachment I/O error: {}", err),
            AttachmentError::Empty => write!(f, "attachment is empty"),
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AttachmentError::Io(err) => Some(err),
            AttachmentError::Empty => None,
        }
    }
}

impl From<std::io::Error> for AttachmentError {
    fn from(value: std::io::Error) -> Self {
        AttachmentError::Io(value)
    }
}
