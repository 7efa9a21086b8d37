// Gemstream Engine — Attachment Encoding
//
// Turns a user-selected file into a base64 payload plus media type.
// Image files keep their declared type (falling back to JPEG); documents
// are always sent as PDF.

use crate::atoms::constants::{DEFAULT_IMAGE_MEDIA_TYPE, DOCUMENT_MEDIA_TYPE};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Attachment, FormKind};
use base64::Engine as _;
use log::debug;
use std::path::{Path, PathBuf};

/// Where a selected file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file on disk (CLI).
    Path(PathBuf),
    /// Bytes already received from the page, with the browser's declared type.
    Loaded { name: String, declared_type: Option<String>, bytes: Vec<u8> },
    /// The page could not read the file; `reason` is its error text.
    Failed { name: String, reason: String },
}

/// How the outgoing media type is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentPolicy {
    Declared { fallback: &'static str },
    Fixed(&'static str),
}

impl AttachmentPolicy {
    /// `None` for forms that never carry a file.
    pub fn for_form(form: FormKind) -> Option<Self> {
        match form {
            FormKind::Image => {
                Some(AttachmentPolicy::Declared { fallback: DEFAULT_IMAGE_MEDIA_TYPE })
            }
            FormKind::Document => Some(AttachmentPolicy::Fixed(DOCUMENT_MEDIA_TYPE)),
            FormKind::Text => None,
        }
    }

    fn resolve(&self, declared: Option<&str>) -> String {
        match self {
            AttachmentPolicy::Fixed(media_type) => media_type.to_string(),
            AttachmentPolicy::Declared { fallback } => declared
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(*fallback)
                .to_string(),
        }
    }
}

/// Media type a browser file picker would declare for this extension.
/// Unknown extensions declare nothing.
pub fn declared_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(media_type)
}

struct LoadedFile {
    name: String,
    declared_type: Option<String>,
    bytes: Vec<u8>,
}

impl FileSource {
    pub fn name(&self) -> String {
        match self {
            FileSource::Path(p) => p.display().to_string(),
            FileSource::Loaded { name, .. } | FileSource::Failed { name, .. } => name.clone(),
        }
    }

    async fn read(self) -> EngineResult<LoadedFile> {
        match self {
            FileSource::Path(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| EngineError::file_read(path.display().to_string(), e))?;
                Ok(LoadedFile {
                    name: path.display().to_string(),
                    declared_type: declared_type_for(&path).map(String::from),
                    bytes,
                })
            }
            FileSource::Loaded { name, declared_type, bytes } => {
                Ok(LoadedFile { name, declared_type, bytes })
            }
            FileSource::Failed { name, reason } => Err(EngineError::file_read(name, reason)),
        }
    }
}

/// Read the whole file and encode it for an inline-data part.
pub async fn encode_file(source: FileSource, policy: AttachmentPolicy) -> EngineResult<Attachment> {
    let file = source.read().await?;
    let media_type = policy.resolve(file.declared_type.as_deref());
    debug!("[encoding] {} ({} bytes) as {}", file.name, file.bytes.len(), media_type);
    Ok(Attachment {
        media_type,
        data: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
    })
}
