use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::errors::CliError;

/// Display handle for a staged file. Dropping it releases the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRef {
    pub uri: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub preview: PreviewRef,
}

/// Holds at most one file waiting to be sent.
#[derive(Debug, Default)]
pub struct AttachmentStager {
    current: Option<PendingAttachment>,
    allowed_extensions: Vec<String>,
}

impl AttachmentStager {
    /// An empty extension list accepts any file.
    pub fn new(allowed_extensions: Vec<String>) -> Self {
        Self {
            current: None,
            allowed_extensions,
        }
    }

    /// Replaces the staged file. `None` is ignored; returns whether something was staged.
    pub fn stage(&mut self, path: Option<&Path>) -> Result<bool, CliError> {
        let Some(path) = path else {
            return Ok(false);
        };

        let metadata = fs::metadata(path).map_err(|e| {
            CliError::Attachment(format!("Cannot read {}: {e}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(CliError::Attachment(format!(
                "{} is not a file.",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CliError::Attachment("Attachment has no file name.".to_string()))?;
        self.check_extension(&name)?;

        let absolute = fs::canonicalize(path)?;
        let uri = Url::from_file_path(&absolute)
            .map(|u| u.to_string())
            .map_err(|_| {
                CliError::Attachment(format!("Cannot build a preview for {}", absolute.display()))
            })?;

        // Release the old preview before the new one exists.
        self.current = None;
        self.current = Some(PendingAttachment {
            path: absolute,
            name,
            size: metadata.len(),
            preview: PreviewRef {
                uri,
                label: format_file_size(metadata.len()),
            },
        });
        tracing::debug!(name = ?self.current.as_ref().map(|a| &a.name), "attachment staged");
        Ok(true)
    }

    pub fn clear(&mut self) {
        if self.current.take().is_some() {
            tracing::debug!("attachment cleared");
        }
    }

    pub fn current(&self) -> Option<&PendingAttachment> {
        self.current.as_ref()
    }

    /// Hands the staged file over and leaves the stager empty.
    pub fn take(&mut self) -> Option<PendingAttachment> {
        self.current.take()
    }

    fn check_extension(&self, name: &str) -> Result<(), CliError> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if self.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            return Ok(());
        }
        Err(CliError::Attachment(format!(
            "Unsupported file type. Allowed: {}.",
            self.allowed_extensions.join(", ")
        )))
    }
}

pub fn mime_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        return format!("{kb:.1} KB");
    }
    let mb = kb / 1024.0;
    if mb < 1024.0 {
        return format!("{mb:.1} MB");
    }
    let gb = mb / 1024.0;
    format!("{gb:.1} GB")
}
