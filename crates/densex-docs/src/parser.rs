//! Text extraction by file type

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Supported document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `.txt`
    Text,
    /// `.md`
    Markdown,
    /// `.pdf`
    Pdf,
}

impl DocumentKind {
    /// Kind for `path`, by case-insensitive extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Extract the text of a `.txt`, `.md` or `.pdf` file
#[instrument]
pub async fn parse_document(path: &Path) -> Result<String> {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let kind = DocumentKind::from_path(path).ok_or_else(|| Error::Unsupported(path.to_path_buf()))?;

    let text = match kind {
        DocumentKind::Text | DocumentKind::Markdown => read_text(path).await?,
        DocumentKind::Pdf => read_pdf(path.to_path_buf()).await?,
    };

    debug!(?kind, chars = text.chars().count(), "document parsed");
    Ok(text)
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Parse(Box::new(e)))
}

async fn read_pdf(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
        .await
        .map_err(|e| Error::Parse(Box::new(e)))?
        .map_err(|e| Error::Parse(e.to_string().into()))
}
