use thiserror::Error;

/// Document formats accepted as a resume upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFormat {
    Pdf,
    Docx,
}

impl ResumeFormat {
    /// Classifies an uploaded filename by its extension, ignoring case.
    pub fn from_filename(filename: &str) -> Result<Self, UploadError> {
        let name = sanitize_filename(filename);
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .ok_or_else(|| UploadError::UnsupportedType(filename.to_string()))?;

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(UploadError::UnsupportedType(filename.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Returns the final path component of a client supplied filename.
pub fn sanitize_filename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("resume must be a PDF or DOCX file (got {0:?})")]
    UnsupportedType(String),
}
