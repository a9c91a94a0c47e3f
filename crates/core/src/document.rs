use crate::ExamError;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Uploaded document parked on disk for the length of one request.
///
/// The file is removed when the guard is dropped, so every early return and
/// panic releases it. [`ScopedDocument::close`] does the same removal but
/// reports failures.
#[derive(Debug)]
pub struct ScopedDocument {
    file: NamedTempFile,
}

impl ScopedDocument {
    pub fn write(bytes: &[u8]) -> Result<Self, ExamError> {
        let mut file = tempfile::Builder::new()
            .prefix("exam-upload-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        debug!(path = %file.path().display(), bytes = bytes.len(), "stored uploaded document");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn close(self) -> Result<(), ExamError> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        debug!(path = %path.display(), "removed uploaded document");
        Ok(())
    }
}

pub fn document_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
