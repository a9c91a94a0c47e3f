use crate::error::IngestError;
use crate::models::PageText;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Reads page text straight out of the PDF content streams.
///
/// A document that loads but carries no text (scanned pages, empty pages)
/// yields an empty list rather than an error; downstream stages degrade to
/// an empty context.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, %error, "skipping page without extractable text");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            warn!(path = %path.display(), "pdf had no readable page text");
        } else {
            debug!(path = %path.display(), pages = pages.len(), "extracted page text");
        }

        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::{LopdfExtractor, PdfExtractor};
    use crate::error::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = LopdfExtractor.extract_pages(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() {
        let result = LopdfExtractor.extract_pages(std::path::Path::new("/nonexistent/doc.pdf"));
        assert!(result.is_err());
    }
}
