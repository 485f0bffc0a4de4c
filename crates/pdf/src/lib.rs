use thiserror::Error;

use parser::backend::{LopdfBackend, PdfBackend};

pub mod annotations;
pub mod coords;
pub mod fonts;
pub mod ocr;
pub mod parser;
pub mod selection;
pub mod types;

pub use annotations::{AnnotationWriter, SaveOptions};
pub use fonts::{FontChain, FontSource};
pub use parser::interpret::ExtractOptions;
pub use types::*;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: usize },
    #[error("No usable font for {0}")]
    FontUnavailable(String),
    #[error("Failed to save document: {0}")]
    Save(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A parsed PDF document.
///
/// Constructed via [`PdfDocument::from_bytes`]. Lets callers run several
/// queries against one document without re-parsing it.
pub struct PdfDocument {
    backend: LopdfBackend,
}

impl PdfDocument {
    /// Parse PDF bytes. Encrypted documents are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        Ok(Self {
            backend: LopdfBackend::load_bytes(bytes)?,
        })
    }

    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }

    /// Positioned text runs of the 1-based `page_index`, in draw order.
    pub fn text_runs(&self, page_index: u32, options: &ExtractOptions) -> Result<Vec<PositionedTextRun>, PdfError> {
        let page_id = self.backend.page_id(page_index)?;
        parser::interpret::extract_page_runs(&self.backend, page_id, options)
    }

    /// [`text_runs`](Self::text_runs) that never fails: a missing or
    /// unreadable page yields no runs.
    pub fn page_text(&self, page_index: u32, options: &ExtractOptions) -> Vec<PositionedTextRun> {
        self.text_runs(page_index, options).unwrap_or_else(|e| {
            log::warn!("text extraction of page {} failed: {}", page_index, e);
            Vec::new()
        })
    }

    /// Whether any of the first `sample_limit` pages draws text directly in
    /// its content stream.
    pub fn has_text_layer(&self, sample_limit: usize) -> bool {
        self.backend
            .pages()
            .into_iter()
            .take(sample_limit.max(1))
            .any(|(number, id)| match self.backend.page_content(id) {
                Ok(content) => {
                    parser::interpret::count_text_operators(&self.backend.decode_content(&content)) > 0
                }
                Err(e) => {
                    log::debug!("page {} content unreadable: {}", number, e);
                    false
                }
            })
    }

    /// Every modelled annotation in the document, page by page.
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut out = Vec::new();
        for (number, id) in self.backend.pages() {
            match self.backend.page_frame(id) {
                Ok(frame) => out.extend(annotations::read_page_annotations(&self.backend, &frame, number)),
                Err(e) => log::warn!("skipping annotations of page {}: {}", number, e),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Convenience free functions (stateless, re-parse each call)
// ---------------------------------------------------------------------------

/// Positioned text runs of one page with default options.
///
/// Never fails: an unreadable document or page yields no runs, which callers
/// treat as the signal to fall back to OCR.
pub fn extract_text(bytes: &[u8], page_index: u32) -> Vec<PositionedTextRun> {
    extract_text_with(bytes, page_index, &ExtractOptions::default())
}

/// [`extract_text`] with explicit options.
pub fn extract_text_with(bytes: &[u8], page_index: u32, options: &ExtractOptions) -> Vec<PositionedTextRun> {
    match PdfDocument::from_bytes(bytes) {
        Ok(doc) => doc.page_text(page_index, options),
        Err(e) => {
            log::warn!("text extraction of page {} failed: {}", page_index, e);
            Vec::new()
        }
    }
}

/// Whether the document has a text layer. Unreadable documents are not
/// searchable.
pub fn is_searchable(bytes: &[u8], sample_limit: usize) -> bool {
    match PdfDocument::from_bytes(bytes) {
        Ok(doc) => doc.has_text_layer(sample_limit),
        Err(e) => {
            log::debug!("searchability check failed: {}", e);
            false
        }
    }
}

/// Read every annotation (and OCR text layer) in the document.
pub fn extract_annotations(bytes: &[u8]) -> Result<Vec<Annotation>, PdfError> {
    Ok(PdfDocument::from_bytes(bytes)?.annotations())
}

/// Replace the document's annotations with `annotations`, captured at the
/// viewer zoom `scale`.
pub fn save_with_annotations(bytes: &[u8], annotations: &[Annotation], scale: f64) -> Result<Vec<u8>, PdfError> {
    save_with_options(
        bytes,
        annotations,
        SaveOptions {
            scale,
            ..SaveOptions::default()
        },
    )
}

/// [`save_with_annotations`] with a custom font chain.
pub fn save_with_options(bytes: &[u8], annotations: &[Annotation], options: SaveOptions) -> Result<Vec<u8>, PdfError> {
    AnnotationWriter::new(options).write(bytes, annotations)
}

/// A copy of the document without annotations or OCR layers, for
/// rendering. Returns the input unchanged if it cannot be rewritten.
pub fn strip_annotations(bytes: &[u8]) -> Vec<u8> {
    AnnotationWriter::new(SaveOptions::default())
        .write(bytes, &[])
        .unwrap_or_else(|e| {
            log::warn!("cannot strip annotations, keeping the original: {}", e);
            bytes.to_vec()
        })
}

/// Remove the 1-based `page_index`. The last remaining page cannot be
/// removed.
pub fn delete_page(bytes: &[u8], page_index: u32) -> Result<Vec<u8>, PdfError> {
    let backend = LopdfBackend::load_bytes(bytes)?;
    backend.page_id(page_index)?;
    if backend.page_count() <= 1 {
        return Err(PdfError::Save("cannot delete the only page".into()));
    }

    let mut doc = backend.into_document();
    doc.delete_pages(&[page_index]);
    doc.prune_objects();
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| PdfError::Save(e.to_string()))?;
    Ok(out)
}

/// Keep annotations consistent with [`delete_page`]: those on the removed
/// page are dropped and later pages move up by one.
pub fn renumber_after_page_delete(annotations: &mut Vec<Annotation>, page_index: u32) {
    annotations.retain(|a| a.page != page_index);
    for annotation in annotations.iter_mut().filter(|a| a.page > page_index) {
        annotation.page -= 1;
    }
}

pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    Ok(PdfDocument::from_bytes(bytes)?.page_count())
}

/// In-memory documents for tests.
#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::{dictionary, Document, Object, Stream};

    /// One US-letter page per entry of `contents`, sharing a Helvetica
    /// resource named `F1`.
    pub fn build_document(contents: &[&str]) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let kids: Vec<Object> = contents
            .iter()
            .map(|content| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                });
                Object::Reference(page_id)
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn document_bytes(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }
}
