//! Boundaries to the image-based collaborators: a page rasterizer and an OCR
//! engine. Neither is implemented here; callers plug their own in.

use std::fmt;

use crate::parser::interpret::ExtractOptions;
use crate::types::{Annotation, AnnotationKind, PositionedTextRun, OCR_FONT_SIZE};
use crate::PdfError;

/// Pages sampled when deciding whether a document has a text layer at all.
pub const DEFAULT_SAMPLE_LIMIT: usize = 3;

/// Recognises text on a rendered page.
///
/// Implementations are expected to be slow and I/O bound; callers should run
/// them off the hot path and never during a save.
pub trait OcrEngine {
    /// Recognise text on the 1-based `page_index` of `pdf`. Boxes are in
    /// viewer pixel space.
    fn recognize(&self, pdf: &[u8], page_index: u32) -> Result<Vec<PositionedTextRun>, PdfError>;
}

/// Renders a page to pixels, for display and as OCR input.
pub trait PageRasterizer {
    fn rasterize(&self, pdf: &[u8], page_index: u32, target_width: u32) -> Result<RasterImage, PdfError>;
}

/// A decoded RGBA8 image.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, PdfError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(PdfError::Ocr(format!(
                "raster of {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        Ok(Self { width, height, rgba })
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

/// Where the text of a page came from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextSource {
    ContentStream(Vec<PositionedTextRun>),
    Ocr(Vec<PositionedTextRun>),
}

impl TextSource {
    pub fn runs(&self) -> &[PositionedTextRun] {
        match self {
            TextSource::ContentStream(runs) | TextSource::Ocr(runs) => runs,
        }
    }

    pub fn into_runs(self) -> Vec<PositionedTextRun> {
        match self {
            TextSource::ContentStream(runs) | TextSource::Ocr(runs) => runs,
        }
    }

    pub fn is_ocr(&self) -> bool {
        matches!(self, TextSource::Ocr(_))
    }
}

/// Text of one page, from the content stream when it has a usable text
/// layer and from `engine` otherwise.
pub fn extract_text_or_ocr(
    pdf: &[u8],
    page_index: u32,
    engine: &dyn OcrEngine,
    options: &ExtractOptions,
) -> Result<TextSource, PdfError> {
    let count = crate::page_count(pdf)?;
    if page_index == 0 || page_index as usize > count {
        return Err(PdfError::PageOutOfRange { page: page_index, count });
    }

    if crate::is_searchable(pdf, DEFAULT_SAMPLE_LIMIT) {
        let runs = crate::extract_text_with(pdf, page_index, options);
        if runs.iter().any(PositionedTextRun::is_visible) {
            return Ok(TextSource::ContentStream(runs));
        }
        log::info!("page {} has no visible text runs, falling back to OCR", page_index);
    } else {
        log::info!("document has no text layer, running OCR on page {}", page_index);
    }

    engine.recognize(pdf, page_index).map(TextSource::Ocr)
}

/// Turn recognised runs into `OcrText` annotations so they can be saved as
/// an invisible text layer.
pub fn ocr_annotations(runs: &[PositionedTextRun], page: u32) -> Vec<Annotation> {
    runs.iter()
        .filter(|run| !run.text.trim().is_empty())
        .map(|run| {
            let mut annotation =
                Annotation::new(AnnotationKind::OcrText, page, run.rect()).with_content(run.text.clone());
            annotation.font_size = OCR_FONT_SIZE;
            annotation
        })
        .collect()
}
