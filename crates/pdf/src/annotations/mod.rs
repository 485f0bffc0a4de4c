//! Annotation round trip between the viewer model and PDF annotation
//! objects.
//!
//! Reading turns `/Annots` entries (and OCR text layers written by
//! [`AnnotationWriter`]) into [`Annotation`](crate::Annotation)s; writing
//! replaces every page's annotations with freshly generated objects and
//! appearance streams.

mod read;
mod write;

pub use read::{parse_default_appearance, parse_default_style, read_page_annotations, DefaultAppearance, DefaultStyle};
pub use write::{AnnotationWriter, SaveOptions};

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use regex::Regex;

/// Stream dictionary key marking content streams this crate appended to a
/// page.
pub(crate) const LAYER_KEY: &[u8] = b"PagemarkLayer";

/// `LAYER_KEY` value of the invisible OCR text stream.
pub(crate) const OCR_LAYER: &[u8] = b"Ocr";

/// `LAYER_KEY` value of the one-byte `q` stream placed before the original
/// page content so the OCR layer starts from a clean graphics state.
pub(crate) const OCR_GUARD_LAYER: &[u8] = b"OcrGuard";

/// Content streams of a page in drawing order. `/Contents` may be a stream,
/// an array, or a reference to an array.
pub(crate) fn content_stream_ids(doc: &Document, page: &Dictionary) -> Vec<ObjectId> {
    fn refs(items: &[Object]) -> Vec<ObjectId> {
        items.iter().filter_map(|o| o.as_reference().ok()).collect()
    }
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => refs(items),
            _ => vec![*id],
        },
        Ok(Object::Array(items)) => refs(items),
        _ => Vec::new(),
    }
}

/// The `LAYER_KEY` tag of a content stream, if it has one.
pub(crate) fn layer_tag(doc: &Document, id: ObjectId) -> Option<&[u8]> {
    doc.get_object(id)
        .and_then(Object::as_stream)
        .and_then(|s| s.dict.get(LAYER_KEY))
        .and_then(Object::as_name)
        .ok()
}

/// Encode a PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub(crate) fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Format a number the way it is written into `/DA` strings: at most three
/// decimals, no trailing zeros.
pub(crate) fn format_number(value: f64) -> String {
    let s = format!("{:.3}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// The first match of `pattern` in `haystack`, with every capture group
/// parsed as a number.
pub(crate) fn capture_numbers(pattern: &str, haystack: &str) -> Option<Vec<f64>> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(haystack)?;
    caps.iter()
        .skip(1)
        .map(|m| m.and_then(|m| m.as_str().parse().ok()))
        .collect()
}
