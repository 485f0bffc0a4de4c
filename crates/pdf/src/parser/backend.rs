use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Object};

use super::lexer::decode_operations;
use super::state::Matrix;
use crate::fonts::decode_win_ansi;
use crate::types::PageFrame;
use crate::PdfError;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// A page identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

/// Any indirect object identifier.
pub type ObjectId = lopdf::ObjectId;

/// Maximum number of `/Parent` hops followed when looking up an inheritable
/// page attribute.
const MAX_PARENT_HOPS: usize = 64;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Where names used by `Tf` and `Do` are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    /// The (possibly inherited) `/Resources` of a page.
    Page(PageId),
    /// The `/Resources` of a form XObject.
    Form(ObjectId),
    /// Nothing resolves.
    Empty,
}

/// A form XObject ready to be interpreted.
#[derive(Debug, Clone)]
pub struct SubProgram {
    pub id: ObjectId,
    /// Decompressed content-stream bytes.
    pub content: Vec<u8>,
    /// The form's `/Matrix`, if it declares one.
    pub matrix: Option<Matrix>,
    /// The form's own resources, or the caller's when it declares none.
    pub scope: ResourceScope,
}

/// A simplified, lopdf-independent representation of a PDF value.
///
/// This enum decouples higher-level logic from the concrete `lopdf::Object`
/// type so that the functional core can work with pure data.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Reference(ObjectId),
}

/// A single content-stream operation (operator + operands).
#[derive(Debug, Clone, PartialEq)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Extract an `f64` from a [`PdfValue`], accepting both `Integer` and `Real`.
pub fn get_number_from_value(val: &PdfValue) -> Option<f64> {
    match val {
        PdfValue::Integer(i) => Some(*i as f64),
        PdfValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Convert a `lopdf::Object` into a [`PdfValue`].
///
/// References are preserved as `PdfValue::Reference`.  Stream dictionaries
/// are converted but the raw stream bytes are discarded (they must be
/// obtained through [`PdfBackend::page_content`]).
pub fn convert_object(obj: &Object) -> PdfValue {
    match obj {
        Object::Null => PdfValue::Null,
        Object::Boolean(b) => PdfValue::Bool(*b),
        Object::Integer(i) => PdfValue::Integer(*i),
        Object::Real(f) => PdfValue::Real(f64::from(*f)),
        Object::Name(n) => PdfValue::Name(n.clone()),
        Object::String(s, _) => PdfValue::Str(s.clone()),
        Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        Object::Dictionary(dict) => {
            let entries = dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect();
            PdfValue::Dict(entries)
        }
        Object::Stream(stream) => {
            let entries = stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect();
            PdfValue::Dict(entries)
        }
        Object::Reference(id) => PdfValue::Reference(*id),
    }
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix) -- strips BOM and decodes.
/// 2. Valid UTF-8 -- returned as-is.
/// 3. Fallback to Latin-1 (ISO 8859-1) -- each byte mapped to its Unicode
///    code point.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        return decode_utf16_be(&bytes[2..]);
    }

    // Try UTF-8
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Fallback: Latin-1 (PDFDocEncoding for the printable range).
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode big-endian UTF-16 code units; a trailing odd byte is dropped.
fn decode_utf16_be(bytes: &[u8]) -> String {
    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&code_units)
}

/// Read a number from a lopdf object.
pub(crate) fn object_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// This trait exists so that the interpreter can be tested against mock
/// implementations without building real PDF files.
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Resolve the visible geometry and resource scope of a page.
    fn page_frame(&self, page: PageId) -> Result<PageFrame, PdfError>;

    /// Return the decompressed content stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError>;

    /// Decode content-stream bytes into [`ContentOp`]s. Corruption truncates
    /// the result instead of failing.
    ///
    /// `lopdf` decodes first; streams it rejects outright (inline images)
    /// go through the recovering lexer, which skips `BI … EI`.
    fn decode_content(&self, data: &[u8]) -> Vec<ContentOp> {
        match Content::decode(data) {
            Ok(content) => content
                .operations
                .into_iter()
                .map(|op| ContentOp {
                    operator: op.operator,
                    operands: op.operands.iter().map(convert_object).collect(),
                })
                .collect(),
            Err(e) => {
                log::debug!("content stream rejected by lopdf ({}), using the recovering lexer", e);
                let decoded = decode_operations(data);
                if let Some(err) = decoded.error {
                    log::warn!(
                        "content stream corrupt ({}), keeping {} operations decoded before it",
                        err,
                        decoded.ops.len()
                    );
                }
                decoded.ops
            }
        }
    }

    /// Look up `name` in the `/XObject` resources of `scope`. Returns `None`
    /// for anything that is not a form XObject.
    fn resolve_sub_program(&self, scope: ResourceScope, name: &[u8]) -> Option<SubProgram>;

    /// Decode raw string bytes found in a text-showing operator, using any
    /// font-specific encoding information the backend can find for the
    /// given scope and font resource key.
    fn decode_text(&self, scope: ResourceScope, font_key: &[u8], bytes: &[u8]) -> String;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Wrap an already parsed document.
    pub fn from_document(doc: lopdf::Document) -> Result<Self, PdfError> {
        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }
        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &lopdf::Document {
        &self.doc
    }

    pub fn into_document(self) -> lopdf::Document {
        self.doc
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Look up a 1-based page number.
    pub fn page_id(&self, page_number: u32) -> Result<PageId, PdfError> {
        let pages = self.doc.get_pages();
        pages
            .get(&page_number)
            .copied()
            .ok_or(PdfError::PageOutOfRange {
                page: page_number,
                count: pages.len(),
            })
    }

    // -- private helpers ----------------------------------------------------

    /// Follow a single level of indirection.
    pub(crate) fn deref<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    fn page_dict(&self, page: PageId) -> Result<&Dictionary, PdfError> {
        self.doc
            .get_object(page)
            .and_then(Object::as_dict)
            .map_err(|e| PdfError::Parse(format!("cannot get page object: {}", e)))
    }

    /// Walk up the page tree to find an inheritable attribute.
    fn inherited<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = dict;
        for _ in 0..MAX_PARENT_HOPS {
            if let Ok(obj) = current.get(key) {
                return Some(self.deref(obj));
            }
            let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
            current = self.doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
        }
        None
    }

    fn rect_attribute(&self, dict: &Dictionary, key: &[u8]) -> Option<[f64; 4]> {
        let arr = self.inherited(dict, key)?.as_array().ok()?;
        if arr.len() < 4 {
            return None;
        }
        let mut out = [0.0; 4];
        for (slot, obj) in out.iter_mut().zip(arr) {
            *slot = object_to_f64(self.deref(obj))?;
        }
        Some(out)
    }

    /// The `/Resources` dictionary governing `scope`.
    fn resources(&self, scope: ResourceScope) -> Option<&Dictionary> {
        match scope {
            ResourceScope::Page(page) => {
                let dict = self.page_dict(page).ok()?;
                self.inherited(dict, b"Resources")?.as_dict().ok()
            }
            ResourceScope::Form(id) => {
                let stream = self.doc.get_object(id).and_then(Object::as_stream).ok()?;
                let res = stream.dict.get(b"Resources").ok()?;
                self.deref(res).as_dict().ok()
            }
            ResourceScope::Empty => None,
        }
    }

    /// Look up `/<category>/<name>` in the resources of `scope`.
    fn resource_entry(&self, scope: ResourceScope, category: &[u8], name: &[u8]) -> Option<&Object> {
        let resources = self.resources(scope)?;
        let category = self.deref(resources.get(category).ok()?).as_dict().ok()?;
        category.get(name).ok()
    }

    /// A copy of the resources a page draws with, after inheritance.
    pub(crate) fn page_resources(&self, page: PageId) -> Dictionary {
        self.resources(ResourceScope::Page(page))
            .cloned()
            .unwrap_or_else(Dictionary::new)
    }

    fn font_dict(&self, scope: ResourceScope, font_key: &[u8]) -> Option<&Dictionary> {
        let entry = self.resource_entry(scope, b"Font", font_key)?;
        self.deref(entry).as_dict().ok()
    }
}

/// Decompress a stream if it declares a filter.
pub(crate) fn stream_bytes(stream: &lopdf::Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream
            .decompressed_content()
            .map_err(|e| log::debug!("stream decompression failed: {}", e))
            .ok()
    } else {
        Some(stream.content.clone())
    }
}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_frame(&self, page: PageId) -> Result<PageFrame, PdfError> {
        let dict = self.page_dict(page)?;
        let [x1, y1, x2, y2] = self
            .rect_attribute(dict, b"CropBox")
            .or_else(|| self.rect_attribute(dict, b"MediaBox"))
            .ok_or_else(|| PdfError::Parse("MediaBox not found for page".into()))?;

        Ok(PageFrame {
            page,
            crop_offset_x: x1.min(x2),
            crop_offset_y: y1.min(y2),
            crop_height: (y2 - y1).abs(),
            scope: ResourceScope::Page(page),
        })
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
    }

    fn resolve_sub_program(&self, scope: ResourceScope, name: &[u8]) -> Option<SubProgram> {
        let id = self
            .resource_entry(scope, b"XObject", name)?
            .as_reference()
            .ok()?;
        let stream = self.doc.get_object(id).and_then(Object::as_stream).ok()?;

        let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok();
        if subtype != Some(b"Form".as_slice()) {
            return None;
        }

        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| self.deref(m).as_array().ok())
            .and_then(|arr| {
                let values: Vec<PdfValue> = arr.iter().map(|o| convert_object(self.deref(o))).collect();
                Matrix::from_operands(&values)
            });

        let scope = if stream.dict.has(b"Resources") {
            ResourceScope::Form(id)
        } else {
            scope
        };

        Some(SubProgram {
            id,
            content: stream_bytes(stream)?,
            matrix,
            scope,
        })
    }

    fn decode_text(&self, scope: ResourceScope, font_key: &[u8], bytes: &[u8]) -> String {
        if let Some(font) = self.font_dict(scope, font_key) {
            let subtype = font.get(b"Subtype").and_then(Object::as_name).ok();
            let encoding = font
                .get(b"Encoding")
                .ok()
                .and_then(|o| self.deref(o).as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned());

            match encoding.as_deref() {
                // Identity and UCS-2 CMaps used by two-byte fonts carry
                // UTF-16BE code units.
                Some(enc)
                    if (enc.contains("Identity") || enc.contains("UCS2") || enc.contains("UTF16"))
                        && bytes.len() >= 2
                        && bytes.len() % 2 == 0 =>
                {
                    let decoded = decode_utf16_be(bytes);
                    if !decoded.is_empty() && !decoded.chars().all(|c| c == '\u{FFFD}' || c == '\0') {
                        return decoded;
                    }
                }
                Some("WinAnsiEncoding") if subtype != Some(b"Type0".as_slice()) => {
                    return decode_win_ansi(bytes);
                }
                _ => {}
            }
        }

        // Fallback to generic heuristic.
        decode_text_simple(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Stream};

    #[test]
    fn string_bytes_decode_by_shape() {
        assert_eq!(decode_text_simple(b"Total: 42"), "Total: 42");
        assert_eq!(decode_text_simple("\u{D55C}\u{AE00}".as_bytes()), "\u{D55C}\u{AE00}");
        // Not UTF-8, so each byte is taken as Latin-1.
        assert_eq!(decode_text_simple(&[b'n', 0xE4, b'a']), "n\u{E4}a");
        assert_eq!(decode_text_simple(&[]), "");
    }

    #[test]
    fn utf16_with_bom_drops_dangling_byte() {
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0xD5, 0x5C, 0x00, 0x21]), "\u{D55C}!");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x5A, 0x01]), "Z");
    }

    #[test]
    fn only_numbers_are_numbers() {
        assert_eq!(get_number_from_value(&PdfValue::Integer(-3)), Some(-3.0));
        assert_eq!(get_number_from_value(&PdfValue::Real(0.25)), Some(0.25));
        assert_eq!(get_number_from_value(&PdfValue::Str(b"12".to_vec())), None);
        assert_eq!(get_number_from_value(&PdfValue::Reference((4, 0))), None);
    }

    #[test]
    fn convert_object_keeps_structure() {
        let array = Object::Array(vec![
            Object::Integer(1),
            Object::Real(0.5),
            Object::Name(b"Fm1".to_vec()),
            Object::String(b"\x01\x02".to_vec(), lopdf::StringFormat::Hexadecimal),
            Object::Reference((9, 0)),
        ]);
        assert_eq!(
            convert_object(&array),
            PdfValue::Array(vec![
                PdfValue::Integer(1),
                PdfValue::Real(0.5),
                PdfValue::Name(b"Fm1".to_vec()),
                PdfValue::Str(vec![1, 2]),
                PdfValue::Reference((9, 0)),
            ])
        );

        // A stream converts to its dictionary; the bytes stay behind.
        let stream = Stream::new(dictionary! { "Subtype" => "Form" }, b"BT ET".to_vec());
        match convert_object(&Object::Stream(stream)) {
            PdfValue::Dict(entries) => {
                assert!(entries.contains(&(b"Subtype".to_vec(), PdfValue::Name(b"Form".to_vec()))));
                assert!(entries.contains(&(b"Length".to_vec(), PdfValue::Integer(5))));
            }
            other => panic!("expected a dictionary, got {:?}", other),
        }
    }

    // -- LopdfBackend -------------------------------------------------------

    /// One page inheriting MediaBox and Resources from the page tree, with
    /// a CropBox of its own and a form XObject `/Fm1`.
    fn build_doc(with_crop: bool) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                "Matrix" => vec![2.into(), 0.into(), 0.into(), 2.into(), 10.into(), 20.into()],
            },
            b"BT /F1 10 Tf (inner) Tj ET".to_vec(),
        ));
        let image_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"/Fm1 Do".to_vec()));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if with_crop {
            page.set(
                "CropBox",
                vec![20.into(), 40.into(), 592.into(), Object::Real(740.0)],
            );
        }
        let page_id = doc.add_object(page);

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => dictionary! { "Fm1" => form_id, "Im1" => image_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn backend(with_crop: bool) -> LopdfBackend {
        LopdfBackend::from_document(build_doc(with_crop)).unwrap()
    }

    #[test]
    fn page_frame_inherits_media_box() {
        let b = backend(false);
        let page = b.page_id(1).unwrap();
        let frame = b.page_frame(page).unwrap();
        assert_eq!(frame.crop_offset_x, 0.0);
        assert_eq!(frame.crop_offset_y, 0.0);
        assert_eq!(frame.crop_height, 792.0);
        assert_eq!(frame.scope, ResourceScope::Page(page));
    }

    #[test]
    fn page_frame_prefers_crop_box() {
        let b = backend(true);
        let frame = b.page_frame(b.page_id(1).unwrap()).unwrap();
        assert_eq!(frame.crop_offset_x, 20.0);
        assert_eq!(frame.crop_offset_y, 40.0);
        assert_eq!(frame.crop_height, 700.0);
        assert_eq!(frame.page_top(), 740.0);
    }

    #[test]
    fn page_id_out_of_range() {
        let b = backend(false);
        assert!(b.page_id(1).is_ok());
        match b.page_id(5) {
            Err(PdfError::PageOutOfRange { page, count }) => {
                assert_eq!(page, 5);
                assert_eq!(count, 1);
            }
            other => panic!("expected PageOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn resolve_form_inherits_caller_scope_and_reads_matrix() {
        let b = backend(false);
        let scope = ResourceScope::Page(b.page_id(1).unwrap());
        let form = b.resolve_sub_program(scope, b"Fm1").unwrap();
        assert_eq!(form.scope, scope);
        assert_eq!(form.content, b"BT /F1 10 Tf (inner) Tj ET");
        assert_eq!(form.matrix, Some(Matrix::new(2.0, 0.0, 0.0, 2.0, 10.0, 20.0)));
    }

    #[test]
    fn resolve_skips_images_and_unknown_names() {
        let b = backend(false);
        let scope = ResourceScope::Page(b.page_id(1).unwrap());
        assert!(b.resolve_sub_program(scope, b"Im1").is_none());
        assert!(b.resolve_sub_program(scope, b"Nope").is_none());
        assert!(b.resolve_sub_program(ResourceScope::Empty, b"Fm1").is_none());
    }

    #[test]
    fn decode_text_uses_win_ansi_font_encoding() {
        let b = backend(false);
        let scope = ResourceScope::Page(b.page_id(1).unwrap());
        assert_eq!(b.decode_text(scope, b"F1", &[0x80, b'5']), "\u{20AC}5");
        // Unknown font key falls back to the generic heuristic.
        assert_eq!(b.decode_text(scope, b"F9", b"plain"), "plain");
    }

    #[test]
    fn decode_content_recovers_from_corruption() {
        let b = backend(false);
        let ops = b.decode_content(b"BT (a) Tj (b");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].operator, "Tj");
    }

    #[test]
    fn decode_content_survives_inline_images() {
        let b = backend(false);
        let ops = b.decode_content(b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \xff)(\0 EI Q BT (x) Tj ET");
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "BI", "Q", "BT", "Tj", "ET"]);
        assert_eq!(ops[4].operands, vec![PdfValue::Str(b"x".to_vec())]);
    }

    #[test]
    fn decode_content_reads_operands() {
        let b = backend(false);
        let ops = b.decode_content(b"BT /F1 12 Tf 72 700 Td <0041> Tj ET");
        assert_eq!(ops.len(), 5);
        assert_eq!(ops[1].operands, vec![PdfValue::Name(b"F1".to_vec()), PdfValue::Integer(12)]);
        assert_eq!(ops[3].operands, vec![PdfValue::Str(vec![0x00, 0x41])]);
    }

    #[test]
    fn page_content_reads_stream() {
        let b = backend(false);
        let content = b.page_content(b.page_id(1).unwrap()).unwrap();
        assert_eq!(content, b"/Fm1 Do");
    }
}
