use lopdf::{Dictionary, Object};
use uuid::Uuid;

use super::{capture_numbers, content_stream_ids, layer_tag, OCR_LAYER};
use crate::coords::{font_pt_to_px, pdf_rect_to_viewer};
use crate::ocr::ocr_annotations;
use crate::parser::backend::{decode_text_simple, object_to_f64, stream_bytes, LopdfBackend, PdfBackend};
use crate::parser::interpret::{ExtractOptions, Interpreter};
use crate::types::{Annotation, AnnotationKind, PageFrame, PdfRect, Rgb};

/// Tokens recovered from a `/DA` (default appearance) string.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DefaultAppearance {
    pub font_size_pt: Option<f64>,
    pub color: Option<Rgb>,
}

/// Parse the `<size> Tf` and `<r> <g> <b> rg` tokens of a `/DA` string.
/// Missing or malformed tokens are left as `None`.
pub fn parse_default_appearance(da: &str) -> DefaultAppearance {
    let font_size_pt = capture_numbers(r"([\d.]+)\s+Tf", da).map(|v| v[0]);
    let color = capture_numbers(r"([\d.]+)\s+([\d.]+)\s+([\d.]+)\s+rg", da)
        .map(|v| Rgb::from_unit(v[0], v[1], v[2]));
    DefaultAppearance {
        font_size_pt,
        color,
    }
}

/// Properties recovered from a `/DS` (default style) string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DefaultStyle {
    pub font_family: Option<String>,
    pub bold: bool,
}

/// Parse the CSS-like `font-family` and `font-weight` properties of a `/DS`
/// string.
pub fn parse_default_style(ds: &str) -> DefaultStyle {
    let font_family = regex::Regex::new(r#"font-family:\s*['"]?([^;'"]+)['"]?"#)
        .ok()
        .and_then(|re| re.captures(ds))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|family| !family.is_empty());
    let bold = regex::Regex::new(r"font-weight:\s*(bold|[6-9]00)")
        .map(|re| re.is_match(ds))
        .unwrap_or(false);
    DefaultStyle { font_family, bold }
}

/// Read every modelled annotation on one page, followed by the OCR text
/// layer if the page carries one.
///
/// Annotation subtypes outside the model and entries without a usable
/// `/Rect` are skipped.
pub fn read_page_annotations(backend: &LopdfBackend, frame: &PageFrame, page_number: u32) -> Vec<Annotation> {
    let doc = backend.raw_doc();
    let Ok(page) = doc.get_object(frame.page).and_then(Object::as_dict) else {
        return Vec::new();
    };

    let mut annotations: Vec<Annotation> = page
        .get(b"Annots")
        .ok()
        .and_then(|annots| backend.deref(annots).as_array().ok())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| backend.deref(entry).as_dict().ok())
                .filter_map(|dict| read_annotation(backend, dict, frame, page_number))
                .collect()
        })
        .unwrap_or_default();

    annotations.extend(read_ocr_layer(backend, page, frame, page_number));
    annotations
}

fn read_annotation(
    backend: &LopdfBackend,
    dict: &Dictionary,
    frame: &PageFrame,
    page_number: u32,
) -> Option<Annotation> {
    let subtype = dict.get(b"Subtype").and_then(Object::as_name).ok()?;
    let Some(kind) = AnnotationKind::from_pdf_subtype(subtype) else {
        log::debug!(
            "dropping /{} annotation on page {}",
            String::from_utf8_lossy(subtype),
            page_number
        );
        return None;
    };

    let Some(rect) = read_rect(backend, dict) else {
        log::warn!("{} annotation on page {} has no usable /Rect", kind, page_number);
        return None;
    };

    let mut annotation = Annotation::new(kind, page_number, pdf_rect_to_viewer(&rect, frame));
    if let Some(id) = read_string(backend, dict, b"NM").and_then(|nm| Uuid::parse_str(nm.trim()).ok()) {
        annotation.id = id;
    }
    annotation.content = read_string(backend, dict, b"Contents").unwrap_or_default();

    match kind {
        AnnotationKind::Highlight => {
            if let Some(color) = read_color(backend, dict) {
                annotation.color = color;
            }
        }
        AnnotationKind::FreeText => {
            let da = read_string(backend, dict, b"DA").unwrap_or_default();
            let appearance = parse_default_appearance(&da);
            match appearance.font_size_pt {
                Some(pt) => annotation.font_size = font_pt_to_px(pt),
                None => log::warn!("free-text annotation without a font size in /DA {:?}", da),
            }
            if let Some(color) = appearance.color {
                annotation.color = color;
            }

            let style = parse_default_style(&read_string(backend, dict, b"DS").unwrap_or_default());
            if let Some(family) = style.font_family {
                annotation.font_family = family;
            }
            annotation.bold = style.bold;
        }
        AnnotationKind::Underline | AnnotationKind::OcrText => {}
    }

    Some(annotation)
}

fn read_rect(backend: &LopdfBackend, dict: &Dictionary) -> Option<PdfRect> {
    let values = read_numbers(backend, dict, b"Rect")?;
    if values.len() < 4 {
        return None;
    }
    Some(PdfRect::from_corners(values[0], values[1], values[2], values[3]))
}

fn read_color(backend: &LopdfBackend, dict: &Dictionary) -> Option<Rgb> {
    match read_numbers(backend, dict, b"C")?.as_slice() {
        [r, g, b] => Some(Rgb::from_unit(*r, *g, *b)),
        [gray] => Some(Rgb::from_unit(*gray, *gray, *gray)),
        _ => None,
    }
}

fn read_numbers(backend: &LopdfBackend, dict: &Dictionary, key: &[u8]) -> Option<Vec<f64>> {
    let array = backend.deref(dict.get(key).ok()?).as_array().ok()?;
    array
        .iter()
        .map(|o| object_to_f64(backend.deref(o)))
        .collect()
}

fn read_string(backend: &LopdfBackend, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match backend.deref(dict.get(key).ok()?) {
        Object::String(bytes, _) => Some(decode_text_simple(bytes)),
        _ => None,
    }
}

/// Interpret the OCR text layer streams of a page back into annotations.
fn read_ocr_layer(
    backend: &LopdfBackend,
    page: &Dictionary,
    frame: &PageFrame,
    page_number: u32,
) -> Vec<Annotation> {
    let doc = backend.raw_doc();
    let options = ExtractOptions::default();
    let mut interpreter = Interpreter::new(backend, frame, &options);

    for id in content_stream_ids(doc, page) {
        if layer_tag(doc, id) != Some(OCR_LAYER) {
            continue;
        }
        let Some(bytes) = doc
            .get_object(id)
            .and_then(Object::as_stream)
            .ok()
            .and_then(stream_bytes)
        else {
            continue;
        };
        let ops = backend.decode_content(&bytes);
        interpreter.run(&ops, frame.scope);
    }

    ocr_annotations(&interpreter.finish(), page_number)
}

#[cfg(test)]
mod tests {
    use lopdf::{dictionary, Object, StringFormat};

    use super::*;
    use crate::test_support::build_document;

    #[test]
    fn test_parse_default_appearance() {
        let da = parse_default_appearance("/Helv 10.5 Tf 1 0.647 0 rg");
        assert_eq!(da.font_size_pt, Some(10.5));
        assert_eq!(da.color, Some(Rgb::ORANGE));
    }

    #[test]
    fn test_parse_default_appearance_missing_tokens() {
        assert_eq!(parse_default_appearance(""), DefaultAppearance::default());
        let da = parse_default_appearance("/Helv Tf 0 g");
        assert_eq!(da.font_size_pt, None);
        assert_eq!(da.color, None);
    }

    #[test]
    fn test_parse_default_style() {
        let style = parse_default_style("font-family: 'Malgun Gothic'; font-size: 10.5pt; font-weight: bold; color: #000000");
        assert_eq!(style.font_family.as_deref(), Some("Malgun Gothic"));
        assert!(style.bold);

        let style = parse_default_style("font: 12pt Helvetica");
        assert_eq!(style, DefaultStyle::default());
    }

    fn string(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    fn rect(values: [f32; 4]) -> Object {
        Object::Array(values.iter().map(|&v| Object::Real(v)).collect())
    }

    fn read_with(annots: Vec<lopdf::Dictionary>) -> Vec<Annotation> {
        let mut doc = build_document(&["BT ET"]);
        let page_id = doc.get_pages()[&1];
        let refs: Vec<Object> = annots
            .into_iter()
            .map(|d| Object::Reference(doc.add_object(d)))
            .collect();
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Annots", refs);

        let backend = LopdfBackend::from_document(doc).unwrap();
        let frame = backend.page_frame(page_id).unwrap();
        read_page_annotations(&backend, &frame, 1)
    }

    #[test]
    fn test_reads_modelled_subtypes_and_skips_others() {
        let id = Uuid::new_v4();
        let annotations = read_with(vec![
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Highlight",
                "Rect" => rect([72.0, 700.0, 144.0, 712.0]),
                "C" => vec![Object::Real(1.0), Object::Real(0.647), Object::Real(0.0)],
                "NM" => string(&id.to_string()),
            },
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => rect([0.0, 0.0, 10.0, 10.0]),
            },
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Underline",
                "Contents" => string("see"),
            },
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Underline",
                "Rect" => rect([0.0, 780.0, 30.0, 792.0]),
                "Contents" => string("see"),
            },
        ]);

        assert_eq!(annotations.len(), 2);
        let highlight = &annotations[0];
        assert_eq!(highlight.kind, AnnotationKind::Highlight);
        assert_eq!(highlight.id, id);
        assert_eq!(highlight.color, Rgb::ORANGE);
        assert!((highlight.x - 96.0).abs() < 1e-3);
        assert!((highlight.y - 80.0 * 4.0 / 3.0).abs() < 1e-3);
        assert!((highlight.width - 96.0).abs() < 1e-3);
        assert!((highlight.height - 16.0).abs() < 1e-3);

        let underline = &annotations[1];
        assert_eq!(underline.kind, AnnotationKind::Underline);
        assert_eq!(underline.color, Rgb::RED);
        assert_eq!(underline.content, "see");
        assert!(underline.y.abs() < 1e-3);
    }

    #[test]
    fn test_reads_free_text_appearance() {
        let annotations = read_with(vec![dictionary! {
            "Type" => "Annot",
            "Subtype" => "FreeText",
            "Rect" => rect([100.0, 600.0, 300.0, 650.0]),
            "Contents" => string("memo"),
            "DA" => string("/Helv 15 Tf 0 0 1 rg"),
            "DS" => string("font-family: 'Courier'; font-weight: bold"),
        }]);
        let note = &annotations[0];
        assert_eq!(note.kind, AnnotationKind::FreeText);
        assert_eq!(note.content, "memo");
        assert_eq!(note.font_size, 20);
        assert_eq!(note.color, Rgb::new(0, 0, 255));
        assert_eq!(note.font_family, "Courier");
        assert!(note.bold);
    }

    #[test]
    fn test_free_text_with_malformed_da_keeps_defaults() {
        let annotations = read_with(vec![dictionary! {
            "Type" => "Annot",
            "Subtype" => "FreeText",
            "Rect" => rect([100.0, 600.0, 300.0, 650.0]),
            "DA" => string("garbage"),
        }]);
        let note = &annotations[0];
        assert_eq!(note.font_size, crate::types::DEFAULT_FONT_SIZE);
        assert_eq!(note.color, Rgb::BLACK);
        assert_eq!(note.font_family, crate::types::DEFAULT_FONT_FAMILY);
    }

    #[test]
    fn test_invalid_nm_gets_fresh_id() {
        let annotations = read_with(vec![dictionary! {
            "Type" => "Annot",
            "Subtype" => "Highlight",
            "Rect" => rect([0.0, 0.0, 10.0, 10.0]),
            "NM" => string("not-a-uuid"),
        }]);
        assert_eq!(annotations[0].color, Rgb::YELLOW);
        assert!(!annotations[0].id.is_nil());
    }
}
