use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};

use super::{content_stream_ids, format_number, layer_tag, text_string, LAYER_KEY, OCR_GUARD_LAYER, OCR_LAYER};
use crate::coords::{font_px_to_pt, px_to_pt, to_pdf, viewer_rect_to_pdf};
use crate::fonts::{FontChain, FontSource};
use crate::parser::backend::{LopdfBackend, PageId, PdfBackend};
use crate::parser::interpret::{DEFAULT_LEADING_RATIO, GLYPH_WIDTH_RATIO};
use crate::types::{Annotation, AnnotationKind, PageFrame, PdfRect, Rgb, ViewerRect};
use crate::PdfError;

/// Appearance streams never draw text smaller than this many points.
const MIN_APPEARANCE_FONT_PT: f64 = 4.0;

/// Fill opacity of the OCR text layer.
const OCR_FILL_ALPHA: f32 = 0.004;

const OCR_GSTATE: &[u8] = b"PmOcrGs";

/// How annotations are written back into a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Zoom factor the viewer coordinates were captured at. Coordinates are
    /// divided by it; font sizes are not.
    pub scale: f64,
    pub fonts: FontChain,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            fonts: FontChain::default(),
        }
    }
}

/// Replaces the annotations of a document with an in-memory list.
pub struct AnnotationWriter {
    options: SaveOptions,
}

impl AnnotationWriter {
    pub fn new(options: SaveOptions) -> Self {
        Self { options }
    }

    /// Rewrite `bytes` so that its annotations are exactly `annotations`.
    ///
    /// Every existing `/Annots` entry and OCR layer is removed first. The
    /// input is never modified; the result is a complete new file.
    pub fn write(&self, bytes: &[u8], annotations: &[Annotation]) -> Result<Vec<u8>, PdfError> {
        let backend = LopdfBackend::load_bytes(bytes)?;
        let scale = self.scale();

        let mut frames: BTreeMap<u32, PageFrame> = BTreeMap::new();
        for (number, id) in backend.pages() {
            match backend.page_frame(id) {
                Ok(frame) => {
                    frames.insert(number, frame);
                }
                Err(e) => log::warn!("page {} has no usable geometry: {}", number, e),
            }
        }

        let mut by_page: BTreeMap<u32, Vec<&Annotation>> = BTreeMap::new();
        for annotation in annotations {
            if frames.contains_key(&annotation.page) {
                by_page.entry(annotation.page).or_default().push(annotation);
            } else {
                log::warn!(
                    "skipping {} annotation {} on page {} (document has {} pages)",
                    annotation.kind,
                    annotation.id,
                    annotation.page,
                    backend.page_count()
                );
            }
        }

        let ocr_pages: BTreeSet<u32> = annotations
            .iter()
            .filter(|a| a.kind == AnnotationKind::OcrText)
            .map(|a| a.page)
            .collect();
        let mut page_resources: BTreeMap<u32, Dictionary> = ocr_pages
            .iter()
            .filter_map(|n| frames.get(n).map(|f| (*n, backend.page_resources(f.page))))
            .collect();

        let mut doc = backend.into_document();
        let page_ids: Vec<PageId> = doc.get_pages().into_values().collect();
        for page_id in page_ids {
            clear_page(&mut doc, page_id)?;
        }

        let mut wrote_annotation = false;
        for (number, page_annotations) in by_page {
            let Some(frame) = frames.get(&number) else {
                continue;
            };

            let mut annots = Vec::new();
            let mut ocr_runs = Vec::new();
            for annotation in page_annotations {
                let rect = self.unscaled(annotation.rect(), scale);
                match annotation.kind {
                    AnnotationKind::OcrText => ocr_runs.push((annotation, rect)),
                    AnnotationKind::FreeText => {
                        annots.push(Object::Reference(self.free_text(&mut doc, frame, annotation, &rect)?))
                    }
                    AnnotationKind::Highlight | AnnotationKind::Underline => {
                        annots.push(Object::Reference(text_markup(&mut doc, frame, annotation, &rect)))
                    }
                }
            }

            if !annots.is_empty() {
                wrote_annotation = true;
                page_dict_mut(&mut doc, frame.page)?.set("Annots", annots);
            }
            if !ocr_runs.is_empty() {
                let resources = page_resources.remove(&number).unwrap_or_else(Dictionary::new);
                self.ocr_layer(&mut doc, frame, resources, &ocr_runs)?;
            }
        }

        if wrote_annotation {
            ensure_acro_form(&mut doc)?;
        }

        doc.prune_objects();
        let mut out = Vec::new();
        doc.save_to(&mut out).map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(out)
    }

    fn scale(&self) -> f64 {
        let scale = self.options.scale;
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            log::warn!("invalid save scale {}, using 1.0", scale);
            1.0
        }
    }

    fn unscaled(&self, rect: ViewerRect, scale: f64) -> ViewerRect {
        let rect = rect.normalized();
        ViewerRect::new(rect.x / scale, rect.y / scale, rect.width / scale, rect.height / scale)
    }

    fn free_text(
        &self,
        doc: &mut Document,
        frame: &PageFrame,
        annotation: &Annotation,
        rect: &ViewerRect,
    ) -> Result<ObjectId, PdfError> {
        let pdf_rect = viewer_rect_to_pdf(rect, frame);
        let font = self.options.fonts.resolve(&annotation.font_family, &annotation.content)?;
        let size = font_px_to_pt(annotation.font_size);
        let (r, g, b) = annotation.color.to_unit();

        let da = format!(
            "/Helv {} Tf {} {} {} rg",
            format_number(size),
            format_number(r),
            format_number(g),
            format_number(b)
        );
        let ds = format!(
            "font-family: '{}'; font-size: {}pt; font-weight: {}; color: {}",
            annotation.font_family,
            format_number(size),
            if annotation.bold { "bold" } else { "normal" },
            annotation.color.to_hex()
        );

        let appearance = free_text_appearance(doc, font, annotation, &pdf_rect, size)?;
        let appearance_id = doc.add_object(appearance);

        Ok(doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "FreeText",
            "Rect" => rect_object(&pdf_rect),
            "Contents" => text_string(&annotation.content),
            "DA" => Object::string_literal(da),
            "DS" => Object::string_literal(ds),
            "NM" => Object::string_literal(annotation.id.to_string()),
            "F" => 4,
            "P" => frame.page,
            "Border" => vec![0.into(), 0.into(), 0.into()],
            "AP" => dictionary! { "N" => appearance_id },
        }))
    }

    /// Append an invisible text layer for OCR runs to the page content.
    ///
    /// A `q` guard is placed before the existing content so the layer can
    /// pop back to the page's initial graphics state.
    fn ocr_layer(
        &self,
        doc: &mut Document,
        frame: &PageFrame,
        mut resources: Dictionary,
        runs: &[(&Annotation, ViewerRect)],
    ) -> Result<(), PdfError> {
        let mut fonts = sub_dictionary(doc, &resources, b"Font");
        let mut gstates = sub_dictionary(doc, &resources, b"ExtGState");
        gstates.set(
            OCR_GSTATE,
            dictionary! { "Type" => "ExtGState", "ca" => Object::Real(OCR_FILL_ALPHA) },
        );

        let mut font_names: Vec<(String, Vec<u8>)> = Vec::new();
        let mut operations = vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(OCR_GSTATE.to_vec())]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            Operation::new("BT", vec![]),
        ];

        for (annotation, rect) in runs {
            let size = px_to_pt(rect.height);
            if annotation.content.is_empty() || size <= 0.0 {
                log::debug!("skipping empty OCR run {}", annotation.id);
                continue;
            }
            let font = self.options.fonts.resolve(&annotation.font_family, &annotation.content)?;
            let name = match font_names.iter().find(|(family, _)| family == font.family()) {
                Some((_, name)) => name.clone(),
                None => {
                    let name = format!("PmOcr{}", font_names.len()).into_bytes();
                    let dict = font.font_dictionary(doc, false);
                    fonts.set(name.clone(), doc.add_object(dict));
                    font_names.push((font.family().to_string(), name.clone()));
                    name
                }
            };

            let (x, y) = to_pdf(rect.x, rect.bottom(), frame.page_top(), frame.crop_offset_x);
            let natural = annotation.content.chars().count() as f64 * size * GLYPH_WIDTH_RATIO;
            let horizontal = if natural > 0.0 && rect.width > 0.0 {
                px_to_pt(rect.width) / natural
            } else {
                1.0
            };

            operations.push(Operation::new("Tf", vec![Object::Name(name), real(size)]));
            operations.push(Operation::new("Tz", vec![real(horizontal * 100.0)]));
            operations.push(Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), real(x), real(y)],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(font.encode(&annotation.content), StringFormat::Hexadecimal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
        operations.push(Operation::new("Q", vec![]));

        let mut content = b"\n".to_vec();
        content.extend(encode_content(operations)?);

        resources.set("Font", fonts);
        resources.set("ExtGState", gstates);

        let guard_id = doc.add_object(Stream::new(
            dictionary! { LAYER_KEY => Object::Name(OCR_GUARD_LAYER.to_vec()) },
            b"q\n".to_vec(),
        ));
        let layer_id = doc.add_object(Stream::new(
            dictionary! { LAYER_KEY => Object::Name(OCR_LAYER.to_vec()) },
            content,
        ));

        let page = doc
            .get_object(frame.page)
            .and_then(Object::as_dict)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        let mut contents = vec![Object::Reference(guard_id)];
        contents.extend(content_stream_ids(doc, page).into_iter().map(Object::Reference));
        contents.push(Object::Reference(layer_id));

        let page = page_dict_mut(doc, frame.page)?;
        page.set("Contents", contents);
        page.set("Resources", resources);
        Ok(())
    }
}

/// Remove a page's annotations and any layer streams a previous save added.
fn clear_page(doc: &mut Document, page_id: PageId) -> Result<(), PdfError> {
    let page = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| PdfError::Save(e.to_string()))?;
    let ids = content_stream_ids(doc, page);
    let kept: Vec<Object> = ids
        .iter()
        .filter(|id| layer_tag(doc, **id).is_none())
        .map(|id| Object::Reference(*id))
        .collect();
    let changed = kept.len() != ids.len();

    let page = page_dict_mut(doc, page_id)?;
    page.remove(b"Annots");
    if changed {
        page.set("Contents", kept);
    }
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: PageId) -> Result<&mut Dictionary, PdfError> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| PdfError::Save(format!("cannot update page {:?}: {}", page_id, e)))
}

/// A direct copy of `resources[key]`, following one reference.
fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    match resources.get(key) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

fn text_markup(doc: &mut Document, frame: &PageFrame, annotation: &Annotation, rect: &ViewerRect) -> ObjectId {
    let pdf_rect = viewer_rect_to_pdf(rect, frame);
    let (kind, color) = match annotation.kind {
        AnnotationKind::Underline => (AnnotationKind::Underline, Rgb::RED),
        _ => (AnnotationKind::Highlight, annotation.color),
    };
    let subtype = kind.pdf_subtype().unwrap_or(b"Highlight".as_slice());
    let quad_points: Vec<Object> = pdf_rect.quad_points().iter().map(|v| real(*v)).collect();

    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => Object::Name(subtype.to_vec()),
        "Rect" => rect_object(&pdf_rect),
        "QuadPoints" => quad_points,
        "C" => color_object(color),
        "Contents" => text_string(&annotation.content),
        "NM" => Object::string_literal(annotation.id.to_string()),
        "F" => 4,
        "P" => frame.page,
    })
}

/// Build the `/AP /N` form XObject of a free-text annotation: the content
/// word-wrapped to the box, left aligned, clipped to the box.
fn free_text_appearance(
    doc: &mut Document,
    font: &FontSource,
    annotation: &Annotation,
    rect: &PdfRect,
    size: f64,
) -> Result<Stream, PdfError> {
    let (width, height) = (rect.width(), rect.height());
    let size = size.max(MIN_APPEARANCE_FONT_PT);
    let (r, g, b) = annotation.color.to_unit();

    let max_chars = ((width / (size * GLYPH_WIDTH_RATIO)).floor() as usize).max(1);
    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new("re", vec![0.into(), 0.into(), real(width), real(height)]),
        Operation::new("W", vec![]),
        Operation::new("n", vec![]),
        Operation::new("rg", vec![real(r), real(g), real(b)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F0".to_vec()), real(size)]),
    ];
    for (i, line) in wrap_lines(&annotation.content, max_chars).iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline = height - size - i as f64 * size * DEFAULT_LEADING_RATIO;
        operations.push(Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), real(baseline)],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(font.encode(line), StringFormat::Hexadecimal)],
        ));
    }
    operations.push(Operation::new("ET", vec![]));
    operations.push(Operation::new("Q", vec![]));

    let font_dict = font.font_dictionary(doc, annotation.bold);
    let font_id = doc.add_object(font_dict);

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), real(width), real(height)],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F0" => font_id },
            },
        },
        encode_content(operations)?,
    ))
}

/// Greedy word wrap at `max_chars` characters per line. Explicit newlines
/// always break; words longer than a line are split.
fn wrap_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_chars {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                lines.push(chars.drain(..max_chars).collect());
            }
            if chars.is_empty() {
                continue;
            }
            if line_len > 0 && line_len + 1 + chars.len() > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line_len += chars.len();
            line.extend(chars);
        }
        lines.push(line);
    }
    lines
}

/// Point the catalog's AcroForm at a Helvetica default resource and ask
/// viewers to regenerate appearances they cannot use.
fn ensure_acro_form(doc: &mut Document) -> Result<(), PdfError> {
    let save_err = |e: lopdf::Error| PdfError::Save(format!("cannot update AcroForm: {}", e));
    let root_id = doc.trailer.get(b"Root").and_then(Object::as_reference).map_err(save_err)?;
    let helvetica = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let acro_ref = doc
        .get_object(root_id)
        .and_then(Object::as_dict)
        .and_then(|catalog| catalog.get(b"AcroForm"))
        .and_then(Object::as_reference)
        .ok();
    let acro_form = match acro_ref {
        Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut).map_err(save_err)?,
        None => {
            let catalog = doc.get_object_mut(root_id).and_then(Object::as_dict_mut).map_err(save_err)?;
            if !matches!(catalog.get(b"AcroForm"), Ok(Object::Dictionary(_))) {
                catalog.set("AcroForm", Dictionary::new());
            }
            catalog.get_mut(b"AcroForm").and_then(Object::as_dict_mut).map_err(save_err)?
        }
    };

    acro_form.set("NeedAppearances", true);
    match acro_form.get_mut(b"DR") {
        Ok(Object::Dictionary(dr)) => match dr.get_mut(b"Font") {
            Ok(Object::Dictionary(fonts)) => fonts.set("Helv", helvetica),
            _ => dr.set("Font", dictionary! { "Helv" => helvetica }),
        },
        _ => acro_form.set("DR", dictionary! { "Font" => dictionary! { "Helv" => helvetica } }),
    }
    Ok(())
}

fn encode_content(operations: Vec<Operation>) -> Result<Vec<u8>, PdfError> {
    Content { operations }
        .encode()
        .map_err(|e| PdfError::Save(format!("cannot encode content stream: {}", e)))
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rect_object(rect: &PdfRect) -> Object {
    Object::Array(vec![
        real(rect.left),
        real(rect.bottom),
        real(rect.right),
        real(rect.top),
    ])
}

fn color_object(color: Rgb) -> Object {
    let (r, g, b) = color.to_unit();
    Object::Array(vec![real(r), real(g), real(b)])
}
