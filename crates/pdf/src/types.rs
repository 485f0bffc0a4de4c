use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::parser::backend::{PageId, ResourceScope};

/// Font family used for new free-text annotations when nothing else is set.
pub const DEFAULT_FONT_FAMILY: &str = "Malgun Gothic";

/// Font size (viewer pixels) used for new free-text annotations.
pub const DEFAULT_FONT_SIZE: u32 = 14;

/// Font size (viewer pixels) recorded on annotations produced by OCR.
pub const OCR_FONT_SIZE: u32 = 10;

// ---------------------------------------------------------------------------
// Positioned text
// ---------------------------------------------------------------------------

/// One run of text recovered from a page, in viewer pixel space (top-left
/// origin, 96 dpi).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedTextRun {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PositionedTextRun {
    pub fn rect(&self) -> ViewerRect {
        ViewerRect::new(self.x, self.y, self.width, self.height)
    }

    pub fn area(&self) -> f64 {
        (self.width * self.height).abs()
    }

    /// A run is usable for selection only if its box has a non-zero area.
    pub fn is_visible(&self) -> bool {
        self.area() > 0.0
    }

    pub fn intersects(&self, rect: &ViewerRect) -> bool {
        self.rect().intersects(rect)
    }
}

/// An axis-aligned rectangle in viewer pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewerRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from two arbitrary corners, e.g. the start and end
    /// point of a mouse drag in any direction.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Flip negative extents so that `width` and `height` are non-negative.
    pub fn normalized(&self) -> Self {
        Self::from_corners(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Edge-inclusive intersection test.
    pub fn intersects(&self, other: &ViewerRect) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.x <= b.right() && b.x <= a.right() && a.y <= b.bottom() && b.y <= a.bottom()
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &ViewerRect) -> Self {
        let a = self.normalized();
        let b = other.normalized();
        Self::from_corners(
            a.x.min(b.x),
            a.y.min(b.y),
            a.right().max(b.right()),
            a.bottom().max(b.bottom()),
        )
    }
}

/// An axis-aligned rectangle in PDF user space (bottom-left origin, points).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl PdfRect {
    /// Normalise an annotation `/Rect` whose corners may be given in any order.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Corner points in the order top-left, top-right, bottom-left,
    /// bottom-right, flattened as `/QuadPoints` expects.
    pub fn quad_points(&self) -> [f64; 8] {
        [
            self.left,
            self.top,
            self.right,
            self.top,
            self.left,
            self.bottom,
            self.right,
            self.bottom,
        ]
    }
}

// ---------------------------------------------------------------------------
// Page geometry
// ---------------------------------------------------------------------------

/// Immutable per-page geometry shared by the read and write paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFrame {
    pub page: PageId,
    pub crop_offset_x: f64,
    pub crop_offset_y: f64,
    pub crop_height: f64,
    pub scope: ResourceScope,
}

impl PageFrame {
    /// The PDF y coordinate of the visible top edge.
    pub fn page_top(&self) -> f64 {
        self.crop_offset_y + self.crop_height
    }
}

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Rgb::new(0, 0, 0);
    pub const YELLOW: Self = Rgb::new(255, 255, 0);
    pub const ORANGE: Self = Rgb::new(255, 165, 0);
    pub const RED: Self = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Parse `#RRGGBB` or `#AARRGGBB` (alpha is discarded).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let rgb = match hex.len() {
            6 => hex,
            8 => &hex[2..],
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&rgb[i..i + 2], 16).ok();
        Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Build a colour from unit-interval components as found in `rg` or `/C`.
    pub fn from_unit(r: f64, g: f64, b: f64) -> Self {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb::new(to_byte(r), to_byte(g), to_byte(b))
    }

    pub fn to_unit(self) -> (f64, f64, f64) {
        (
            f64::from(self.r) / 255.0,
            f64::from(self.g) / 255.0,
            f64::from(self.b) / 255.0,
        )
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::parse_hex(s).ok_or_else(|| InvalidColor(s.to_string()))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    /// A bad colour string never fails the surrounding batch; it degrades to
    /// black.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Rgb::parse_hex(&raw).unwrap_or_else(|| {
            log::warn!("invalid colour {:?}, falling back to black", raw);
            Rgb::BLACK
        }))
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnotationKind {
    FreeText,
    Highlight,
    Underline,
    OcrText,
}

impl AnnotationKind {
    pub fn default_color(&self) -> Rgb {
        match self {
            AnnotationKind::Highlight => Rgb::YELLOW,
            AnnotationKind::Underline => Rgb::RED,
            AnnotationKind::FreeText | AnnotationKind::OcrText => Rgb::BLACK,
        }
    }

    /// The `/Subtype` written for this kind. OCR text is not an annotation
    /// object in the file, so it has none.
    pub fn pdf_subtype(&self) -> Option<&'static [u8]> {
        match self {
            AnnotationKind::FreeText => Some(b"FreeText"),
            AnnotationKind::Highlight => Some(b"Highlight"),
            AnnotationKind::Underline => Some(b"Underline"),
            AnnotationKind::OcrText => None,
        }
    }

    pub fn from_pdf_subtype(subtype: &[u8]) -> Option<Self> {
        match subtype {
            b"FreeText" => Some(AnnotationKind::FreeText),
            b"Highlight" => Some(AnnotationKind::Highlight),
            b"Underline" => Some(AnnotationKind::Underline),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationKind::FreeText => write!(f, "free-text"),
            AnnotationKind::Highlight => write!(f, "highlight"),
            AnnotationKind::Underline => write!(f, "underline"),
            AnnotationKind::OcrText => write!(f, "ocr-text"),
        }
    }
}

impl FromStr for AnnotationKind {
    type Err = InvalidAnnotationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free-text" | "freetext" | "text" => Ok(AnnotationKind::FreeText),
            "highlight" => Ok(AnnotationKind::Highlight),
            "underline" => Ok(AnnotationKind::Underline),
            "ocr-text" | "ocr" => Ok(AnnotationKind::OcrText),
            _ => Err(InvalidAnnotationKind(s.to_string())),
        }
    }
}

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

/// An annotation in viewer pixel space. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: AnnotationKind,
    #[serde(default)]
    pub content: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub page: u32,
    #[serde(default)]
    pub color: Rgb,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub bold: bool,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, page: u32, rect: ViewerRect) -> Self {
        let rect = rect.normalized();
        Self {
            id: Uuid::new_v4(),
            kind,
            content: String::new(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            page,
            color: kind.default_color(),
            font_family: default_font_family(),
            font_size: DEFAULT_FONT_SIZE,
            bold: false,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn rect(&self) -> ViewerRect {
        ViewerRect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Error)]
#[error("Invalid colour {0:?} (expected '#RRGGBB' or '#AARRGGBB')")]
pub struct InvalidColor(pub String);

#[derive(Debug, Error)]
#[error("Unknown annotation kind {0:?} (expected free-text, highlight, underline or ocr-text)")]
pub struct InvalidAnnotationKind(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parse_six_digits() {
        assert_eq!(Rgb::parse_hex("#FFA500"), Some(Rgb::ORANGE));
        assert_eq!(Rgb::parse_hex("ff0000"), Some(Rgb::RED));
    }

    #[test]
    fn test_rgb_parse_with_alpha_prefix() {
        assert_eq!(Rgb::parse_hex("#FF000000"), Some(Rgb::BLACK));
        assert_eq!(Rgb::parse_hex("#80FFFF00"), Some(Rgb::YELLOW));
    }

    #[test]
    fn test_rgb_parse_invalid() {
        assert_eq!(Rgb::parse_hex("#12345"), None);
        assert_eq!(Rgb::parse_hex("#GGGGGG"), None);
        assert_eq!(Rgb::parse_hex(""), None);
        assert!("nope".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_rgb_parse_non_ascii_is_rejected() {
        // Eight bytes long, but byte 2 is inside a two-byte character.
        assert_eq!(Rgb::parse_hex("#a\u{e9}34567"), None);
        assert_eq!(Rgb::parse_hex("#\u{e9}\u{e9}\u{e9}"), None);
    }

    #[test]
    fn test_rgb_unit_conversion_is_stable() {
        let c = Rgb::new(12, 200, 77);
        let (r, g, b) = c.to_unit();
        assert_eq!(Rgb::from_unit(r, g, b), c);
    }

    #[test]
    fn test_rgb_from_unit_clamps() {
        assert_eq!(Rgb::from_unit(2.0, -1.0, 0.5), Rgb::new(255, 0, 128));
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(format!("{}", Rgb::ORANGE), "#FFA500");
    }

    #[test]
    fn test_rgb_deserialize_bad_string_degrades_to_black() {
        let c: Rgb = serde_json::from_str("\"not-a-colour\"").unwrap();
        assert_eq!(c, Rgb::BLACK);
        let c: Rgb = serde_json::from_str(r##""#a\u00e934567""##).unwrap();
        assert_eq!(c, Rgb::BLACK);
    }

    #[test]
    fn test_annotation_kind_serde_names() {
        let json = serde_json::to_string(&AnnotationKind::OcrText).unwrap();
        assert_eq!(json, "\"ocr-text\"");
        let kind: AnnotationKind = serde_json::from_str("\"free-text\"").unwrap();
        assert_eq!(kind, AnnotationKind::FreeText);
    }

    #[test]
    fn test_annotation_kind_from_str() {
        assert_eq!("Highlight".parse::<AnnotationKind>().unwrap(), AnnotationKind::Highlight);
        assert_eq!("text".parse::<AnnotationKind>().unwrap(), AnnotationKind::FreeText);
        assert!("circle".parse::<AnnotationKind>().is_err());
    }

    #[test]
    fn test_annotation_kind_subtypes() {
        assert_eq!(AnnotationKind::from_pdf_subtype(b"Underline"), Some(AnnotationKind::Underline));
        assert_eq!(AnnotationKind::from_pdf_subtype(b"Ink"), None);
        assert_eq!(AnnotationKind::OcrText.pdf_subtype(), None);
        for kind in [AnnotationKind::FreeText, AnnotationKind::Highlight, AnnotationKind::Underline] {
            let subtype = kind.pdf_subtype().unwrap();
            assert_eq!(AnnotationKind::from_pdf_subtype(subtype), Some(kind));
        }
    }

    #[test]
    fn test_annotation_new_applies_kind_defaults() {
        let ann = Annotation::new(AnnotationKind::Highlight, 2, ViewerRect::new(10.0, 20.0, 30.0, 5.0));
        assert_eq!(ann.color, Rgb::YELLOW);
        assert_eq!(ann.page, 2);
        assert_eq!(ann.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(ann.font_family, DEFAULT_FONT_FAMILY);
    }

    #[test]
    fn test_annotation_deserialize_fills_defaults() {
        let json = r##"{"kind":"underline","x":1,"y":2,"width":3,"height":4,"page":1}"##;
        let ann: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(ann.kind, AnnotationKind::Underline);
        assert_eq!(ann.font_size, DEFAULT_FONT_SIZE);
        assert!(ann.content.is_empty());
    }

    #[test]
    fn test_viewer_rect_from_inverted_drag() {
        let r = ViewerRect::from_corners(50.0, 40.0, 10.0, 20.0);
        assert_eq!(r, ViewerRect::new(10.0, 20.0, 40.0, 20.0));
    }

    #[test]
    fn test_viewer_rect_intersects() {
        let a = ViewerRect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&ViewerRect::new(5.0, 5.0, 10.0, 10.0)));
        assert!(a.intersects(&ViewerRect::new(10.0, 0.0, 5.0, 5.0)));
        assert!(!a.intersects(&ViewerRect::new(11.0, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn test_viewer_rect_union() {
        let a = ViewerRect::new(0.0, 0.0, 10.0, 10.0);
        let b = ViewerRect::new(20.0, 5.0, 5.0, 20.0);
        assert_eq!(a.union(&b), ViewerRect::new(0.0, 0.0, 25.0, 25.0));
    }

    #[test]
    fn test_pdf_rect_quad_points_order() {
        let r = PdfRect::from_corners(10.0, 780.0, 110.0, 765.0);
        let q = r.quad_points();
        assert_eq!(q, [10.0, 780.0, 110.0, 780.0, 10.0, 765.0, 110.0, 765.0]);
    }

    #[test]
    fn test_run_visibility() {
        let mut run = PositionedTextRun {
            text: "a".into(),
            x: 0.0,
            y: 0.0,
            width: 4.0,
            height: 2.0,
        };
        assert!(run.is_visible());
        run.width = 0.0;
        assert!(!run.is_visible());
    }
}
