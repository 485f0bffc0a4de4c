//! Conversions between PDF user space and viewer pixel space.
//!
//! PDF user space has its origin at the bottom-left of the page, measures in
//! points (72 per inch), and may be offset by the page's CropBox. The viewer
//! has its origin at the top-left of the visible area and measures in pixels
//! at 96 per inch. Every crossing between the two goes through this module,
//! and the scale factor is applied exactly once in each direction.

use crate::types::{PageFrame, PdfRect, ViewerRect};

pub const PDF_POINTS_PER_INCH: f64 = 72.0;
pub const VIEWER_PIXELS_PER_INCH: f64 = 96.0;

/// Viewer pixels per PDF point (4/3).
pub const PX_PER_PT: f64 = VIEWER_PIXELS_PER_INCH / PDF_POINTS_PER_INCH;

/// PDF points per viewer pixel (0.75).
pub const PT_PER_PX: f64 = PDF_POINTS_PER_INCH / VIEWER_PIXELS_PER_INCH;

pub fn pt_to_px(pt: f64) -> f64 {
    pt * PX_PER_PT
}

pub fn px_to_pt(px: f64) -> f64 {
    px * PT_PER_PX
}

/// Map a PDF user-space point to viewer pixels.
///
/// `page_height` is the height of the visible (crop) area; `crop_x`/`crop_y`
/// its lower-left corner.
pub fn to_viewer(pdf_x: f64, pdf_y: f64, page_height: f64, crop_x: f64, crop_y: f64) -> (f64, f64) {
    let x = pdf_x - crop_x;
    let y = (page_height + crop_y) - pdf_y;
    (pt_to_px(x), pt_to_px(y))
}

/// Map a viewer pixel point back to PDF user space. `page_top` is the PDF y
/// coordinate of the visible top edge (`crop_y + page_height`).
pub fn to_pdf(viewer_x: f64, viewer_y: f64, page_top: f64, crop_x: f64) -> (f64, f64) {
    (crop_x + px_to_pt(viewer_x), page_top - px_to_pt(viewer_y))
}

/// Convert a viewer rectangle to a PDF rectangle on the given page.
pub fn viewer_rect_to_pdf(rect: &ViewerRect, frame: &PageFrame) -> PdfRect {
    let rect = rect.normalized();
    let (left, top) = to_pdf(rect.x, rect.y, frame.page_top(), frame.crop_offset_x);
    let (right, bottom) = to_pdf(rect.right(), rect.bottom(), frame.page_top(), frame.crop_offset_x);
    PdfRect::from_corners(left, bottom, right, top)
}

/// Convert a PDF rectangle (e.g. an annotation `/Rect`) to viewer space.
pub fn pdf_rect_to_viewer(rect: &PdfRect, frame: &PageFrame) -> ViewerRect {
    let (x1, y1) = to_viewer(
        rect.left,
        rect.top,
        frame.crop_height,
        frame.crop_offset_x,
        frame.crop_offset_y,
    );
    let (x2, y2) = to_viewer(
        rect.right,
        rect.bottom,
        frame.crop_height,
        frame.crop_offset_x,
        frame.crop_offset_y,
    );
    ViewerRect::from_corners(x1, y1, x2, y2)
}

/// Font sizes are stored in viewer pixels on annotations and in points in
/// the file.
pub fn font_px_to_pt(px: u32) -> f64 {
    px_to_pt(f64::from(px))
}

pub fn font_pt_to_px(pt: f64) -> u32 {
    pt_to_px(pt).round().max(0.0) as u32
}
