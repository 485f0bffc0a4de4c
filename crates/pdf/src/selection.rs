//! Selection and search over positioned runs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Annotation, AnnotationKind, PositionedTextRun, ViewerRect};

/// Height (viewer pixels) of the bands runs are grouped into lines by.
pub const LINE_BUCKET_PX: f64 = 10.0;

/// Visible runs touching a drag rectangle. The drag may go in any direction.
pub fn select_runs<'a>(runs: &'a [PositionedTextRun], drag: &ViewerRect) -> Vec<&'a PositionedTextRun> {
    let drag = drag.normalized();
    runs.iter()
        .filter(|run| run.is_visible() && run.intersects(&drag))
        .collect()
}

fn reading_order(a: &PositionedTextRun, b: &PositionedTextRun) -> Ordering {
    a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x))
}

/// Selected text ordered top to bottom, then left to right, separated by
/// single spaces.
pub fn selection_text(runs: &[&PositionedTextRun]) -> String {
    let mut ordered = runs.to_vec();
    ordered.sort_by(|a, b| reading_order(a, b));
    ordered
        .iter()
        .map(|run| run.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One markup annotation per line of the selection, covering every run on
/// that line.
pub fn annotations_from_selection(runs: &[&PositionedTextRun], kind: AnnotationKind, page: u32) -> Vec<Annotation> {
    let mut lines: BTreeMap<i64, (ViewerRect, Vec<&PositionedTextRun>)> = BTreeMap::new();
    for &run in runs {
        let bucket = (run.y / LINE_BUCKET_PX).floor() as i64;
        lines
            .entry(bucket)
            .and_modify(|(rect, members)| {
                *rect = rect.union(&run.rect());
                members.push(run);
            })
            .or_insert_with(|| (run.rect().normalized(), vec![run]));
    }

    lines
        .into_values()
        .map(|(rect, members)| Annotation::new(kind, page, rect).with_content(selection_text(&members)))
        .collect()
}

/// Runs whose text contains `query`, ignoring case.
pub fn search_runs<'a>(runs: &'a [PositionedTextRun], query: &str) -> Vec<&'a PositionedTextRun> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    runs.iter()
        .filter(|run| run.text.to_lowercase().contains(&needle))
        .collect()
}
