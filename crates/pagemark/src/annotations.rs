use std::path::PathBuf;

use pagemark_pdf::{selection, Annotation, AnnotationKind, PdfDocument, Rgb, ViewerRect};

use crate::prelude::{eprintln, println, *};
use crate::settings::Settings;

#[derive(Debug, clap::Args)]
pub struct ListOptions {
    /// Path to the PDF file
    path: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct AddOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Page to annotate (1-indexed)
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Annotation kind: free-text, highlight, underline or ocr-text
    #[arg(short, long, default_value = "free-text")]
    kind: AnnotationKind,

    /// Left edge in viewer pixels
    #[arg(short)]
    x: f64,

    /// Top edge in viewer pixels
    #[arg(short)]
    y: f64,

    /// Width in viewer pixels
    #[arg(long)]
    width: f64,

    /// Height in viewer pixels
    #[arg(long)]
    height: f64,

    /// Annotation text
    #[arg(short, long)]
    text: Option<String>,

    /// Colour as '#RRGGBB' or '#AARRGGBB'
    #[arg(short, long)]
    color: Option<Rgb>,

    /// Write here instead of overwriting the input
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct SelectOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Page to select on (1-indexed)
    #[arg(short, long, default_value = "1")]
    page: u32,

    /// Drag start, left edge in viewer pixels
    #[arg(short)]
    x: f64,

    /// Drag start, top edge in viewer pixels
    #[arg(short)]
    y: f64,

    /// Drag width in viewer pixels (negative drags left)
    #[arg(long, allow_negative_numbers = true)]
    width: f64,

    /// Drag height in viewer pixels (negative drags up)
    #[arg(long, allow_negative_numbers = true)]
    height: f64,

    /// Mark the selection as highlight or underline instead of printing it
    #[arg(short, long)]
    kind: Option<AnnotationKind>,

    /// Write here instead of overwriting the input
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct SaveOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// JSON file holding the complete annotation list
    annotations: PathBuf,

    /// Viewer zoom the coordinates were captured at
    #[arg(short, long, default_value = "1.0")]
    scale: f64,

    /// Write here instead of overwriting the input
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct StripOptions {
    /// Path to the PDF file
    path: PathBuf,

    /// Write here instead of overwriting the input
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn list(options: ListOptions, global: crate::Global) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let annotations = pagemark_pdf::extract_annotations(&bytes)?;

    if global.table {
        if annotations.is_empty() {
            println!("No annotations.");
            return Ok(());
        }
        let mut table = new_table();
        table.add_row(prettytable::row!["Id", "Kind", "Page", "X", "Y", "Width", "Height", "Content"]);
        for annotation in &annotations {
            table.add_row(prettytable::row![
                annotation.id,
                annotation.kind,
                annotation.page,
                f!("{:.1}", annotation.x),
                f!("{:.1}", annotation.y),
                f!("{:.1}", annotation.width),
                f!("{:.1}", annotation.height),
                annotation.content
            ]);
        }
        table.printstd();
    } else {
        println!("{}", serde_json::to_string_pretty(&annotations)?);
    }
    Ok(())
}

pub fn add(options: AddOptions, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let count = pagemark_pdf::page_count(&bytes)?;
    if options.page == 0 || options.page as usize > count {
        return Err(eyre!(Error::InvalidArgument(f!(
            "page {} is out of range (document has {} pages)",
            options.page,
            count
        ))));
    }

    let mut annotations = pagemark_pdf::extract_annotations(&bytes)?;
    let rect = ViewerRect::new(options.x, options.y, options.width, options.height);
    let mut annotation = settings.annotation(options.kind, options.page, rect);
    if let Some(text) = options.text {
        annotation.content = text;
    }
    if let Some(color) = options.color {
        annotation.color = color;
    }
    log::debug!("adding {} annotation {}", annotation.kind, annotation.id);
    annotations.push(annotation);

    let out = pagemark_pdf::save_with_options(&bytes, &annotations, settings.save_options(1.0))?;
    write_document(&options.path, options.output.as_deref(), &out)
}

/// Select the runs under a drag rectangle. Prints their text, or with
/// `--kind` stores one markup annotation per selected line.
pub fn select(options: SelectOptions, global: crate::Global, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let doc = PdfDocument::from_bytes(&bytes)?;
    if options.page == 0 || options.page as usize > doc.page_count() {
        return Err(eyre!(Error::InvalidArgument(f!(
            "page {} is out of range (document has {} pages)",
            options.page,
            doc.page_count()
        ))));
    }

    let runs = doc.page_text(options.page, &settings.extract_options());
    let drag = ViewerRect::new(options.x, options.y, options.width, options.height);
    let selected = selection::select_runs(&runs, &drag);

    let Some(kind) = options.kind else {
        let text = selection::selection_text(&selected);
        if global.table {
            let mut table = new_table();
            table.add_row(prettytable::row!["Runs", selected.len()]);
            table.add_row(prettytable::row!["Text", text]);
            table.printstd();
        } else {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "text": text, "runs": selected }))?
            );
        }
        return Ok(());
    };

    if !matches!(kind, AnnotationKind::Highlight | AnnotationKind::Underline) {
        return Err(eyre!(Error::InvalidArgument(f!(
            "a selection can only be marked as highlight or underline, not {}",
            kind
        ))));
    }
    if selected.is_empty() {
        eprintln!("no text under the selection, nothing to mark");
        return Ok(());
    }

    let mut annotations = doc.annotations();
    let marks = selection::annotations_from_selection(&selected, kind, options.page);
    log::debug!("marking {} lines as {}", marks.len(), kind);
    annotations.extend(marks);

    let out = pagemark_pdf::save_with_options(&bytes, &annotations, settings.save_options(1.0))?;
    write_document(&options.path, options.output.as_deref(), &out)
}

pub fn save(options: SaveOptions, settings: Settings) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let raw = std::fs::read_to_string(&options.annotations)
        .wrap_err_with(|| f!("failed to read {}", options.annotations.display()))?;
    let annotations: Vec<Annotation> =
        serde_json::from_str(&raw).wrap_err_with(|| f!("malformed annotation list {}", options.annotations.display()))?;

    let out = pagemark_pdf::save_with_options(&bytes, &annotations, settings.save_options(options.scale))?;
    write_document(&options.path, options.output.as_deref(), &out)
}

pub fn strip(options: StripOptions) -> Result<()> {
    let bytes = read_document(&options.path)?;
    let out = pagemark_pdf::strip_annotations(&bytes);
    write_document(&options.path, options.output.as_deref(), &out)
}
